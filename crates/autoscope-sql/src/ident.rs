/// Escapes a single SQL identifier: embedded double quotes are stripped,
/// then the identifier is wrapped in double quotes.
pub fn escape_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', ""))
}

/// Escapes a JSON property accessor, i.e. turns `name` into `'name'` for
/// use after `->>`.
pub fn json_prop(field: &str) -> String {
    format!("'{}'", field.replace('\'', ""))
}

/// Quotes a planner-produced identifier expression.
///
/// Accepted shapes: `name`, `qualifier.name`, and
/// `qualifier.autoscope_objectfields->>field`. Each dotted segment is
/// escaped independently; a JSON accessor keeps its `->>` with the
/// property escaped as a string literal.
pub fn quote_expr(raw: &str) -> String {
    match raw.split_once("->>") {
        Some((path, prop)) => format!(
            "{} ->> {}",
            quote_dotted(path.trim()),
            json_prop(prop.trim())
        ),
        None => quote_dotted(raw),
    }
}

fn quote_dotted(path: &str) -> String {
    path.split('.')
        .map(escape_ident)
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_embedded_quotes() {
        assert_eq!(escape_ident("na\"me"), "\"name\"");
        assert_eq!(json_prop("o'brien"), "'obrien'");
    }

    #[test]
    fn quotes_qualified_identifiers() {
        assert_eq!(quote_expr("intcol"), "\"intcol\"");
        assert_eq!(quote_expr("__root.intcol"), "\"__root\".\"intcol\"");
        assert_eq!(
            quote_expr("__root.autoscope_objectfields->>name"),
            "\"__root\".\"autoscope_objectfields\" ->> 'name'"
        );
    }
}
