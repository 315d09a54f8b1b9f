use crate::ident::quote_expr;

/// Rewrites abstract `?` argument placeholders to `$start`, `$start+1`, …
/// for drivers that bind positionally.
pub fn question_to_positional(query: &str, start: usize) -> String {
    let mut out = String::with_capacity(query.len());
    let mut next = start;
    for c in query.chars() {
        if c == '?' {
            out.push('$');
            out.push_str(&next.to_string());
            next += 1;
        } else {
            out.push(c);
        }
    }
    out
}

/// Substitutes each `%s` placeholder with the corresponding identifier,
/// quoted. The contract from lowering guarantees one identifier per
/// placeholder.
pub fn replace_identifiers(sql: &str, idents: &[String]) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut rest = sql;
    let mut idents = idents.iter();
    while let Some(pos) = rest.find("%s") {
        out.push_str(&rest[..pos]);
        match idents.next() {
            Some(ident) => out.push_str(&quote_expr(ident)),
            None => out.push_str("%s"),
        }
        rest = &rest[pos + 2..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_rewrite_counts_from_start() {
        assert_eq!(
            question_to_positional("a = ? AND b = ?", 1),
            "a = $1 AND b = $2"
        );
        assert_eq!(question_to_positional("c = ?", 3), "c = $3");
        assert_eq!(question_to_positional("no placeholders", 1), "no placeholders");
    }

    #[test]
    fn identifier_substitution_in_order() {
        let sql = "%s = ? AND %s = %s";
        let idents = vec![
            "__root.a".to_string(),
            "__root.b".to_string(),
            "__x.c".to_string(),
        ];
        assert_eq!(
            replace_identifiers(sql, &idents),
            "\"__root\".\"a\" = ? AND \"__root\".\"b\" = \"__x\".\"c\""
        );
    }
}
