use std::fmt;

/// Column metadata as reported by `information_schema.columns`.
///
/// The [`fmt::Display`] rendering is the canonical column-type string used
/// as the value of [`super::Table::columns`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub char_max_length: Option<i64>,
    pub numeric_precision: Option<i64>,
    pub numeric_precision_radix: Option<i64>,
    pub numeric_scale: Option<i64>,
}

impl ColumnInfo {
    /// Normalizes the verbose `information_schema` spellings to the short
    /// forms used throughout the schema maps.
    fn base_type(&self) -> &str {
        match self.data_type.as_str() {
            "character varying" => "varchar",
            "character" => "char",
            "integer" => "int",
            "double precision" => "float8",
            other => other,
        }
    }
}

impl fmt::Display for ColumnInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = self.base_type();
        match (self.char_max_length, self.numeric_precision, self.numeric_scale) {
            (Some(n), _, _) => write!(f, "{base}({n})"),
            (None, Some(p), Some(s)) if base == "numeric" => write!(f, "numeric({p},{s})"),
            _ => write!(f, "{base}"),
        }
    }
}

/// Returns true if a column-type string stores a 64-bit-compatible integer.
/// Statistics counters must live in such columns.
pub fn is_integer_type(ty: &str) -> bool {
    let base = ty.split('(').next().unwrap_or(ty);
    matches!(
        base,
        "int" | "integer" | "int4" | "int8" | "bigint" | "smallint" | "serial" | "bigserial"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_rendering() {
        let ci = ColumnInfo {
            name: "username".into(),
            data_type: "character varying".into(),
            char_max_length: Some(64),
            ..Default::default()
        };
        assert_eq!(ci.to_string(), "varchar(64)");

        let ci = ColumnInfo {
            name: "id".into(),
            data_type: "bigint".into(),
            ..Default::default()
        };
        assert_eq!(ci.to_string(), "bigint");

        let ci = ColumnInfo {
            name: "price".into(),
            data_type: "numeric".into(),
            numeric_precision: Some(10),
            numeric_scale: Some(2),
            ..Default::default()
        };
        assert_eq!(ci.to_string(), "numeric(10,2)");
    }

    #[test]
    fn integer_types() {
        assert!(is_integer_type("bigint"));
        assert!(is_integer_type("serial"));
        assert!(!is_integer_type("varchar(64)"));
        assert!(!is_integer_type("jsonb"));
    }
}
