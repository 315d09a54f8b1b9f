use autoscope_core::stmt::Value;

/// An SQL fragment plus the out-of-band pieces it still needs.
///
/// `sql` contains one `%s` placeholder per entry of `idents` and one `?`
/// per entry of `args`, each in order of appearance. Identifiers are never
/// interpolated as raw strings; the backend quotes them before
/// substitution, and may rewrite `?` to its positional form.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SqlPart {
    pub sql: String,
    pub idents: Vec<String>,
    pub args: Vec<Value>,
}

impl SqlPart {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            idents: Vec::new(),
            args: Vec::new(),
        }
    }
}
