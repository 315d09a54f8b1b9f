use std::fmt;

/// An error that can occur anywhere in the engine, the SQL layer, or a
/// storage driver.
pub struct Error {
    kind: ErrorKind,
}

#[derive(Debug)]
enum ErrorKind {
    /// A predicate failed structural validation: unknown operator, unknown
    /// wire discriminant, or a missing required argument.
    InvalidPredicate(String),

    /// A referenced column is absent from the schema and there is no sidecar
    /// to fall back to.
    SchemaMismatch(String),

    /// The caller is not allowed to perform the operation. Only the insert
    /// path surfaces this; reads and updates degrade to empty results.
    PermissionDenied(String),

    /// Passthrough failure from the underlying database driver.
    Backend(Box<dyn std::error::Error + Send + Sync>),

    /// An internal invariant was violated, e.g. a statistics counter mapped
    /// to a non-integer column or a sidecar/column name collision.
    InvariantViolation(String),

    /// A requested row does not exist, including cursor misuse (`get`
    /// before `next` or after exhaustion).
    NotFound(String),

    /// The engine configuration is unusable.
    InvalidConfig(String),
}

impl Error {
    pub fn invalid_predicate(msg: impl Into<String>) -> Self {
        ErrorKind::InvalidPredicate(msg.into()).into()
    }

    pub fn schema_mismatch(msg: impl Into<String>) -> Self {
        ErrorKind::SchemaMismatch(msg.into()).into()
    }

    pub fn permission_denied(msg: impl Into<String>) -> Self {
        ErrorKind::PermissionDenied(msg.into()).into()
    }

    pub fn backend(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        ErrorKind::Backend(err.into()).into()
    }

    pub fn invariant_violation(msg: impl Into<String>) -> Self {
        ErrorKind::InvariantViolation(msg.into()).into()
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ErrorKind::NotFound(msg.into()).into()
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        ErrorKind::InvalidConfig(msg.into()).into()
    }

    pub fn is_invalid_predicate(&self) -> bool {
        matches!(self.kind, ErrorKind::InvalidPredicate(_))
    }

    pub fn is_schema_mismatch(&self) -> bool {
        matches!(self.kind, ErrorKind::SchemaMismatch(_))
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self.kind, ErrorKind::PermissionDenied(_))
    }

    pub fn is_backend(&self) -> bool {
        matches!(self.kind, ErrorKind::Backend(_))
    }

    pub fn is_invariant_violation(&self) -> bool {
        matches!(self.kind, ErrorKind::InvariantViolation(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, ErrorKind::NotFound(_))
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self { kind }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::InvalidPredicate(msg) => write!(f, "invalid predicate: {msg}"),
            ErrorKind::SchemaMismatch(msg) => write!(f, "schema mismatch: {msg}"),
            ErrorKind::PermissionDenied(msg) => write!(f, "permission denied: {msg}"),
            ErrorKind::Backend(err) => write!(f, "backend failure: {err}"),
            ErrorKind::InvariantViolation(msg) => write!(f, "invariant violation: {msg}"),
            ErrorKind::NotFound(msg) => write!(f, "not found: {msg}"),
            ErrorKind::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            f.debug_struct("Error").field("kind", &self.kind).finish()
        } else {
            fmt::Display::fmt(self, f)
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Backend(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}
