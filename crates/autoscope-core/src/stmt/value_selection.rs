use super::Value;

/// A comparison between an attribute and a constant value,
/// e.g. `current_price < 34`.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueSelection {
    pub attr: String,
    pub op: String,
    pub value: Value,

    /// SQL type cast applied to the attribute. Planner-internal; never part
    /// of the wire format.
    pub cast: Option<String>,
}

impl ValueSelection {
    pub fn new(attr: impl Into<String>, op: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            attr: attr.into(),
            op: op.into(),
            value: value.into(),
            cast: None,
        }
    }
}
