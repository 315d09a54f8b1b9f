/// A comparison between two attributes, e.g. `current_price < high_price`.
///
/// Either side may embed a relational path (`venue__owner__name`).
#[derive(Debug, Clone, PartialEq)]
pub struct AttrSelection {
    pub attr_a: String,
    pub op: String,
    pub attr_b: String,

    /// SQL type casts for each side. Planner-internal; never part of the
    /// wire format.
    pub cast_a: Option<String>,
    pub cast_b: Option<String>,
}

impl AttrSelection {
    pub fn new(attr_a: impl Into<String>, op: impl Into<String>, attr_b: impl Into<String>) -> Self {
        Self {
            attr_a: attr_a.into(),
            op: op.into(),
            attr_b: attr_b.into(),
            cast_a: None,
            cast_b: None,
        }
    }
}
