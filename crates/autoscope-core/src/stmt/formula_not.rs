use super::Formula;

/// Logical negation of a formula.
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaNot {
    pub a: Box<Formula>,
}
