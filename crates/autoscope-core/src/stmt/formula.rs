use super::{valid_op, AttrSelection, FormulaAnd, FormulaNot, FormulaOr, Value, ValueSelection};
use crate::{Error, Result};
use indexmap::IndexMap;

/// A composable restriction predicate.
///
/// Leaves compare attributes to values ([`ValueSelection`]) or to other
/// attributes ([`AttrSelection`]); the logical connectives preserve the
/// leaf order. `Tautology` matches every row.
#[derive(Debug, Clone, PartialEq)]
pub enum Formula {
    Tautology,
    Value(ValueSelection),
    Attr(AttrSelection),
    And(FormulaAnd),
    Or(FormulaOr),
    Not(FormulaNot),
}

impl Formula {
    pub fn and(a: Formula, b: Formula) -> Formula {
        Formula::And(FormulaAnd {
            a: Box::new(a),
            b: Box::new(b),
        })
    }

    pub fn or(a: Formula, b: Formula) -> Formula {
        Formula::Or(FormulaOr {
            a: Box::new(a),
            b: Box::new(b),
        })
    }

    pub fn not(a: Formula) -> Formula {
        Formula::Not(FormulaNot { a: Box::new(a) })
    }

    /// Shorthand for an `attr = value` leaf.
    pub fn eq(attr: impl Into<String>, value: impl Into<Value>) -> Formula {
        Formula::Value(ValueSelection::new(attr, "=", value))
    }

    pub fn is_tautology(&self) -> bool {
        matches!(self, Formula::Tautology)
    }

    /// Rewrites every leaf while preserving the logical structure. This is
    /// the only hook the relational planner uses to transform identifiers.
    pub fn map_leaves(self, f: &mut impl FnMut(Formula) -> Formula) -> Formula {
        match self {
            Formula::Value(_) | Formula::Attr(_) => f(self),
            Formula::And(and) => Formula::and(and.a.map_leaves(f), and.b.map_leaves(f)),
            Formula::Or(or) => Formula::or(or.a.map_leaves(f), or.b.map_leaves(f)),
            Formula::Not(not) => Formula::not(not.a.map_leaves(f)),
            Formula::Tautology => Formula::Tautology,
        }
    }

    /// Visits every leaf without rewriting.
    pub fn each_leaf<'a>(&'a self, f: &mut impl FnMut(&'a Formula)) {
        match self {
            Formula::Value(_) | Formula::Attr(_) => f(self),
            Formula::And(and) => {
                and.a.each_leaf(f);
                and.b.each_leaf(f);
            }
            Formula::Or(or) => {
                or.a.each_leaf(f);
                or.b.each_leaf(f);
            }
            Formula::Not(not) => not.a.each_leaf(f),
            Formula::Tautology => {}
        }
    }

    /// Checks every leaf operator against the allowlist. Called before a
    /// formula is handed to any backend.
    pub fn validate(&self) -> Result<()> {
        let mut invalid = None;
        self.each_leaf(&mut |leaf| {
            if invalid.is_some() {
                return;
            }
            let op = match leaf {
                Formula::Value(vs) => &vs.op,
                Formula::Attr(attr) => &attr.op,
                _ => return,
            };
            if !valid_op(op) {
                invalid = Some(Error::invalid_predicate(format!("unknown operator `{op}`")));
            }
        });
        match invalid {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Every attribute name referenced by the formula, in leaf order.
    pub fn attrs(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.each_leaf(&mut |leaf| match leaf {
            Formula::Value(vs) => out.push(vs.attr.as_str()),
            Formula::Attr(attr) => {
                out.push(attr.attr_a.as_str());
                out.push(attr.attr_b.as_str());
            }
            _ => {}
        });
        out
    }
}

/// Folds a list of formulas into nested `And`s. An empty list is a
/// tautology.
pub fn nest_ands(mut formulas: Vec<Formula>) -> Formula {
    match formulas.len() {
        0 => Formula::Tautology,
        1 => formulas.remove(0),
        _ => {
            let first = formulas.remove(0);
            Formula::and(first, nest_ands(formulas))
        }
    }
}

/// Folds a list of formulas into nested `Or`s. An empty list is a
/// tautology.
pub fn nest_ors(mut formulas: Vec<Formula>) -> Formula {
    match formulas.len() {
        0 => Formula::Tautology,
        1 => formulas.remove(0),
        _ => {
            let first = formulas.remove(0);
            Formula::or(first, nest_ors(formulas))
        }
    }
}

/// Turns a map of `column = value` pairs into nested `And`s of equality
/// leaves.
pub fn restrictions(values: IndexMap<String, Value>) -> Formula {
    nest_ands(
        values
            .into_iter()
            .map(|(attr, value)| Formula::Value(ValueSelection::new(attr, "=", value)))
            .collect(),
    )
}
