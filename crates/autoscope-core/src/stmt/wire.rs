//! JSON wire format for formulas.
//!
//! Every node carries a `type` discriminant; the logical connectives nest
//! their operands in an `args` array. Unknown discriminants are rejected at
//! deserialization. The planner-internal cast fields are not part of the
//! format.

use super::{AttrSelection, Formula, Value, ValueSelection};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Serialize, Deserialize)]
#[serde(tag = "type")]
enum Wire {
    #[serde(rename = "TAUTOLOGY")]
    Tautology,

    #[serde(rename = "VALUE_SELECTION")]
    ValueSelection {
        attr: String,
        op: String,
        value: Value,
    },

    #[serde(rename = "ATTR_SELECTION")]
    AttrSelection {
        #[serde(rename = "attrA")]
        attr_a: String,
        op: String,
        #[serde(rename = "attrB")]
        attr_b: String,
    },

    #[serde(rename = "AND")]
    And { args: (Box<Wire>, Box<Wire>) },

    #[serde(rename = "OR")]
    Or { args: (Box<Wire>, Box<Wire>) },

    #[serde(rename = "NOT")]
    Not { args: (Box<Wire>,) },
}

impl From<&Formula> for Wire {
    fn from(formula: &Formula) -> Self {
        match formula {
            Formula::Tautology => Wire::Tautology,
            Formula::Value(vs) => Wire::ValueSelection {
                attr: vs.attr.clone(),
                op: vs.op.clone(),
                value: vs.value.clone(),
            },
            Formula::Attr(attr) => Wire::AttrSelection {
                attr_a: attr.attr_a.clone(),
                op: attr.op.clone(),
                attr_b: attr.attr_b.clone(),
            },
            Formula::And(and) => Wire::And {
                args: (Box::new((&*and.a).into()), Box::new((&*and.b).into())),
            },
            Formula::Or(or) => Wire::Or {
                args: (Box::new((&*or.a).into()), Box::new((&*or.b).into())),
            },
            Formula::Not(not) => Wire::Not {
                args: (Box::new((&*not.a).into()),),
            },
        }
    }
}

impl From<Wire> for Formula {
    fn from(wire: Wire) -> Self {
        match wire {
            Wire::Tautology => Formula::Tautology,
            Wire::ValueSelection { attr, op, value } => {
                Formula::Value(ValueSelection::new(attr, op, value))
            }
            Wire::AttrSelection { attr_a, op, attr_b } => {
                Formula::Attr(AttrSelection::new(attr_a, op, attr_b))
            }
            Wire::And { args } => Formula::and((*args.0).into(), (*args.1).into()),
            Wire::Or { args } => Formula::or((*args.0).into(), (*args.1).into()),
            Wire::Not { args } => Formula::not((*args.0).into()),
        }
    }
}

impl Serialize for Formula {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Wire::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Formula {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Wire::deserialize(deserializer)?.into())
    }
}
