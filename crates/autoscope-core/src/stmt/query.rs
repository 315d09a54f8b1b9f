use super::{restrictions, Formula, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A row retrieval request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectQuery {
    pub table: String,
    pub selection: Formula,
}

/// A row creation request.
///
/// `foreign_keys` maps fields to the tables they reference; the mapping is
/// only needed until the statistics have established the relationship.
/// `types` optionally pins the stored type of a field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertQuery {
    pub table: String,
    pub data: IndexMap<String, Value>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub foreign_keys: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub types: HashMap<String, String>,
}

/// A row modification request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateQuery {
    pub table: String,
    pub selection: Formula,
    pub data: IndexMap<String, Value>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub foreign_keys: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub types: HashMap<String, String>,
}

/// A row removal request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteQuery {
    pub table: String,
    pub selection: Formula,
}

impl SelectQuery {
    /// A query matching rows where every listed column equals the given
    /// value.
    pub fn filter(table: impl Into<String>, values: IndexMap<String, Value>) -> Self {
        Self {
            table: table.into(),
            selection: restrictions(values),
        }
    }
}

impl InsertQuery {
    pub fn new(table: impl Into<String>, data: IndexMap<String, Value>) -> Self {
        Self {
            table: table.into(),
            data,
            foreign_keys: HashMap::new(),
            types: HashMap::new(),
        }
    }
}

impl UpdateQuery {
    /// An update setting `data` on rows where every listed column equals
    /// the given value.
    pub fn filter(
        table: impl Into<String>,
        values: IndexMap<String, Value>,
        data: IndexMap<String, Value>,
    ) -> Self {
        Self {
            table: table.into(),
            selection: restrictions(values),
            data,
            foreign_keys: HashMap::new(),
            types: HashMap::new(),
        }
    }
}
