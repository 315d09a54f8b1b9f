use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The state of one logical table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,

    /// Column name to column-type string, e.g. `"varchar(64)"`, `"bigint"`.
    pub columns: IndexMap<String, String>,

    #[serde(default)]
    pub indices: Vec<String>,

    #[serde(default)]
    pub status: TableStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableStatus {
    Created,
    Migrating,
    #[default]
    Absent,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: IndexMap::new(),
            indices: Vec::new(),
            status: TableStatus::Absent,
        }
    }

    pub fn with_column(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.columns.insert(name.into(), ty.into());
        self
    }

    pub fn created(mut self) -> Self {
        self.status = TableStatus::Created;
        self
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }
}
