use super::{Schema, Table};
use std::fmt;

/// One unit of physical schema evolution.
///
/// Steps are applied in list order. The policy is additive only: nothing
/// ever emits a drop.
#[derive(Debug, Clone, PartialEq)]
pub enum MigrationStep {
    /// Create a new table. The backend also moves any rows parked in the
    /// unassigned table under this name.
    CreateTable { table_name: String, table: Table },

    /// Promote a sidecar field to a declared column, migrating its data.
    /// Must succeed as a no-op when a compatible column already exists.
    PromoteField {
        table_name: String,
        column: String,
        column_type: String,
    },

    /// Create an index on a column.
    IndexColumn { table_name: String, column: String },
}

impl MigrationStep {
    pub fn table_name(&self) -> &str {
        match self {
            Self::CreateTable { table_name, .. } => table_name,
            Self::PromoteField { table_name, .. } => table_name,
            Self::IndexColumn { table_name, .. } => table_name,
        }
    }
}

impl fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateTable { table_name, .. } => write!(f, "create table {table_name}"),
            Self::PromoteField {
                table_name,
                column,
                column_type,
            } => write!(f, "promote field {table_name}.{column} as {column_type}"),
            Self::IndexColumn { table_name, column } => {
                write!(f, "index column {table_name}.{column}")
            }
        }
    }
}

/// Produces the ordered steps that take `current` to `desired`.
///
/// Tables are created before columns are promoted and columns before
/// indices, so each step's dependencies are already satisfied. Output is
/// sorted by name for determinism.
pub fn migration_diff(current: &Schema, desired: &Schema) -> Vec<MigrationStep> {
    let mut steps = Vec::new();

    let mut names: Vec<&String> = desired.keys().collect();
    names.sort();

    for name in &names {
        if !current.contains_key(*name) {
            steps.push(MigrationStep::CreateTable {
                table_name: (*name).clone(),
                table: desired[*name].clone(),
            });
        }
    }

    for name in &names {
        let Some(have) = current.get(*name) else {
            continue;
        };
        let want = &desired[*name];

        for (column, column_type) in &want.columns {
            if !have.has_column(column) {
                steps.push(MigrationStep::PromoteField {
                    table_name: (*name).clone(),
                    column: column.clone(),
                    column_type: column_type.clone(),
                });
            }
        }

        for column in &want.indices {
            if !have.indices.contains(column) {
                steps.push(MigrationStep::IndexColumn {
                    table_name: (*name).clone(),
                    column: column.clone(),
                });
            }
        }
    }

    steps
}
