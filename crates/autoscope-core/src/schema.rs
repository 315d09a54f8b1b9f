mod column;
pub use column::{is_integer_type, ColumnInfo};

mod defaults;
pub use defaults::{base_columns, default_schema, is_internal, UNASSIGNED_TABLE};

mod migrate;
pub use migrate::{migration_diff, MigrationStep};

mod table;
pub use table::{Table, TableStatus};

use std::collections::HashMap;

/// The logical schema: every known table keyed by name.
pub type Schema = HashMap<String, Table>;
