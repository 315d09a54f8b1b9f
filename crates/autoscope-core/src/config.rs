use serde::{Deserialize, Serialize};

/// Engine configuration. The file format that feeds this is a boundary
/// concern; anything that can produce the struct works.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub port: u16,

    #[serde(default)]
    pub db_user: String,

    #[serde(default)]
    pub db_host: String,

    #[serde(default)]
    pub db_name: String,

    #[serde(default)]
    pub db_password: String,

    /// Prefix applied to every physical table name by the SQL backend.
    #[serde(default)]
    pub db_prefix: String,

    #[serde(default)]
    pub database_type: DatabaseType,

    /// Number of inserts targeting a not-yet-existing table before the
    /// controller materializes it.
    #[serde(default = "default_table_rows_threshold")]
    pub new_table_rows_threshold: i64,

    /// Number of (field, type) observations before a sidecar field is
    /// promoted to a declared column.
    #[serde(default = "default_field_threshold")]
    pub new_field_threshold: i64,

    /// Run the background migration controller.
    #[serde(default)]
    pub auto_migrate: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    Postgres,
    #[default]
    Mem,
}

fn default_table_rows_threshold() -> i64 {
    100
}

fn default_field_threshold() -> i64 {
    100
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 0,
            db_user: String::new(),
            db_host: String::new(),
            db_name: String::new(),
            db_password: String::new(),
            db_prefix: String::new(),
            database_type: DatabaseType::Mem,
            new_table_rows_threshold: default_table_rows_threshold(),
            new_field_threshold: default_field_threshold(),
            auto_migrate: false,
        }
    }
}
