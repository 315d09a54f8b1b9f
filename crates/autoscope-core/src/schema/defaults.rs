use super::{Schema, Table};

/// Shared catch-all for rows whose logical table does not physically exist
/// yet. Rows carry the target table name in `table_name` and their payload
/// in the sidecar.
pub const UNASSIGNED_TABLE: &str = "autoscope_unassigned";

/// Columns every managed table carries implicitly.
pub fn base_columns(table: Table) -> Table {
    table
        .with_column("id", "bigint")
        .with_column("autoscope_uid", "bigint")
        .with_column("autoscope_gid", "bigint")
        .with_column("autoscope_objectfields", "json")
}

/// Returns true for tables managed by the engine itself.
pub fn is_internal(table: &str) -> bool {
    table.starts_with("autoscope_")
}

/// The internal tables the engine requires. All of them are governed by
/// the same rules as user tables.
pub fn default_schema() -> Schema {
    let tables = vec![
        base_columns(Table::new("autoscope_users"))
            .with_column("username", "varchar(64)")
            .with_column("passhash", "varchar(128)"),
        base_columns(Table::new("autoscope_groups")).with_column("name", "varchar(64)"),
        base_columns(Table::new("autoscope_user_groups"))
            .with_column("user_id", "bigint")
            .with_column("group_id", "bigint"),
        base_columns(Table::new("autoscope_user_sessions"))
            .with_column("username", "varchar(64)")
            .with_column("session_id", "varchar(128)")
            .with_column("time", "bigint"),
        base_columns(Table::new("autoscope_table_groups"))
            .with_column("table_name", "varchar(64)")
            .with_column("group_id", "bigint"),
        base_columns(Table::new("autoscope_table_stats"))
            .with_column("table_name", "varchar(64)")
            .with_column("insert_queries", "bigint")
            .with_column("select_queries", "bigint")
            .with_column("update_queries", "bigint"),
        base_columns(Table::new("autoscope_restriction_stats"))
            .with_column("table_name", "varchar(64)")
            .with_column("col_name", "varchar(64)")
            .with_column("count", "bigint"),
        base_columns(Table::new("autoscope_objectfield_stats"))
            .with_column("table_name", "varchar(64)")
            .with_column("col_name", "varchar(64)")
            .with_column("value_type", "varchar(16)")
            .with_column("count", "bigint"),
        base_columns(Table::new("autoscope_foreignkey_stats"))
            .with_column("table_name", "varchar(64)")
            .with_column("col_name", "varchar(64)")
            .with_column("foreign_table", "varchar(64)")
            .with_column("count", "bigint"),
        base_columns(Table::new(UNASSIGNED_TABLE)).with_column("table_name", "varchar(64)"),
    ];

    tables.into_iter().map(|t| (t.name.clone(), t)).collect()
}
