use crate::{
    controller,
    permissions::{self, read_action, update_action, ObjectPermissions},
    planner,
};
use autoscope_core::{
    driver::{EmptyRows, Prefixes, Rows, StorageDriver, WriteResult},
    schema::{default_schema, migration_diff, MigrationStep, Schema, Table},
    stats::TableQueryStats,
    stmt::{DeleteQuery, Formula, InsertQuery, SelectQuery, UpdateQuery, Value},
    Config, DatabaseType, Error, Result,
};
use autoscope_driver_mem::MemDriver;
use autoscope_driver_postgresql::PostgresDriver;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};

/// The engine façade. Cheap to clone; all state lives behind one shared
/// allocation.
#[derive(Clone)]
pub struct Engine {
    pub(crate) shared: Arc<Shared>,
}

pub(crate) struct Shared {
    pub(crate) config: Config,
    pub(crate) db: Box<dyn StorageDriver>,

    // Lock order: schema, then stats (global before local), then
    // permissions. Only the schema read lock may be held across a backend
    // call.
    pub(crate) schema: RwLock<Schema>,
    pub(crate) global_stats: RwLock<HashMap<String, TableQueryStats>>,
    pub(crate) local_stats: Mutex<HashMap<String, TableQueryStats>>,
    pub(crate) permissions: RwLock<HashMap<String, ObjectPermissions>>,

    pub(crate) shutdown: watch::Sender<bool>,
}

impl Engine {
    /// Connects the configured backend, materializes the internal tables,
    /// loads statistics, and (when configured) starts the migration
    /// controller.
    pub async fn init(config: Config) -> Result<Engine> {
        let db: Box<dyn StorageDriver> = match config.database_type {
            DatabaseType::Mem => Box::new(MemDriver::new()),
            DatabaseType::Postgres => Box::new(PostgresDriver::new()),
        };
        db.connect(&config).await?;

        let current = db.current_schema().await?;
        let steps = migration_diff(&current, &default_schema());
        if !steps.is_empty() {
            db.perform_migration(&steps).await?;
        }
        let schema = db.current_schema().await?;

        let (shutdown, _) = watch::channel(false);
        let engine = Engine {
            shared: Arc::new(Shared {
                config,
                db,
                schema: RwLock::new(schema),
                global_stats: RwLock::new(HashMap::new()),
                local_stats: Mutex::new(HashMap::new()),
                permissions: RwLock::new(HashMap::new()),
                shutdown,
            }),
        };

        engine.reload_global_stats().await?;

        if engine.shared.config.auto_migrate {
            let _ = controller::spawn(engine.clone(), engine.shared.shutdown.subscribe());
        }
        Ok(engine)
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Stops the migration controller, if one is running.
    pub fn shutdown(&self) {
        let _ = self.shared.shutdown.send(true);
    }

    /// Retrieves rows the user is allowed to read. A denied read yields an
    /// empty cursor, not an error.
    pub async fn select(&self, user_id: i64, query: SelectQuery) -> Result<Box<dyn Rows>> {
        query.selection.validate()?;
        let schema = self.schema_snapshot().await;

        let perms = self.table_permissions(&query.table).await;
        let groups = self.user_groups(user_id).await?;
        let Some(selection) = permissions::apply_to_selection(
            query.selection.clone(),
            &perms,
            user_id,
            &groups,
            read_action,
        ) else {
            return Ok(Box::new(EmptyRows));
        };

        let restricted = SelectQuery {
            table: query.table.clone(),
            selection,
        };
        let prefixes = self
            .prefixes_for(&restricted.table, &restricted.selection)
            .await;

        let rows = self.shared.db.select(&schema, &prefixes, &restricted).await?;
        self.record_select(&query).await;
        Ok(rows)
    }

    /// Inserts a row owned by the user. Unlike reads and updates, a denied
    /// insert is an error.
    pub async fn insert(&self, user_id: i64, query: InsertQuery) -> Result<WriteResult> {
        if !self.can_insert(&query.table, user_id).await? {
            return Err(Error::permission_denied(format!(
                "user {user_id} may not insert into `{}`",
                query.table
            )));
        }

        let schema = self.schema_snapshot().await;
        let mut query = query;
        query
            .data
            .entry("autoscope_uid".to_string())
            .or_insert(Value::I64(user_id));

        let result = self.shared.db.insert(&schema, &query).await?;
        self.record_insert(&query).await;
        Ok(result)
    }

    /// Updates rows the user is allowed to touch. A denied update yields
    /// zero affected rows.
    pub async fn update(&self, user_id: i64, query: UpdateQuery) -> Result<WriteResult> {
        query.selection.validate()?;
        let schema = self.schema_snapshot().await;

        let perms = self.table_permissions(&query.table).await;
        let groups = self.user_groups(user_id).await?;
        let Some(selection) = permissions::apply_to_selection(
            query.selection.clone(),
            &perms,
            user_id,
            &groups,
            update_action,
        ) else {
            return Ok(WriteResult::empty());
        };

        let mut restricted = query.clone();
        restricted.selection = selection;
        let prefixes = self
            .prefixes_for(&restricted.table, &restricted.selection)
            .await;

        let result = self.shared.db.update(&schema, &prefixes, &restricted).await?;
        self.record_update(&query).await;
        Ok(result)
    }

    /// Deletes rows the user could update. A denied delete yields zero
    /// affected rows.
    pub async fn delete(&self, user_id: i64, query: DeleteQuery) -> Result<WriteResult> {
        query.selection.validate()?;
        let schema = self.schema_snapshot().await;

        let perms = self.table_permissions(&query.table).await;
        let groups = self.user_groups(user_id).await?;
        let Some(selection) = permissions::apply_to_selection(
            query.selection.clone(),
            &perms,
            user_id,
            &groups,
            update_action,
        ) else {
            return Ok(WriteResult::empty());
        };

        let restricted = DeleteQuery {
            table: query.table.clone(),
            selection,
        };
        let prefixes = self
            .prefixes_for(&restricted.table, &restricted.selection)
            .await;

        self.shared.db.delete(&schema, &prefixes, &restricted).await
    }

    /// Select without the permission filter or statistics. Used by the
    /// engine's own bookkeeping to avoid recursing through itself.
    pub async fn raw_select(&self, query: SelectQuery) -> Result<Box<dyn Rows>> {
        query.selection.validate()?;
        let schema = self.schema_snapshot().await;
        let prefixes = self.prefixes_for(&query.table, &query.selection).await;
        self.shared.db.select(&schema, &prefixes, &query).await
    }

    /// Insert without the permission gate, owner stamping, or statistics.
    pub async fn raw_insert(&self, query: InsertQuery) -> Result<WriteResult> {
        let schema = self.schema_snapshot().await;
        self.shared.db.insert(&schema, &query).await
    }

    /// Update without the permission filter or statistics.
    pub async fn raw_update(&self, query: UpdateQuery) -> Result<WriteResult> {
        query.selection.validate()?;
        let schema = self.schema_snapshot().await;
        let prefixes = self.prefixes_for(&query.table, &query.selection).await;
        self.shared.db.update(&schema, &prefixes, &query).await
    }

    /// Re-reads the physical schema from the backend.
    pub async fn load_schema(&self) -> Result<()> {
        let schema = self.shared.db.current_schema().await?;
        *self.shared.schema.write().await = schema;
        Ok(())
    }

    /// Applies migration steps through the backend. The caller reloads the
    /// schema afterwards.
    pub async fn perform_migration(&self, steps: &[MigrationStep]) -> Result<()> {
        self.shared.db.perform_migration(steps).await
    }

    /// Derives the migration steps the global statistics currently
    /// justify.
    ///
    /// A table absent from the schema is created once its insert count
    /// crosses the table threshold; its field promotions surface on the
    /// next cycle, after the table exists. A sidecar field of an existing
    /// table is promoted once its dominant value type crosses the field
    /// threshold.
    pub async fn migration_from_stats(&self) -> Result<Vec<MigrationStep>> {
        let schema = self.shared.schema.read().await;
        let stats = self.shared.global_stats.read().await;
        let config = &self.shared.config;

        let mut steps = Vec::new();
        let mut tables: Vec<&String> = stats.keys().collect();
        tables.sort();

        for table in tables {
            let ts = &stats[table];
            match schema.get(table) {
                Some(existing) => {
                    let mut fields: Vec<&String> = ts.object_field_count.keys().collect();
                    fields.sort();
                    for field in fields {
                        if existing.has_column(field) {
                            continue;
                        }
                        let histogram = &ts.object_field_count[field];
                        let value_type = autoscope_core::stats::max_key(histogram);
                        let Some(column_type) = promoted_column_type(&value_type) else {
                            continue;
                        };
                        if histogram[&value_type] >= config.new_field_threshold {
                            steps.push(MigrationStep::PromoteField {
                                table_name: table.clone(),
                                column: field.clone(),
                                column_type: column_type.to_string(),
                            });
                        }
                    }
                }
                None => {
                    if ts.insert_queries >= config.new_table_rows_threshold {
                        steps.push(MigrationStep::CreateTable {
                            table_name: table.clone(),
                            table: Table::new(table.clone())
                                .with_column("autoscope_objectfields", "json"),
                        });
                    }
                }
            }
        }
        Ok(steps)
    }

    /// The per-table permissions, defaulting when nothing was configured.
    pub async fn table_permissions(&self, table: &str) -> ObjectPermissions {
        let permissions = self.shared.permissions.read().await;
        permissions
            .get(&table.to_lowercase())
            .copied()
            .unwrap_or_default()
    }

    pub async fn set_table_permissions(&self, table: &str, perms: ObjectPermissions) {
        self.shared
            .permissions
            .write()
            .await
            .insert(table.to_lowercase(), perms);
    }

    /// The insert gate. A table with no explicit permissions entry falls
    /// back to the default policy; otherwise the everyone bit and the
    /// table's groups decide.
    pub(crate) async fn can_insert(&self, table: &str, user_id: i64) -> Result<bool> {
        let explicit = {
            let permissions = self.shared.permissions.read().await;
            permissions.get(&table.to_lowercase()).copied()
        };
        let Some(perms) = explicit else {
            return Ok(ObjectPermissions::default().owner.insert);
        };

        if perms.everyone.insert {
            return Ok(true);
        }
        if perms.group.insert {
            for group_id in self.table_groups(table).await? {
                if self.user_in_group(user_id, group_id).await? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    pub(crate) async fn schema_snapshot(&self) -> Schema {
        self.shared.schema.read().await.clone()
    }

    async fn prefixes_for(&self, table: &str, selection: &Formula) -> Prefixes {
        // Selections without relational paths need no inference, and must
        // not touch the stats lock: the flush path issues raw queries
        // while holding the local-stats lock.
        if !selection.attrs().iter().any(|attr| attr.contains("__")) {
            return Prefixes::new();
        }
        let stats = self.shared.global_stats.read().await;
        planner::gen_prefixes(&stats, table, selection)
    }
}

fn promoted_column_type(value_type: &str) -> Option<&'static str> {
    match value_type {
        "int" => Some("bigint"),
        "float" => Some("float8"),
        "string" => Some("text"),
        _ => None,
    }
}
