//! A simple, thread-safe in-memory storage backend.
//!
//! Rows are stored schemalessly, so declared columns and sidecar fields
//! collapse into one flat map per row. The backend still honors the
//! unassigned redirect so its observable behavior matches the SQL backend:
//! rows for tables missing from the schema snapshot land in
//! `autoscope_unassigned` and are moved out when the table is created.

mod eval;
use eval::{eval, RowSource};

use autoscope_core::{
    async_trait,
    driver::{Prefixes, Row, Rows, StorageDriver, VecRows, WriteResult},
    schema::{MigrationStep, Schema, Table, UNASSIGNED_TABLE},
    stmt::{DeleteQuery, InsertQuery, SelectQuery, UpdateQuery, Value},
    Config, Error, Result,
};
use indexmap::IndexMap;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
pub struct MemDriver {
    tables: RwLock<TableSet>,
}

type TableSet = HashMap<String, Arc<RwLock<MemTable>>>;

#[derive(Debug, Default)]
struct MemTable {
    columns: IndexMap<String, String>,
    indices: Vec<String>,
    rows: BTreeMap<i64, Row>,
    last_id: i64,
}

impl MemDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn table_set(&self) -> RwLockReadGuard<'_, TableSet> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn table_set_mut(&self) -> RwLockWriteGuard<'_, TableSet> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn read(table: &RwLock<MemTable>) -> RwLockReadGuard<'_, MemTable> {
    table.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(table: &RwLock<MemTable>) -> RwLockWriteGuard<'_, MemTable> {
    table.write().unwrap_or_else(PoisonError::into_inner)
}

/// Resolves relational hops against the live table set. Targets that do
/// not physically exist are looked up in the unassigned table.
struct TableSource<'a> {
    tables: &'a TableSet,
}

impl RowSource for TableSource<'_> {
    fn row_by_id(&self, table: &str, id: i64) -> Option<Row> {
        if let Some(found) = self.tables.get(table) {
            return read(found).rows.get(&id).cloned();
        }
        let unassigned = self.tables.get(UNASSIGNED_TABLE)?;
        let guard = read(unassigned);
        let row = guard.rows.get(&id)?;
        (row.get("table_name") == Some(&Value::from(table))).then(|| row.clone())
    }
}

/// Routes a query at the physical table backing `logical`: the table
/// itself when the schema knows it, otherwise the unassigned table with a
/// discriminator to filter by.
fn route(schema: &Schema, logical: &str) -> (String, Option<Value>) {
    let logical = logical.to_lowercase();
    if schema.contains_key(&logical) {
        (logical, None)
    } else {
        (UNASSIGNED_TABLE.to_string(), Some(Value::String(logical)))
    }
}

/// Flattens an explicit `autoscope_objectfields` payload into plain row
/// fields; everything is stored flat here.
fn flatten(data: &IndexMap<String, Value>) -> Vec<(String, Value)> {
    let mut out = Vec::with_capacity(data.len());
    for (key, value) in data {
        if key == "autoscope_objectfields" {
            let parsed = match value {
                Value::Json(serde_json::Value::Object(map)) => Some(map.clone()),
                Value::String(raw) => serde_json::from_str::<serde_json::Value>(raw)
                    .ok()
                    .and_then(|v| v.as_object().cloned()),
                _ => None,
            };
            if let Some(map) = parsed {
                for (k, v) in map {
                    out.push((k, Value::from_json(v)));
                }
                continue;
            }
        }
        out.push((key.clone(), value.clone()));
    }
    out
}

#[async_trait]
impl StorageDriver for MemDriver {
    async fn connect(&self, _config: &Config) -> Result<()> {
        Ok(())
    }

    async fn current_schema(&self) -> Result<Schema> {
        let tables = self.table_set();
        let mut schema = Schema::new();
        for (name, table) in tables.iter() {
            let guard = read(table);
            let mut out = Table::new(name.clone()).created();
            out.columns = guard.columns.clone();
            out.indices = guard.indices.clone();
            schema.insert(name.clone(), out);
        }
        Ok(schema)
    }

    async fn perform_migration(&self, steps: &[MigrationStep]) -> Result<()> {
        for step in steps {
            match step {
                MigrationStep::CreateTable { table_name, table } => {
                    let mut tables = self.table_set_mut();
                    if tables.contains_key(table_name) {
                        return Err(Error::invariant_violation(format!(
                            "table `{table_name}` already exists"
                        )));
                    }

                    let mut created = MemTable {
                        columns: table.columns.clone(),
                        indices: table.indices.clone(),
                        ..Default::default()
                    };

                    // Move, not copy, any rows parked under this name.
                    if let Some(unassigned) = tables.get(UNASSIGNED_TABLE) {
                        let mut guard = write(unassigned);
                        let discriminator = Value::from(table_name.as_str());
                        let moved: Vec<i64> = guard
                            .rows
                            .iter()
                            .filter(|(_, row)| row.get("table_name") == Some(&discriminator))
                            .map(|(id, _)| *id)
                            .collect();
                        for id in moved {
                            if let Some(mut row) = guard.rows.remove(&id) {
                                row.remove("table_name");
                                created.last_id = created.last_id.max(id);
                                created.rows.insert(id, row);
                            }
                        }
                    }

                    tables.insert(table_name.clone(), Arc::new(RwLock::new(created)));
                }

                MigrationStep::PromoteField {
                    table_name,
                    column,
                    column_type,
                } => {
                    let tables = self.table_set();
                    let table = tables.get(table_name).ok_or_else(|| {
                        Error::schema_mismatch(format!(
                            "cannot promote `{column}` on missing table `{table_name}`"
                        ))
                    })?;
                    // Storage is flat, so promotion only records the column.
                    write(table).columns.insert(column.clone(), column_type.clone());
                }

                MigrationStep::IndexColumn { table_name, column } => {
                    let tables = self.table_set();
                    let table = tables.get(table_name).ok_or_else(|| {
                        Error::schema_mismatch(format!(
                            "cannot index `{column}` on missing table `{table_name}`"
                        ))
                    })?;
                    let mut guard = write(table);
                    if !guard.indices.contains(column) {
                        guard.indices.push(column.clone());
                    }
                }
            }
        }
        Ok(())
    }

    async fn select(
        &self,
        schema: &Schema,
        prefixes: &Prefixes,
        query: &SelectQuery,
    ) -> Result<Box<dyn Rows>> {
        let (target, discriminator) = route(schema, &query.table);
        let tables = self.table_set();
        let table = tables
            .get(&target)
            .ok_or_else(|| Error::schema_mismatch(format!("table `{target}` does not exist")))?;

        let snapshot: Vec<Row> = read(table).rows.values().cloned().collect();
        let source = TableSource { tables: &tables };

        let mut out = Vec::new();
        for row in snapshot {
            if let Some(wanted) = &discriminator {
                if row.get("table_name") != Some(wanted) {
                    continue;
                }
            }
            if eval(&source, prefixes, &row, &query.selection) {
                out.push(row);
            }
        }
        Ok(Box::new(VecRows::new(out)))
    }

    async fn insert(&self, schema: &Schema, query: &InsertQuery) -> Result<WriteResult> {
        let (target, discriminator) = route(schema, &query.table);
        let tables = self.table_set();
        let table = tables
            .get(&target)
            .ok_or_else(|| Error::schema_mismatch(format!("table `{target}` does not exist")))?;

        let mut guard = write(table);
        guard.last_id += 1;
        let id = guard.last_id;

        let mut row = Row::new();
        for (key, value) in flatten(&query.data) {
            row.insert(key, value);
        }
        if let Some(logical) = discriminator {
            row.insert("table_name".to_string(), logical);
        }
        row.insert("id".to_string(), Value::I64(id));
        guard.rows.insert(id, row);

        Ok(WriteResult {
            last_id: id,
            rows_affected: 1,
        })
    }

    async fn update(
        &self,
        schema: &Schema,
        prefixes: &Prefixes,
        query: &UpdateQuery,
    ) -> Result<WriteResult> {
        let (target, discriminator) = route(schema, &query.table);
        let tables = self.table_set();
        let table = tables
            .get(&target)
            .ok_or_else(|| Error::schema_mismatch(format!("table `{target}` does not exist")))?;

        let matching = matching_ids(&tables, table, prefixes, &query.selection, &discriminator);

        let updates = flatten(&query.data);
        let mut guard = write(table);
        let mut affected = 0;
        for id in matching {
            if let Some(row) = guard.rows.get_mut(&id) {
                for (key, value) in &updates {
                    row.insert(key.clone(), value.clone());
                }
                affected += 1;
            }
        }

        Ok(WriteResult {
            last_id: -1,
            rows_affected: affected,
        })
    }

    async fn delete(
        &self,
        schema: &Schema,
        prefixes: &Prefixes,
        query: &DeleteQuery,
    ) -> Result<WriteResult> {
        let (target, discriminator) = route(schema, &query.table);
        let tables = self.table_set();
        let table = tables
            .get(&target)
            .ok_or_else(|| Error::schema_mismatch(format!("table `{target}` does not exist")))?;

        let matching = matching_ids(&tables, table, prefixes, &query.selection, &discriminator);

        let mut guard = write(table);
        let mut affected = 0;
        for id in matching {
            if guard.rows.remove(&id).is_some() {
                affected += 1;
            }
        }

        Ok(WriteResult {
            last_id: -1,
            rows_affected: affected,
        })
    }
}

/// Snapshot pass: ids of rows matching the selection. Evaluation happens
/// outside the table's write lock.
fn matching_ids(
    tables: &TableSet,
    table: &RwLock<MemTable>,
    prefixes: &Prefixes,
    selection: &autoscope_core::stmt::Formula,
    discriminator: &Option<Value>,
) -> Vec<i64> {
    let snapshot: Vec<Row> = read(table).rows.values().cloned().collect();
    let source = TableSource { tables };

    snapshot
        .into_iter()
        .filter(|row| {
            if let Some(wanted) = discriminator {
                if row.get("table_name") != Some(wanted) {
                    return false;
                }
            }
            eval(&source, prefixes, row, selection)
        })
        .filter_map(|row| row.get("id").and_then(Value::as_i64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoscope_core::driver::get_row;
    use autoscope_core::schema::{base_columns, default_schema};
    use autoscope_core::stmt::Formula;

    fn data(pairs: &[(&str, Value)]) -> IndexMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    async fn driver_with_defaults() -> (MemDriver, Schema) {
        let db = MemDriver::new();
        let desired = default_schema();
        let steps = autoscope_core::schema::migration_diff(&Schema::new(), &desired);
        db.perform_migration(&steps).await.unwrap();
        let schema = db.current_schema().await.unwrap();
        (db, schema)
    }

    #[tokio::test]
    async fn insert_into_missing_table_spills_to_unassigned() {
        let (db, schema) = driver_with_defaults().await;

        let query = InsertQuery::new("ghosts", data(&[("name", Value::from("casper"))]));
        let res = db.insert(&schema, &query).await.unwrap();
        assert_eq!(res.rows_affected, 1);

        // Selecting through the logical name sees the row.
        let select = SelectQuery {
            table: "ghosts".to_string(),
            selection: Formula::eq("name", "casper"),
        };
        let mut rows = db.select(&schema, &Prefixes::new(), &select).await.unwrap();
        let row = get_row(rows.as_mut()).unwrap();
        assert_eq!(row["name"], Value::from("casper"));
        assert_eq!(row["table_name"], Value::from("ghosts"));
    }

    #[tokio::test]
    async fn create_table_moves_unassigned_rows() {
        let (db, schema) = driver_with_defaults().await;

        for name in ["casper", "slimer"] {
            let query = InsertQuery::new("ghosts", data(&[("name", Value::from(name))]));
            db.insert(&schema, &query).await.unwrap();
        }
        let other = InsertQuery::new("vampires", data(&[("name", Value::from("vlad"))]));
        db.insert(&schema, &other).await.unwrap();

        let step = MigrationStep::CreateTable {
            table_name: "ghosts".to_string(),
            table: base_columns(Table::new("ghosts")),
        };
        db.perform_migration(&[step]).await.unwrap();
        let schema = db.current_schema().await.unwrap();

        // Moved rows answer from the new table, without the discriminator.
        let select = SelectQuery {
            table: "ghosts".to_string(),
            selection: Formula::Tautology,
        };
        let mut rows = db.select(&schema, &Prefixes::new(), &select).await.unwrap();
        let mut count = 0;
        while rows.next() {
            let row = rows.get().unwrap();
            assert!(!row.contains_key("table_name"));
            count += 1;
        }
        assert_eq!(count, 2);

        // The unmatched row stays parked.
        let select = SelectQuery {
            table: "vampires".to_string(),
            selection: Formula::Tautology,
        };
        let mut rows = db.select(&schema, &Prefixes::new(), &select).await.unwrap();
        assert!(rows.next());
        assert!(!rows.next());
    }

    #[tokio::test]
    async fn update_preserves_unmentioned_fields() {
        let (db, mut schema) = driver_with_defaults().await;
        let step = MigrationStep::CreateTable {
            table_name: "t".to_string(),
            table: base_columns(Table::new("t")).with_column("col_a", "bigint"),
        };
        db.perform_migration(&[step]).await.unwrap();
        schema = db.current_schema().await.unwrap();

        let insert = InsertQuery::new(
            "t",
            data(&[
                ("col_a", Value::I64(1)),
                ("x", Value::I64(7)),
                ("y", Value::I64(8)),
            ]),
        );
        db.insert(&schema, &insert).await.unwrap();

        let update = UpdateQuery::filter(
            "t",
            data(&[("col_a", Value::I64(1))]),
            data(&[("x", Value::I64(9))]),
        );
        let res = db.update(&schema, &Prefixes::new(), &update).await.unwrap();
        assert_eq!(res.rows_affected, 1);

        let select = SelectQuery {
            table: "t".to_string(),
            selection: Formula::eq("col_a", 1),
        };
        let mut rows = db.select(&schema, &Prefixes::new(), &select).await.unwrap();
        let row = get_row(rows.as_mut()).unwrap();
        assert_eq!(row["x"], Value::I64(9));
        assert_eq!(row["y"], Value::I64(8));
    }

    #[tokio::test]
    async fn ids_are_monotonic_per_table() {
        let (db, schema) = driver_with_defaults().await;
        let mut last = 0;
        for i in 0..5 {
            let query = InsertQuery::new(
                "autoscope_groups",
                data(&[("name", Value::from(format!("g{i}")))]),
            );
            let res = db.insert(&schema, &query).await.unwrap();
            assert!(res.last_id > last);
            last = res.last_id;
        }
    }

    #[tokio::test]
    async fn delete_removes_matching_rows() {
        let (db, schema) = driver_with_defaults().await;
        for name in ["a", "b"] {
            let query = InsertQuery::new("autoscope_groups", data(&[("name", Value::from(name))]));
            db.insert(&schema, &query).await.unwrap();
        }

        let delete = DeleteQuery {
            table: "autoscope_groups".to_string(),
            selection: Formula::eq("name", "a"),
        };
        let res = db.delete(&schema, &Prefixes::new(), &delete).await.unwrap();
        assert_eq!(res.rows_affected, 1);

        let select = SelectQuery {
            table: "autoscope_groups".to_string(),
            selection: Formula::Tautology,
        };
        let mut rows = db.select(&schema, &Prefixes::new(), &select).await.unwrap();
        assert!(rows.next());
        assert!(!rows.next());
    }
}
