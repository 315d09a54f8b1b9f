//! The two-tier statistics store.
//!
//! Every authenticated query increments both the local (delta since last
//! flush) and global (materialized) maps. Flushing upserts the local
//! deltas into the internal stats tables and zeroes them; reloading
//! rebuilds the global map from those tables plus any unflushed local
//! deltas, so nothing observed between a flush and a reload is lost.

use crate::engine::Engine;
use autoscope_core::{
    driver::Row,
    schema::is_integer_type,
    stats::TableQueryStats,
    stmt::{restrictions, Formula, InsertQuery, SelectQuery, UpdateQuery, Value},
    Error, Result,
};
use indexmap::IndexMap;
use std::collections::HashMap;

impl Engine {
    pub(crate) async fn record_select(&self, query: &SelectQuery) {
        self.record(&query.table, |stats| {
            stats.select_queries += 1;
            for attr in query.selection.attrs() {
                stats.record_restriction(attr);
            }
        })
        .await;
    }

    pub(crate) async fn record_insert(&self, query: &InsertQuery) {
        self.record(&query.table, |stats| {
            stats.insert_queries += 1;
            record_data(stats, &query.data, &query.types);
            // Every insert also produces a primary key.
            stats.record_object_field("id", "int");
            for (field, target) in &query.foreign_keys {
                stats.record_foreign_key(field, target);
            }
        })
        .await;
    }

    pub(crate) async fn record_update(&self, query: &UpdateQuery) {
        self.record(&query.table, |stats| {
            stats.update_queries += 1;
            for attr in query.selection.attrs() {
                stats.record_restriction(attr);
            }
            record_data(stats, &query.data, &query.types);
            for (field, target) in &query.foreign_keys {
                stats.record_foreign_key(field, target);
            }
        })
        .await;
    }

    /// Applies one increment to both tiers under the global write lock.
    async fn record(&self, table: &str, apply: impl Fn(&mut TableQueryStats)) {
        let table = table.to_lowercase();
        let mut global = self.shared.global_stats.write().await;
        let mut local = self.shared.local_stats.lock().await;
        apply(global.entry(table.clone()).or_default());
        apply(local.entry(table).or_default());
    }

    /// Merges externally collected deltas into the local tier. The next
    /// flush persists them.
    pub async fn add_local_stats(&self, table: &str, stats: TableQueryStats) {
        let mut local = self.shared.local_stats.lock().await;
        local.entry(table.to_lowercase()).or_default().merge(&stats);
    }

    pub async fn global_table_stats(&self, table: &str) -> Option<TableQueryStats> {
        self.shared.global_stats.read().await.get(table).cloned()
    }

    /// Writes all local deltas to the internal stats tables. Each counter
    /// is zeroed only after its upsert succeeds.
    pub async fn flush_stats(&self) -> Result<()> {
        let mut local = self.shared.local_stats.lock().await;

        for (table, stats) in local.iter_mut() {
            if stats.insert_queries != 0 || stats.select_queries != 0 || stats.update_queries != 0
            {
                self.increment_columns(
                    "autoscope_table_stats",
                    &[("table_name", Value::from(table.as_str()))],
                    &[
                        ("insert_queries", stats.insert_queries),
                        ("select_queries", stats.select_queries),
                        ("update_queries", stats.update_queries),
                    ],
                )
                .await?;
                stats.insert_queries = 0;
                stats.select_queries = 0;
                stats.update_queries = 0;
            }

            let fields: Vec<String> = stats.restrictions.keys().cloned().collect();
            for field in fields {
                let count = stats.restrictions[&field];
                if count == 0 {
                    continue;
                }
                self.increment_columns(
                    "autoscope_restriction_stats",
                    &[
                        ("table_name", Value::from(table.as_str())),
                        ("col_name", Value::from(field.as_str())),
                    ],
                    &[("count", count)],
                )
                .await?;
                stats.restrictions.insert(field, 0);
            }

            let fields: Vec<String> = stats.object_field_count.keys().cloned().collect();
            for field in fields {
                let types: Vec<String> =
                    stats.object_field_count[&field].keys().cloned().collect();
                for value_type in types {
                    let count = stats.object_field_count[&field][&value_type];
                    if count == 0 {
                        continue;
                    }
                    self.increment_columns(
                        "autoscope_objectfield_stats",
                        &[
                            ("table_name", Value::from(table.as_str())),
                            ("col_name", Value::from(field.as_str())),
                            ("value_type", Value::from(value_type.as_str())),
                        ],
                        &[("count", count)],
                    )
                    .await?;
                    if let Some(histogram) = stats.object_field_count.get_mut(&field) {
                        histogram.insert(value_type, 0);
                    }
                }
            }

            let fields: Vec<String> = stats.foreign_key_count.keys().cloned().collect();
            for field in fields {
                let targets: Vec<String> =
                    stats.foreign_key_count[&field].keys().cloned().collect();
                for target in targets {
                    let count = stats.foreign_key_count[&field][&target];
                    if count == 0 {
                        continue;
                    }
                    self.increment_columns(
                        "autoscope_foreignkey_stats",
                        &[
                            ("table_name", Value::from(table.as_str())),
                            ("col_name", Value::from(field.as_str())),
                            ("foreign_table", Value::from(target.as_str())),
                        ],
                        &[("count", count)],
                    )
                    .await?;
                    if let Some(histogram) = stats.foreign_key_count.get_mut(&field) {
                        histogram.insert(target, 0);
                    }
                }
            }
        }
        Ok(())
    }

    /// Atomic increment-or-insert on an internal stats table: rows are
    /// matched by the discriminators, counters are added to the current
    /// values or inserted as initial values. Counter columns must be
    /// 64-bit integers.
    pub async fn increment_columns(
        &self,
        table: &str,
        discriminators: &[(&str, Value)],
        counters: &[(&str, i64)],
    ) -> Result<()> {
        {
            let schema = self.shared.schema.read().await;
            if let Some(declared) = schema.get(table) {
                for (column, _) in counters {
                    match declared.columns.get(*column) {
                        Some(ty) if is_integer_type(ty) => {}
                        Some(ty) => {
                            return Err(Error::invariant_violation(format!(
                                "statistics counter `{table}.{column}` must be int64, found `{ty}`"
                            )))
                        }
                        None => {
                            return Err(Error::schema_mismatch(format!(
                                "statistics counter `{table}.{column}` is not declared"
                            )))
                        }
                    }
                }
            }
        }

        let filter: IndexMap<String, Value> = discriminators
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();

        let mut rows = self
            .raw_select(SelectQuery::filter(table, filter.clone()))
            .await?;
        if rows.next() {
            let row = rows.get()?;
            let mut data = IndexMap::new();
            for (column, delta) in counters {
                let current = row.get(*column).and_then(Value::as_i64).unwrap_or(0);
                data.insert(column.to_string(), Value::I64(current + delta));
            }
            self.raw_update(UpdateQuery {
                table: table.to_string(),
                selection: restrictions(filter),
                data,
                foreign_keys: HashMap::new(),
                types: HashMap::new(),
            })
            .await?;
        } else {
            let mut data = filter;
            for (column, delta) in counters {
                data.insert(column.to_string(), Value::I64(*delta));
            }
            self.raw_insert(InsertQuery::new(table, data)).await?;
        }
        Ok(())
    }

    /// Rebuilds the global tier from the four stats tables, folding rows
    /// additively, then folds in unflushed local deltas.
    pub async fn reload_global_stats(&self) -> Result<()> {
        let mut fresh: HashMap<String, TableQueryStats> = HashMap::new();

        let mut rows = self.raw_select(tautology("autoscope_table_stats")).await?;
        while rows.next() {
            let row = rows.get()?;
            let Some(table) = row_str(&row, "table_name") else {
                continue;
            };
            let entry = fresh.entry(table).or_default();
            entry.insert_queries += row_i64(&row, "insert_queries");
            entry.select_queries += row_i64(&row, "select_queries");
            entry.update_queries += row_i64(&row, "update_queries");
        }

        let mut rows = self
            .raw_select(tautology("autoscope_restriction_stats"))
            .await?;
        while rows.next() {
            let row = rows.get()?;
            let (Some(table), Some(col)) = (row_str(&row, "table_name"), row_str(&row, "col_name"))
            else {
                continue;
            };
            *fresh
                .entry(table)
                .or_default()
                .restrictions
                .entry(col)
                .or_insert(0) += row_i64(&row, "count");
        }

        let mut rows = self
            .raw_select(tautology("autoscope_objectfield_stats"))
            .await?;
        while rows.next() {
            let row = rows.get()?;
            let (Some(table), Some(col), Some(value_type)) = (
                row_str(&row, "table_name"),
                row_str(&row, "col_name"),
                row_str(&row, "value_type"),
            ) else {
                continue;
            };
            *fresh
                .entry(table)
                .or_default()
                .object_field_count
                .entry(col)
                .or_default()
                .entry(value_type)
                .or_insert(0) += row_i64(&row, "count");
        }

        let mut rows = self
            .raw_select(tautology("autoscope_foreignkey_stats"))
            .await?;
        while rows.next() {
            let row = rows.get()?;
            let (Some(table), Some(col), Some(target)) = (
                row_str(&row, "table_name"),
                row_str(&row, "col_name"),
                row_str(&row, "foreign_table"),
            ) else {
                continue;
            };
            *fresh
                .entry(table)
                .or_default()
                .foreign_key_count
                .entry(col)
                .or_default()
                .entry(target)
                .or_insert(0) += row_i64(&row, "count");
        }

        let mut global = self.shared.global_stats.write().await;
        let local = self.shared.local_stats.lock().await;
        for (table, stats) in local.iter() {
            fresh.entry(table.clone()).or_default().merge(stats);
        }
        *global = fresh;
        Ok(())
    }
}

fn record_data(
    stats: &mut TableQueryStats,
    data: &IndexMap<String, Value>,
    types: &HashMap<String, String>,
) {
    for (field, value) in data {
        let value_type = types
            .get(field)
            .map(String::as_str)
            .unwrap_or_else(|| value.value_type());
        stats.record_object_field(field, value_type);
    }
}

fn tautology(table: &str) -> SelectQuery {
    SelectQuery {
        table: table.to_string(),
        selection: Formula::Tautology,
    }
}

fn row_str(row: &Row, column: &str) -> Option<String> {
    row.get(column).and_then(|v| v.as_str().map(str::to_string))
}

fn row_i64(row: &Row, column: &str) -> i64 {
    row.get(column).and_then(Value::as_i64).unwrap_or(0)
}
