//! PostgreSQL storage backend.
//!
//! Declared columns map to native columns; everything else lives in the
//! `autoscope_objectfields` jsonb sidecar. Tables missing from the schema
//! snapshot route through `autoscope_unassigned`. Physical table names
//! carry the configured `db_prefix`.

mod value;
use value::{from_sql, PgValue};

use autoscope_core::{
    async_trait,
    driver::{Prefixes, Row, Rows, StorageDriver, VecRows, WriteResult},
    schema::{ColumnInfo, MigrationStep, Schema, Table},
    stmt::{DeleteQuery, InsertQuery, SelectQuery, UpdateQuery, Value},
    Config, Error, Result,
};
use autoscope_sql::{self as sql, escape_ident, physical_table};
use std::fmt;
use tokio::sync::OnceCell;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, error};

pub struct PostgresDriver {
    state: OnceCell<Connected>,
}

struct Connected {
    client: Client,
    table_prefix: String,
}

impl PostgresDriver {
    pub fn new() -> Self {
        Self {
            state: OnceCell::new(),
        }
    }

    fn connected(&self) -> Result<&Connected> {
        self.state
            .get()
            .ok_or_else(|| Error::invariant_violation("postgres driver is not connected"))
    }

    fn physical(&self, table: &str) -> Result<String> {
        Ok(physical_table(&self.connected()?.table_prefix, table))
    }
}

impl Default for PostgresDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PostgresDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresDriver")
            .field("connected", &self.state.get().is_some())
            .finish()
    }
}

fn params(args: &[PgValue]) -> Vec<&(dyn tokio_postgres::types::ToSql + Sync)> {
    args.iter()
        .map(|arg| arg as &(dyn tokio_postgres::types::ToSql + Sync))
        .collect()
}

/// The column type actually handed to postgres for a logical column type.
fn pg_column_type(ty: &str) -> &str {
    match ty {
        "json" => "jsonb",
        "string" => "text",
        "int" => "bigint",
        "float" => "float8",
        other => other,
    }
}

#[async_trait]
impl StorageDriver for PostgresDriver {
    async fn connect(&self, config: &Config) -> Result<()> {
        self.state
            .get_or_try_init(|| async {
                let mut pg = tokio_postgres::Config::new();
                pg.host(&config.db_host)
                    .user(&config.db_user)
                    .dbname(&config.db_name);
                if !config.db_password.is_empty() {
                    pg.password(&config.db_password);
                }

                let (client, connection) = pg.connect(NoTls).await.map_err(Error::backend)?;
                tokio::spawn(async move {
                    if let Err(err) = connection.await {
                        error!("postgres connection error: {err}");
                    }
                });

                Ok::<_, Error>(Connected {
                    client,
                    table_prefix: config.db_prefix.clone(),
                })
            })
            .await?;
        Ok(())
    }

    async fn current_schema(&self) -> Result<Schema> {
        let state = self.connected()?;
        let rows = state
            .client
            .query(
                "SELECT table_name::text, column_name::text, data_type::text, \
                 character_maximum_length::int4, numeric_precision::int4, \
                 numeric_precision_radix::int4, numeric_scale::int4 \
                 FROM information_schema.columns WHERE table_schema = 'public'",
                &[],
            )
            .await
            .map_err(Error::backend)?;

        let mut schema = Schema::new();
        for row in rows {
            let physical: String = row.try_get(0).map_err(Error::backend)?;
            let Some(name) = physical.strip_prefix(&state.table_prefix) else {
                continue;
            };

            let info = ColumnInfo {
                name: row.try_get(1).map_err(Error::backend)?,
                data_type: row.try_get(2).map_err(Error::backend)?,
                char_max_length: row
                    .try_get::<_, Option<i32>>(3)
                    .map_err(Error::backend)?
                    .map(i64::from),
                numeric_precision: row
                    .try_get::<_, Option<i32>>(4)
                    .map_err(Error::backend)?
                    .map(i64::from),
                numeric_precision_radix: row
                    .try_get::<_, Option<i32>>(5)
                    .map_err(Error::backend)?
                    .map(i64::from),
                numeric_scale: row
                    .try_get::<_, Option<i32>>(6)
                    .map_err(Error::backend)?
                    .map(i64::from),
            };

            let table = schema
                .entry(name.to_string())
                .or_insert_with(|| Table::new(name).created());
            table.columns.insert(info.name.clone(), info.to_string());
        }
        Ok(schema)
    }

    async fn perform_migration(&self, steps: &[MigrationStep]) -> Result<()> {
        for step in steps {
            debug!("applying migration step: {step}");
            match step {
                MigrationStep::CreateTable { table_name, table } => {
                    self.create_table(table_name, table).await?;
                    self.adopt_unassigned_rows(table_name).await?;
                }
                MigrationStep::PromoteField {
                    table_name,
                    column,
                    column_type,
                } => self.promote_field(table_name, column, column_type).await?,
                MigrationStep::IndexColumn { table_name, column } => {
                    self.index_column(table_name, column).await?
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
        let state = self.connected()?;
        let planned = sql::plan_select(schema, prefixes, query, &state.table_prefix)?;
        debug!(sql = %planned.sql, "select");

        let args: Vec<PgValue> = planned.args.into_iter().map(PgValue).collect();
        let rows = state
            .client
            .query(&planned.sql, &params(&args))
            .await
            .map_err(Error::backend)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(decode_row(row)?);
        }
        Ok(Box::new(VecRows::new(out)))
    }

    async fn insert(&self, schema: &Schema, query: &InsertQuery) -> Result<WriteResult> {
        let state = self.connected()?;
        let planned = sql::plan_insert(schema, query, &state.table_prefix)?;
        debug!(sql = %planned.sql, "insert");

        let args: Vec<PgValue> = planned.args.into_iter().map(PgValue).collect();
        let row = state
            .client
            .query_one(&planned.sql, &params(&args))
            .await
            .map_err(Error::backend)?;

        Ok(WriteResult {
            last_id: row.try_get(0).map_err(Error::backend)?,
            rows_affected: 1,
        })
    }

    async fn update(
        &self,
        schema: &Schema,
        prefixes: &Prefixes,
        query: &UpdateQuery,
    ) -> Result<WriteResult> {
        let state = self.connected()?;
        let (table, selection) = sql::redirect(schema, &query.table, query.selection.clone());
        let (columns, sidecar) = sql::partition_columns(schema, &table, &query.data);

        // Changing sidecar keys rewrites the whole document, so fold in the
        // current values that the update does not mention.
        let sidecar_doc = if sidecar.is_empty() {
            None
        } else {
            Some(serde_json::Value::Object(
                self.merge_existing_sidecar(schema, prefixes, query, &table, sidecar)
                    .await?,
            ))
        };

        let planned = sql::plan_update_parts(
            schema,
            prefixes,
            &table,
            selection,
            &columns,
            sidecar_doc,
            &state.table_prefix,
        )?;
        debug!(sql = %planned.sql, "update");

        let args: Vec<PgValue> = planned.args.into_iter().map(PgValue).collect();
        let affected = state
            .client
            .execute(&planned.sql, &params(&args))
            .await
            .map_err(Error::backend)?;

        Ok(WriteResult {
            last_id: -1,
            rows_affected: affected as i64,
        })
    }

    async fn delete(
        &self,
        schema: &Schema,
        prefixes: &Prefixes,
        query: &DeleteQuery,
    ) -> Result<WriteResult> {
        let state = self.connected()?;
        let planned = sql::plan_delete(schema, prefixes, query, &state.table_prefix)?;
        debug!(sql = %planned.sql, "delete");

        let args: Vec<PgValue> = planned.args.into_iter().map(PgValue).collect();
        let affected = state
            .client
            .execute(&planned.sql, &params(&args))
            .await
            .map_err(Error::backend)?;

        Ok(WriteResult {
            last_id: -1,
            rows_affected: affected as i64,
        })
    }
}

impl PostgresDriver {
    async fn create_table(&self, name: &str, table: &Table) -> Result<()> {
        let state = self.connected()?;

        // Physical base columns come first; the step may add more.
        let mut defs = vec![
            format!("{} bigserial PRIMARY KEY", escape_ident("id")),
            format!("{} bigint", escape_ident("autoscope_uid")),
            format!("{} bigint", escape_ident("autoscope_gid")),
            format!("{} jsonb", escape_ident("autoscope_objectfields")),
        ];
        for (column, ty) in &table.columns {
            if matches!(
                column.as_str(),
                "id" | "autoscope_uid" | "autoscope_gid" | "autoscope_objectfields"
            ) {
                continue;
            }
            defs.push(format!("{} {}", escape_ident(column), pg_column_type(ty)));
        }

        let stmt = format!(
            "CREATE TABLE {} ({})",
            escape_ident(&self.physical(name)?),
            defs.join(", "),
        );
        debug!(sql = %stmt, "create table");
        state.client.execute(&stmt, &[]).await.map_err(Error::backend)?;
        Ok(())
    }

    /// Moves rows parked in the unassigned table into a freshly created
    /// table.
    async fn adopt_unassigned_rows(&self, name: &str) -> Result<()> {
        let state = self.connected()?;
        let unassigned = escape_ident(&self.physical("autoscope_unassigned")?);
        let target = escape_ident(&self.physical(name)?);

        let stmt = format!(
            "SELECT {id}, {uid}, {gid}, {fields} FROM {unassigned} WHERE {tn} = $1",
            id = escape_ident("id"),
            uid = escape_ident("autoscope_uid"),
            gid = escape_ident("autoscope_gid"),
            fields = escape_ident("autoscope_objectfields"),
            tn = escape_ident("table_name"),
        );
        let rows = state
            .client
            .query(&stmt, &[&name])
            .await
            .map_err(Error::backend)?;

        let insert = format!(
            "INSERT INTO {target} ({uid}, {gid}, {fields}) VALUES ($1, $2, $3)",
            uid = escape_ident("autoscope_uid"),
            gid = escape_ident("autoscope_gid"),
            fields = escape_ident("autoscope_objectfields"),
        );
        let remove = format!(
            "DELETE FROM {unassigned} WHERE {id} = $1",
            id = escape_ident("id"),
        );

        for row in rows {
            let id: i64 = row.try_get(0).map_err(Error::backend)?;
            let uid: Option<i64> = row.try_get(1).map_err(Error::backend)?;
            let gid: Option<i64> = row.try_get(2).map_err(Error::backend)?;
            let fields: Option<serde_json::Value> = row.try_get(3).map_err(Error::backend)?;

            state
                .client
                .execute(&insert, &[&uid, &gid, &fields])
                .await
                .map_err(Error::backend)?;
            state
                .client
                .execute(&remove, &[&id])
                .await
                .map_err(Error::backend)?;
        }
        Ok(())
    }

    async fn promote_field(&self, table: &str, column: &str, column_type: &str) -> Result<()> {
        let state = self.connected()?;
        let physical = escape_ident(&self.physical(table)?);

        // No-op when a compatible column already exists.
        let stmt = format!(
            "ALTER TABLE {physical} ADD COLUMN IF NOT EXISTS {} {}",
            escape_ident(column),
            pg_column_type(column_type),
        );
        debug!(sql = %stmt, "promote field");
        state.client.execute(&stmt, &[]).await.map_err(Error::backend)?;

        // Per-row promotion: move the sidecar value into the column.
        let stmt = format!(
            "SELECT {id}, {fields} FROM {physical} WHERE {fields} ->> $1 IS NOT NULL",
            id = escape_ident("id"),
            fields = escape_ident("autoscope_objectfields"),
        );
        let rows = state
            .client
            .query(&stmt, &[&column])
            .await
            .map_err(Error::backend)?;

        let update = format!(
            "UPDATE {physical} SET {col} = $1, {fields} = $2 WHERE {id} = $3",
            col = escape_ident(column),
            fields = escape_ident("autoscope_objectfields"),
            id = escape_ident("id"),
        );

        for row in rows {
            let id: i64 = row.try_get(0).map_err(Error::backend)?;
            let mut fields: serde_json::Value = row.try_get(1).map_err(Error::backend)?;
            let Some(object) = fields.as_object_mut() else {
                continue;
            };
            let Some(raw) = object.remove(column) else {
                continue;
            };

            let promoted = coerce_promoted(raw, column_type);
            state
                .client
                .execute(&update, &[&PgValue(promoted), &PgValue(Value::Json(fields)), &id])
                .await
                .map_err(Error::backend)?;
        }
        Ok(())
    }

    async fn index_column(&self, table: &str, column: &str) -> Result<()> {
        let state = self.connected()?;
        let index_name = format!("idx_{}_{}", self.physical(table)?, column);
        let stmt = format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
            escape_ident(&index_name),
            escape_ident(&self.physical(table)?),
            escape_ident(column),
        );
        debug!(sql = %stmt, "index column");
        state.client.execute(&stmt, &[]).await.map_err(Error::backend)?;
        Ok(())
    }

    /// Reads the first matching row and keeps its sidecar entries that the
    /// update data does not overwrite.
    async fn merge_existing_sidecar(
        &self,
        schema: &Schema,
        prefixes: &Prefixes,
        query: &UpdateQuery,
        table: &str,
        mut sidecar: serde_json::Map<String, serde_json::Value>,
    ) -> Result<serde_json::Map<String, serde_json::Value>> {
        let select = SelectQuery {
            table: query.table.clone(),
            selection: query.selection.clone(),
        };
        let mut rows = self.select(schema, prefixes, &select).await?;
        if rows.next() {
            let current = rows.get()?;
            for (key, value) in current {
                let declared = schema.get(table).is_some_and(|t| t.has_column(&key));
                if !declared && !sidecar.contains_key(&key) {
                    sidecar.insert(key, value.to_json());
                }
            }
        }
        Ok(sidecar)
    }
}

/// Decodes a result row, expanding the sidecar into plain fields. A sidecar
/// key that collides with a returned column is an invariant violation.
fn decode_row(row: &tokio_postgres::Row) -> Result<Row> {
    let mut out = Row::new();
    let mut sidecar: Option<serde_json::Value> = None;

    for (index, column) in row.columns().iter().enumerate() {
        let value = from_sql(row, index)?;
        if column.name() == "autoscope_objectfields" {
            if let Value::Json(doc) = value {
                sidecar = Some(doc);
            }
            continue;
        }
        out.insert(column.name().to_string(), value);
    }

    if let Some(serde_json::Value::Object(fields)) = sidecar {
        for (key, value) in fields {
            if out.contains_key(&key) {
                return Err(Error::invariant_violation(format!(
                    "object field `{key}` already exists as a column in the row"
                )));
            }
            out.insert(key, Value::from_json(value));
        }
    }

    Ok(out)
}

fn coerce_promoted(raw: serde_json::Value, column_type: &str) -> Value {
    let base = column_type.split('(').next().unwrap_or(column_type);
    match base {
        "bigint" | "int" | "integer" | "int8" => match &raw {
            serde_json::Value::Number(n) => n.as_i64().map(Value::I64).unwrap_or(Value::Null),
            serde_json::Value::String(s) => s.parse().map(Value::I64).unwrap_or(Value::Null),
            _ => Value::Null,
        },
        "float8" | "float" | "double precision" => match &raw {
            serde_json::Value::Number(n) => n.as_f64().map(Value::F64).unwrap_or(Value::Null),
            serde_json::Value::String(s) => s.parse().map(Value::F64).unwrap_or(Value::Null),
            _ => Value::Null,
        },
        _ => match raw {
            serde_json::Value::String(s) => Value::String(s),
            other => Value::String(other.to_string()),
        },
    }
}
