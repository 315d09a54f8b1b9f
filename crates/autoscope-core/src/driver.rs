use crate::{
    config::Config,
    schema::{MigrationStep, Schema},
    stmt::{DeleteQuery, InsertQuery, SelectQuery, UpdateQuery, Value},
    Error, Result,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Debug;

/// One hop of an inferred relational path.
///
/// For the prefix `__a__b` inside `a__b__field`: `table` is the inferred
/// target of the hop, `from_table`/`from_table_prefix`/`from_field` name
/// where the hop starts. Derived per query; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationPath {
    pub table: String,
    pub from_table: String,
    pub from_table_prefix: String,
    pub from_field: String,
}

/// All relational prefixes discovered in one query, keyed by prefix string.
/// The root of the query is always aliased `__root`.
pub type Prefixes = HashMap<String, RelationPath>;

/// A single result row.
pub type Row = HashMap<String, Value>;

/// Outcome of an insert, update, or delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteResult {
    pub last_id: i64,
    pub rows_affected: i64,
}

impl WriteResult {
    /// The sentinel returned when permission filtering rejects a write.
    pub fn empty() -> Self {
        Self {
            last_id: -1,
            rows_affected: 0,
        }
    }
}

/// Forward-only cursor over retrieved rows.
///
/// `get` fails with a not-found error before the first `next` and after
/// `next` has returned false.
pub trait Rows: Debug + Send {
    fn next(&mut self) -> bool;
    fn get(&self) -> Result<Row>;
}

/// Storage capability every backend provides.
///
/// Backends are interchangeable: the engine is written against this trait
/// only, and correctness tests run against each implementation.
#[async_trait]
pub trait StorageDriver: Debug + Send + Sync + 'static {
    /// Establishes the connection. Idempotent.
    async fn connect(&self, config: &Config) -> Result<()>;

    /// Introspects the current physical schema.
    async fn current_schema(&self) -> Result<Schema>;

    /// Applies migration steps in list order. Creating a table also moves
    /// matching rows out of the unassigned table.
    async fn perform_migration(&self, steps: &[MigrationStep]) -> Result<()>;

    async fn select(
        &self,
        schema: &Schema,
        prefixes: &Prefixes,
        query: &SelectQuery,
    ) -> Result<Box<dyn Rows>>;

    /// Inserts one row. When the target table is absent from `schema` the
    /// row is redirected to the unassigned table with a `table_name`
    /// discriminator and its payload in the sidecar.
    async fn insert(&self, schema: &Schema, query: &InsertQuery) -> Result<WriteResult>;

    /// Updates matching rows, following the same redirection rule as
    /// insert. Sidecar keys not mentioned in the update data are
    /// preserved.
    async fn update(
        &self,
        schema: &Schema,
        prefixes: &Prefixes,
        query: &UpdateQuery,
    ) -> Result<WriteResult>;

    async fn delete(
        &self,
        schema: &Schema,
        prefixes: &Prefixes,
        query: &DeleteQuery,
    ) -> Result<WriteResult>;
}

/// Retrieves a single row from a cursor, failing if none remain.
pub fn get_row(rows: &mut dyn Rows) -> Result<Row> {
    if !rows.next() {
        return Err(Error::not_found("no rows to retrieve"));
    }
    rows.get()
}

/// The sentinel cursor returned when permission filtering rejects a read.
#[derive(Debug, Default)]
pub struct EmptyRows;

impl Rows for EmptyRows {
    fn next(&mut self) -> bool {
        false
    }

    fn get(&self) -> Result<Row> {
        Err(Error::not_found("empty result"))
    }
}

/// A cursor over rows materialized in memory. Both backends return this.
#[derive(Debug, Default)]
pub struct VecRows {
    rows: Vec<Row>,
    pos: usize,
    started: bool,
}

impl VecRows {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows,
            pos: 0,
            started: false,
        }
    }
}

impl Rows for VecRows {
    fn next(&mut self) -> bool {
        if self.started {
            self.pos += 1;
        } else {
            self.started = true;
        }
        self.pos < self.rows.len()
    }

    fn get(&self) -> Result<Row> {
        if !self.started {
            return Err(Error::not_found("get() called before next()"));
        }
        match self.rows.get(self.pos) {
            Some(row) => Ok(row.clone()),
            None => Err(Error::not_found("cursor exhausted")),
        }
    }
}
