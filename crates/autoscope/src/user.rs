//! User, group, and table-group management, built on the raw engine
//! operations so it never recurses through the permission filter.

use crate::{auth::CredentialVerifier, engine::Engine};
use autoscope_core::{
    driver::get_row,
    stmt::{InsertQuery, SelectQuery, Value},
    Result,
};
use indexmap::IndexMap;

fn pairs(entries: &[(&str, Value)]) -> IndexMap<String, Value> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

impl Engine {
    /// Creates a user. The password never reaches storage; only the
    /// verifier-produced hash does.
    pub async fn create_user(
        &self,
        verifier: &dyn CredentialVerifier,
        username: &str,
        password: &str,
    ) -> Result<i64> {
        let result = self
            .raw_insert(InsertQuery::new(
                "autoscope_users",
                pairs(&[
                    ("username", Value::from(username)),
                    ("passhash", Value::from(verifier.hash(password))),
                ]),
            ))
            .await?;
        Ok(result.last_id)
    }

    pub async fn user_id(&self, username: &str) -> Result<i64> {
        self.lookup_id("autoscope_users", "username", username).await
    }

    pub async fn create_group(&self, name: &str) -> Result<i64> {
        let result = self
            .raw_insert(InsertQuery::new(
                "autoscope_groups",
                pairs(&[("name", Value::from(name))]),
            ))
            .await?;
        Ok(result.last_id)
    }

    pub async fn group_id(&self, name: &str) -> Result<i64> {
        self.lookup_id("autoscope_groups", "name", name).await
    }

    pub async fn add_user_to_group(&self, user_id: i64, group_id: i64) -> Result<()> {
        self.raw_insert(InsertQuery::new(
            "autoscope_user_groups",
            pairs(&[
                ("user_id", Value::I64(user_id)),
                ("group_id", Value::I64(group_id)),
            ]),
        ))
        .await?;
        Ok(())
    }

    pub async fn user_in_group(&self, user_id: i64, group_id: i64) -> Result<bool> {
        let mut rows = self
            .raw_select(SelectQuery::filter(
                "autoscope_user_groups",
                pairs(&[
                    ("user_id", Value::I64(user_id)),
                    ("group_id", Value::I64(group_id)),
                ]),
            ))
            .await?;
        Ok(rows.next())
    }

    /// Every group the user belongs to.
    pub async fn user_groups(&self, user_id: i64) -> Result<Vec<i64>> {
        let mut rows = self
            .raw_select(SelectQuery::filter(
                "autoscope_user_groups",
                pairs(&[("user_id", Value::I64(user_id))]),
            ))
            .await?;

        let mut groups = Vec::new();
        while rows.next() {
            let row = rows.get()?;
            if let Some(group_id) = row.get("group_id").and_then(Value::as_i64) {
                groups.push(group_id);
            }
        }
        Ok(groups)
    }

    /// Grants a group insert rights on a table. In the absence of a
    /// row-level gid, a table's groups act as the row group for inserts.
    pub async fn add_table_group(&self, table: &str, group_id: i64) -> Result<()> {
        self.raw_insert(InsertQuery::new(
            "autoscope_table_groups",
            pairs(&[
                ("table_name", Value::from(table.to_lowercase())),
                ("group_id", Value::I64(group_id)),
            ]),
        ))
        .await?;
        Ok(())
    }

    pub async fn table_groups(&self, table: &str) -> Result<Vec<i64>> {
        let mut rows = self
            .raw_select(SelectQuery::filter(
                "autoscope_table_groups",
                pairs(&[("table_name", Value::from(table.to_lowercase()))]),
            ))
            .await?;

        let mut groups = Vec::new();
        while rows.next() {
            let row = rows.get()?;
            if let Some(group_id) = row.get("group_id").and_then(Value::as_i64) {
                groups.push(group_id);
            }
        }
        Ok(groups)
    }

    async fn lookup_id(&self, table: &str, column: &str, value: &str) -> Result<i64> {
        let mut rows = self
            .raw_select(SelectQuery::filter(
                table,
                pairs(&[(column, Value::from(value))]),
            ))
            .await?;
        let row = get_row(rows.as_mut())?;
        row.get("id")
            .and_then(Value::as_i64)
            .ok_or_else(|| autoscope_core::Error::not_found(format!("`{table}` row without id")))
    }
}
