//! Authentication seams. Password hashing and session-token issuance are
//! boundary concerns; the engine only stores hashes and tokens it is
//! handed and answers authorization queries.

use crate::engine::Engine;
use autoscope_core::{
    driver::get_row,
    stmt::{nest_ands, Formula, InsertQuery, SelectQuery, Value, ValueSelection},
    Result,
};
use indexmap::IndexMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Hashes and verifies passwords. Implementations live outside the
/// engine.
pub trait CredentialVerifier: Send + Sync {
    fn hash(&self, password: &str) -> String;
    fn verify(&self, password: &str, passhash: &str) -> bool;
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

impl Engine {
    /// Checks a password against the stored hash. Unknown usernames are a
    /// not-found error, as the caller needs to distinguish them.
    pub async fn login(
        &self,
        verifier: &dyn CredentialVerifier,
        username: &str,
        password: &str,
    ) -> Result<bool> {
        let mut filter = IndexMap::new();
        filter.insert("username".to_string(), Value::from(username));
        let mut rows = self
            .raw_select(SelectQuery::filter("autoscope_users", filter))
            .await?;
        let user = get_row(rows.as_mut())?;

        let Some(Value::String(passhash)) = user.get("passhash") else {
            return Ok(false);
        };
        Ok(verifier.verify(password, passhash))
    }

    /// Records a session under a caller-issued token.
    pub async fn create_session(&self, username: &str, session_id: &str) -> Result<()> {
        let mut data = IndexMap::new();
        data.insert("username".to_string(), Value::from(username));
        data.insert("session_id".to_string(), Value::from(session_id));
        data.insert("time".to_string(), Value::I64(unix_now()));
        self.raw_insert(InsertQuery::new("autoscope_user_sessions", data))
            .await?;
        Ok(())
    }

    /// True when the user holds a session younger than `max_age` seconds.
    /// Expiry is enforced here; stale rows are simply never matched.
    pub async fn authorize(
        &self,
        username: &str,
        session_id: &str,
        max_age: i64,
    ) -> Result<bool> {
        let selection = nest_ands(vec![
            Formula::eq("username", username),
            Formula::eq("session_id", session_id),
            Formula::Value(ValueSelection::new("time", ">", unix_now() - max_age)),
        ]);
        let mut rows = self
            .raw_select(SelectQuery {
                table: "autoscope_user_sessions".to_string(),
                selection,
            })
            .await?;
        Ok(rows.next())
    }
}
