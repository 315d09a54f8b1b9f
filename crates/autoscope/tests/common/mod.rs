#![allow(dead_code)]

use autoscope::{stmt::Value, Config, CredentialVerifier, DatabaseType, Engine};
use indexmap::IndexMap;

/// Test-only verifier: "hashes" by tagging the password.
pub struct PlainVerifier;

impl CredentialVerifier for PlainVerifier {
    fn hash(&self, password: &str) -> String {
        format!("plain:{password}")
    }

    fn verify(&self, password: &str, passhash: &str) -> bool {
        passhash == format!("plain:{password}")
    }
}

pub fn mem_config() -> Config {
    Config {
        database_type: DatabaseType::Mem,
        ..Default::default()
    }
}

pub async fn mem_engine() -> Engine {
    Engine::init(mem_config()).await.expect("engine init")
}

pub fn data(pairs: &[(&str, Value)]) -> IndexMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}
