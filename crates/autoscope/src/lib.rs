//! Adaptive relational storage engine.
//!
//! Accepts schemaless inserts, tracks per-table usage statistics, and
//! evolves the physical schema (creating tables, promoting sidecar fields
//! to columns, adding indices) as usage justifies it. Queries may restrict
//! on `__`-separated relational paths resolved against inferred foreign
//! keys.

mod auth;
pub use auth::CredentialVerifier;

mod controller;

mod engine;
pub use engine::Engine;

mod permissions;
pub use permissions::{ObjectPermissions, Permissions};

mod planner;

mod stats;

mod user;

pub use autoscope_core::{
    driver, schema, stats::TableQueryStats, stmt, Config, DatabaseType, Error, Result,
};
