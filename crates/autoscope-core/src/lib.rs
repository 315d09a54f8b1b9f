pub mod config;
pub use config::{Config, DatabaseType};

pub mod driver;
pub use driver::StorageDriver;

mod error;
pub use error::Error;

pub mod schema;
pub use schema::Schema;

pub mod stats;
pub mod stmt;

/// A Result type alias that uses Autoscope's [`Error`] type.
pub type Result<T, E = Error> = core::result::Result<T, E>;

pub use async_trait::async_trait;
