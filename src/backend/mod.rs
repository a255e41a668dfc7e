//! Data backend module
//!
//! A data backend runs one query string against a named store and hands back
//! the decoded JSON result. `Value::Null` stands for "no rows".
//!
//! Two implementations ship:
//! - [`PostgresBackend`]: native driver, one connection per call
//! - [`PsqlBackend`]: the `psql` client as a subprocess

mod error;
pub mod postgres;
pub mod psql;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::config::{BackendKind, DatabaseConfig};

pub use error::BackendError;
pub use postgres::PostgresBackend;
pub use psql::PsqlBackend;

/// Executes backend queries on behalf of the dispatcher
#[async_trait]
pub trait DataBackend: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Run `query` against `store` and return its single JSON result.
    async fn execute(&self, query: &str, store: &str) -> Result<Value, BackendError>;
}

/// Build the backend selected in configuration
pub fn from_config(db: &DatabaseConfig) -> Arc<dyn DataBackend> {
    match db.backend {
        BackendKind::Postgres => Arc::new(PostgresBackend::new(db)),
        BackendKind::Psql => Arc::new(PsqlBackend::new(db)),
    }
}

/// Decode the textual result of a JSON-producing query.
///
/// Empty output and the literal `null` both mean no rows.
pub fn decode_json_output(text: &str) -> Result<Value, BackendError> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(trimmed)?)
}
