//! Process control
//!
//! Service lifecycle and database administration through the PostgreSQL
//! client tools. Every tool runs without a shell and under a timeout.

mod command;
mod pg;

pub use command::CommandSpec;
pub use pg::PgTools;

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

/// Longest identifier PostgreSQL keeps without truncation
const MAX_NAME_LEN: usize = 63;

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("invalid database name '{0}'")]
    InvalidName(String),

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' timed out after {seconds}s")]
    Timeout { command: String, seconds: u64 },

    #[error("'{command}' exited with {}: {stderr}", .status.map_or_else(|| "signal".to_string(), |c| c.to_string()))]
    Failed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("empty service command")]
    EmptyCommand,
}

/// Operations on the database service and its databases
#[async_trait]
pub trait ProcessControl: Send + Sync {
    /// Whether the service accepts connections
    async fn is_ready(&self) -> Result<bool, ControlError>;

    async fn start_service(&self) -> Result<(), ControlError>;

    async fn stop_service(&self) -> Result<(), ControlError>;

    async fn create_database(&self, name: &str) -> Result<(), ControlError>;

    /// Drop a database; a missing database is not an error
    async fn drop_database(&self, name: &str) -> Result<(), ControlError>;

    /// Apply a SQL batch file, stopping at the first error
    async fn run_file(&self, database: &str, path: &Path) -> Result<(), ControlError>;

    /// Run one statement and return its unaligned, tuples-only output
    async fn run_statement(&self, database: &str, sql: &str) -> Result<String, ControlError>;

    /// User databases, templates excluded
    async fn list_databases(&self) -> Result<Vec<String>, ControlError>;

    /// Poll `is_ready` up to `attempts` times, sleeping `interval` in between
    async fn wait_until_ready(
        &self,
        attempts: u32,
        interval: Duration,
    ) -> Result<bool, ControlError> {
        for attempt in 1..=attempts {
            if self.is_ready().await? {
                return Ok(true);
            }
            if attempt < attempts {
                tokio::time::sleep(interval).await;
            }
        }
        Ok(false)
    }
}

/// Database names are passed as argv, never interpolated into SQL, but are
/// still restricted to plain identifiers.
pub fn validate_database_name(name: &str) -> Result<(), ControlError> {
    let valid = match name.as_bytes().first() {
        None => false,
        Some(first) => {
            !first.is_ascii_digit()
                && name.len() <= MAX_NAME_LEN
                && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
        }
    };
    if valid {
        Ok(())
    } else {
        Err(ControlError::InvalidName(name.to_string()))
    }
}

/// Names from `psql -l -t -A` output: first `|` column of each row.
/// Continuation lines of multi-line privilege cells carry no `|`.
pub fn parse_database_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| line.contains('|'))
        .filter_map(|line| line.split('|').next())
        .map(str::trim)
        .filter(|name| !name.is_empty() && *name != "template0" && *name != "template1")
        .map(ToString::to_string)
        .collect()
}
