// Configuration types module
// Defines all configuration-related data structures

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub endpoint: EndpointConfig,
    pub logging: LoggingConfig,
    pub performance: PerformanceConfig,
    pub database: DatabaseConfig,
    pub control: ControlConfig,
    pub smoke: SmokeConfig,
    /// Keyword table override; the built-in users/posts table is used when empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resolvers: Vec<ResolverEntry>,
}

/// Server configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    /// Listen backlog passed to `listen(2)`
    pub backlog: i32,
}

/// Query endpoint configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EndpointConfig {
    /// The single path that accepts queries (e.g. "/graphql")
    pub path: String,
    pub max_body_size: u64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub access_log: bool,
    /// Access log format (combined, common, json, or custom pattern)
    #[serde(default = "default_access_log_format")]
    pub access_log_format: String,
    /// Access log file path (optional, stdout if not set)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_log_file: Option<String>,
    /// Error log file path (optional, stderr if not set)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_log_file: Option<String>,
}

#[allow(clippy::missing_const_for_fn)]
fn default_access_log_format() -> String {
    "combined".to_string()
}

/// Performance configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PerformanceConfig {
    pub keep_alive_timeout: u64,
    pub read_timeout: u64,
    pub write_timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<u64>,
    /// Seconds in-flight connections get to finish after a shutdown signal
    pub shutdown_grace: u64,
}

/// Which data backend implementation serves queries
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Native driver connection (tokio-postgres)
    Postgres,
    /// `psql` client subprocess
    Psql,
}

/// Database connection configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub backend: BackendKind,
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub password: String,
    /// Target store for the query endpoint
    pub dbname: String,
    /// Database used for administrative checks (readiness, version)
    pub maintenance_db: String,
    /// Connect timeout in seconds
    pub connect_timeout: u64,
    pub psql_path: String,
}

/// Process control configuration (service lifecycle and client tools)
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ControlConfig {
    pub start_command: String,
    pub stop_command: String,
    /// Wall-clock timeout in seconds for each spawned tool
    pub command_timeout: u64,
    pub ready_attempts: u32,
    pub ready_interval_ms: u64,
    /// Directory holding `pg_isready`, `createdb`, `dropdb` (PATH lookup if empty)
    #[serde(default)]
    pub bin_dir: String,
}

/// Smoke test configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SmokeConfig {
    /// Scratch database created and dropped by the smoke run
    pub database: String,
    /// Number of simultaneous backend calls in the concurrency step
    pub concurrency: usize,
}

/// One keyword table entry
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ResolverEntry {
    /// Substring looked for in the query text
    pub keyword: String,
    /// Field name under `data` in the response
    pub field: String,
    /// Backend query executed on match; must return a single JSON column
    pub query: String,
}

impl ResolverEntry {
    pub fn new(keyword: &str, field: &str, query: &str) -> Self {
        Self {
            keyword: keyword.to_string(),
            field: field.to_string(),
            query: query.to_string(),
        }
    }
}
