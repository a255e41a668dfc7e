// Configuration module entry point
// Loads layered configuration (file, environment, defaults) and holds runtime state

mod state;
mod types;

use std::net::SocketAddr;

// Re-export public types
pub use state::AppState;
pub use types::{BackendKind, Config, ControlConfig, DatabaseConfig, ResolverEntry};

/// Default config file, looked up without extension
pub const DEFAULT_CONFIG_PATH: &str = "config";

/// Environment variable prefix, e.g. `GATEWAY_DATABASE__HOST`
const ENV_PREFIX: &str = "GATEWAY";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("invalid address '{addr}': {source}")]
    InvalidAddress {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("invalid endpoint path '{0}': must start with '/'")]
    InvalidEndpoint(String),

    #[error("server.workers must be at least 1")]
    ZeroWorkers,

    #[error("failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),
}

impl Config {
    /// Load configuration from specified file path (extension optional).
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from(config_path: &str) -> Result<Self, ConfigError> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name(config_path).required(false))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.backlog", 128)?
            .set_default("endpoint.path", "/graphql")?
            .set_default("endpoint.max_body_size", 1_048_576)? // 1MB
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .set_default("logging.access_log_format", "combined")?
            .set_default("performance.keep_alive_timeout", 75)?
            .set_default("performance.read_timeout", 30)?
            .set_default("performance.write_timeout", 30)?
            .set_default("performance.shutdown_grace", 5)?
            .set_default("database.backend", "postgres")?
            .set_default("database.host", "localhost")?
            .set_default("database.port", 5432)?
            .set_default("database.user", "postgres")?
            .set_default("database.password", "")?
            .set_default("database.dbname", "codegen_dev")?
            .set_default("database.maintenance_db", "postgres")?
            .set_default("database.connect_timeout", 10)?
            .set_default("database.psql_path", "psql")?
            .set_default("control.start_command", "sudo service postgresql start")?
            .set_default("control.stop_command", "sudo service postgresql stop")?
            .set_default("control.command_timeout", 30)?
            .set_default("control.ready_attempts", 10)?
            .set_default("control.ready_interval_ms", 1000)?
            .set_default("control.bin_dir", "")?
            .set_default("smoke.database", "codegen_backend_test")?
            .set_default("smoke.concurrency", 5)?
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.endpoint.path.starts_with('/') {
            return Err(ConfigError::InvalidEndpoint(self.endpoint.path.clone()));
        }
        if self.server.workers == Some(0) {
            return Err(ConfigError::ZeroWorkers);
        }
        self.get_socket_addr()?;
        Ok(())
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.server.host, self.server.port);
        addr.parse()
            .map_err(|source| ConfigError::InvalidAddress { addr, source })
    }

    /// Copy of the configuration safe to print (password masked)
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.database.password.is_empty() {
            copy.database.password = "********".to_string();
        }
        copy
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(&self.redacted())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_without_file() {
        let cfg = Config::load_from("/nonexistent/query_gateway_config").unwrap();
        assert_eq!(cfg.endpoint.path, "/graphql");
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.database.backend, BackendKind::Postgres);
        assert_eq!(cfg.database.port, 5432);
        assert_eq!(cfg.smoke.concurrency, 5);
        assert!(cfg.resolvers.is_empty());
        assert!(cfg.performance.max_connections.is_none());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let file = write_config(
            r#"
[server]
port = 9090

[database]
backend = "psql"
dbname = "blog"

[[resolvers]]
keyword = "tags"
field = "tags"
query = "SELECT json_agg(t) FROM tags t"
"#,
        );
        let cfg = Config::load_from(file.path().to_str().unwrap()).unwrap();
        assert_eq!(cfg.server.port, 9090);
        assert_eq!(cfg.server.host, "127.0.0.1");
        assert_eq!(cfg.database.backend, BackendKind::Psql);
        assert_eq!(cfg.database.dbname, "blog");
        assert_eq!(cfg.resolvers.len(), 1);
        assert_eq!(cfg.resolvers[0].field, "tags");
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let file = write_config("[endpoint]\npath = \"graphql\"\n");
        let err = Config::load_from(file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEndpoint(_)));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let file = write_config("[server]\nworkers = 0\n");
        let err = Config::load_from(file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroWorkers));

        let file = write_config("[server]\nworkers = 2\n");
        let cfg = Config::load_from(file.path().to_str().unwrap()).unwrap();
        assert_eq!(cfg.server.workers, Some(2));
    }

    #[test]
    fn test_invalid_host_rejected() {
        let file = write_config("[server]\nhost = \"not a host\"\n");
        let err = Config::load_from(file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAddress { .. }));
    }

    #[test]
    fn test_toml_output_masks_password() {
        let file = write_config("[database]\npassword = \"hunter2\"\n");
        let cfg = Config::load_from(file.path().to_str().unwrap()).unwrap();
        let rendered = cfg.to_toml().unwrap();
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("********"));
        assert_eq!(cfg.database.password, "hunter2");
    }
}
