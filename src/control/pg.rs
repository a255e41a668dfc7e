// PostgreSQL client tool wrapper
// pg_isready, createdb, dropdb and psql invoked as plain argv

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{
    parse_database_list, validate_database_name, CommandSpec, ControlError, ProcessControl,
};
use crate::config::{ControlConfig, DatabaseConfig};
use crate::logger;

/// Process control backed by the PostgreSQL client binaries
#[derive(Debug, Clone)]
pub struct PgTools {
    /// Directory holding the client binaries; empty means `PATH`
    bin_dir: PathBuf,
    psql: String,
    host: String,
    port: u16,
    user: String,
    password: String,
    start_command: String,
    stop_command: String,
    timeout: Duration,
}

impl PgTools {
    pub fn from_config(database: &DatabaseConfig, control: &ControlConfig) -> Self {
        Self {
            bin_dir: PathBuf::from(&control.bin_dir),
            psql: database.psql_path.clone(),
            host: database.host.clone(),
            port: database.port,
            user: database.user.clone(),
            password: database.password.clone(),
            start_command: control.start_command.clone(),
            stop_command: control.stop_command.clone(),
            timeout: Duration::from_secs(control.command_timeout),
        }
    }

    /// Resolve a client binary against `bin_dir`
    fn tool(&self, name: &str) -> String {
        if self.bin_dir.as_os_str().is_empty() {
            name.to_string()
        } else {
            self.bin_dir.join(name).to_string_lossy().into_owned()
        }
    }

    /// `psql` honours `database.psql_path` unless `bin_dir` is set
    fn psql(&self) -> CommandSpec {
        let program = if self.bin_dir.as_os_str().is_empty() {
            self.psql.clone()
        } else {
            self.tool("psql")
        };
        self.connect(CommandSpec::new(program))
    }

    /// Append connection flags and the password environment
    fn connect(&self, spec: CommandSpec) -> CommandSpec {
        let spec = spec.args([
            "-h".to_string(),
            self.host.clone(),
            "-p".to_string(),
            self.port.to_string(),
            "-U".to_string(),
            self.user.clone(),
        ]);
        if self.password.is_empty() {
            spec
        } else {
            spec.env("PGPASSWORD", &self.password)
        }
    }

    async fn run_service_command(&self, command_line: &str) -> Result<(), ControlError> {
        let spec = CommandSpec::parse(command_line)?;
        logger::log_debug(&format!("[CONTROL] {}", spec.display()));
        spec.run_checked(self.timeout).await?;
        Ok(())
    }
}

#[async_trait]
impl ProcessControl for PgTools {
    async fn is_ready(&self) -> Result<bool, ControlError> {
        let spec = CommandSpec::new(self.tool("pg_isready")).args([
            "-h".to_string(),
            self.host.clone(),
            "-p".to_string(),
            self.port.to_string(),
        ]);
        let output = spec.run(self.timeout).await?;
        if !output.success() {
            logger::log_debug(&format!(
                "[CONTROL] pg_isready exited with {:?}: {}",
                output.status,
                output.stdout.trim()
            ));
        }
        Ok(output.success())
    }

    async fn start_service(&self) -> Result<(), ControlError> {
        self.run_service_command(&self.start_command).await
    }

    async fn stop_service(&self) -> Result<(), ControlError> {
        self.run_service_command(&self.stop_command).await
    }

    async fn create_database(&self, name: &str) -> Result<(), ControlError> {
        validate_database_name(name)?;
        self.connect(CommandSpec::new(self.tool("createdb")))
            .arg(name)
            .run_checked(self.timeout)
            .await?;
        Ok(())
    }

    async fn drop_database(&self, name: &str) -> Result<(), ControlError> {
        validate_database_name(name)?;
        self.connect(CommandSpec::new(self.tool("dropdb")))
            .arg("--if-exists")
            .arg(name)
            .run_checked(self.timeout)
            .await?;
        Ok(())
    }

    async fn run_file(&self, database: &str, path: &Path) -> Result<(), ControlError> {
        validate_database_name(database)?;
        self.psql()
            .args(["-d", database, "-X", "-q", "-v", "ON_ERROR_STOP=1", "-f"])
            .arg(path.to_string_lossy())
            .run_checked(self.timeout)
            .await?;
        Ok(())
    }

    async fn run_statement(&self, database: &str, sql: &str) -> Result<String, ControlError> {
        validate_database_name(database)?;
        let output = self
            .psql()
            .args(["-d", database, "-X", "-t", "-A", "-c", sql])
            .run_checked(self.timeout)
            .await?;
        Ok(output.stdout.trim().to_string())
    }

    async fn list_databases(&self) -> Result<Vec<String>, ControlError> {
        let output = self
            .psql()
            .args(["-X", "-l", "-t", "-A"])
            .run_checked(self.timeout)
            .await?;
        Ok(parse_database_list(&output.stdout))
    }
}
