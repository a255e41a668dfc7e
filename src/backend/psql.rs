// psql subprocess backend
// Runs the query through the `psql` client in tuples-only, unaligned mode

use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use tokio::process::Command;

use super::{decode_json_output, BackendError, DataBackend};
use crate::config::DatabaseConfig;

pub struct PsqlBackend {
    program: String,
    host: String,
    port: u16,
    user: String,
    password: String,
}

impl PsqlBackend {
    pub fn new(db: &DatabaseConfig) -> Self {
        Self {
            program: db.psql_path.clone(),
            host: db.host.clone(),
            port: db.port,
            user: db.user.clone(),
            password: db.password.clone(),
        }
    }

    fn command(&self, query: &str, store: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(store)
            .args(["-X", "-t", "-A"])
            .arg("-h")
            .arg(&self.host)
            .arg("-p")
            .arg(self.port.to_string())
            .arg("-U")
            .arg(&self.user)
            .arg("-c")
            .arg(query)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if !self.password.is_empty() {
            cmd.env("PGPASSWORD", &self.password);
        }
        cmd
    }
}

#[async_trait]
impl DataBackend for PsqlBackend {
    fn name(&self) -> &'static str {
        "psql"
    }

    async fn execute(&self, query: &str, store: &str) -> Result<Value, BackendError> {
        let output = self
            .command(query, store)
            .output()
            .await
            .map_err(|source| BackendError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(BackendError::Failed {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        decode_json_output(&String::from_utf8_lossy(&output.stdout))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::Config;
    use serde_json::json;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;

    /// Write an executable shell script standing in for `psql`
    fn fake_psql(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("psql");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn backend_with(program: &str) -> PsqlBackend {
        let mut db = Config::load_from("/nonexistent/query_gateway_config")
            .unwrap()
            .database;
        db.psql_path = program.to_string();
        PsqlBackend::new(&db)
    }

    #[tokio::test]
    async fn test_json_output_decoded() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_psql(&dir, r#"echo ' [{"id":1,"name":"Test User"}]'"#);
        let backend = backend_with(program.to_str().unwrap());
        let value = backend.execute("SELECT 1", "codegen_test").await.unwrap();
        assert_eq!(value, json!([{"id": 1, "name": "Test User"}]));
    }

    #[tokio::test]
    async fn test_store_passed_as_first_argument() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_psql(&dir, r#"printf '["%s"]' "$1""#);
        let backend = backend_with(program.to_str().unwrap());
        let value = backend.execute("SELECT 1", "codegen_test").await.unwrap();
        assert_eq!(value, json!(["codegen_test"]));
    }

    #[tokio::test]
    async fn test_empty_output_is_null() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_psql(&dir, "echo ''");
        let backend = backend_with(program.to_str().unwrap());
        assert_eq!(backend.execute("SELECT 1", "db").await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_psql(
            &dir,
            "echo 'psql: error: database \"db\" does not exist' >&2\nexit 2",
        );
        let backend = backend_with(program.to_str().unwrap());
        match backend.execute("SELECT 1", "db").await.unwrap_err() {
            BackendError::Failed { status, stderr } => {
                assert_eq!(status, 2);
                assert!(stderr.contains("does not exist"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_table_output_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_psql(&dir, "echo ' id | name'");
        let backend = backend_with(program.to_str().unwrap());
        let err = backend.execute("SELECT 1", "db").await.unwrap_err();
        assert!(matches!(err, BackendError::Decode(_)));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let backend = backend_with("/nonexistent/bin/psql");
        let err = backend.execute("SELECT 1", "db").await.unwrap_err();
        assert!(matches!(err, BackendError::Spawn { .. }));
    }
}
