// Native PostgreSQL backend
// Opens one driver connection per call, no pooling

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio_postgres::{Client, NoTls, Row};

use super::{decode_json_output, BackendError, DataBackend};
use crate::config::DatabaseConfig;
use crate::logger;

pub struct PostgresBackend {
    base: tokio_postgres::Config,
}

impl PostgresBackend {
    pub fn new(db: &DatabaseConfig) -> Self {
        let mut base = tokio_postgres::Config::new();
        base.host(&db.host)
            .port(db.port)
            .user(&db.user)
            .application_name(env!("CARGO_PKG_NAME"))
            .connect_timeout(Duration::from_secs(db.connect_timeout));
        if !db.password.is_empty() {
            base.password(&db.password);
        }
        Self { base }
    }

    fn config_for(&self, store: &str) -> tokio_postgres::Config {
        let mut config = self.base.clone();
        config.dbname(store);
        config
    }
}

#[async_trait]
impl DataBackend for PostgresBackend {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn execute(&self, query: &str, store: &str) -> Result<Value, BackendError> {
        let (client, connection) = self
            .config_for(store)
            .connect(NoTls)
            .await
            .map_err(|source| BackendError::Connect {
                store: store.to_string(),
                source,
            })?;

        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                logger::log_backend_error("postgres", &format!("connection error: {e}"));
            }
        });

        let result = fetch_json(&client, query).await;

        // Dropping the client ends the connection task
        drop(client);
        let _ = driver.await;

        result
    }
}

async fn fetch_json(client: &Client, query: &str) -> Result<Value, BackendError> {
    let Some(row) = client.query_opt(query, &[]).await? else {
        return Ok(Value::Null);
    };
    first_column_as_json(&row)
}

/// Read column 0 as `json`/`jsonb`, falling back to text holding JSON
fn first_column_as_json(row: &Row) -> Result<Value, BackendError> {
    if row.is_empty() {
        return Ok(Value::Null);
    }
    match row.try_get::<_, Option<Value>>(0) {
        Ok(value) => Ok(value.unwrap_or(Value::Null)),
        Err(_) => {
            let text: Option<String> = row.try_get(0)?;
            text.map_or(Ok(Value::Null), |t| decode_json_output(&t))
        }
    }
}
