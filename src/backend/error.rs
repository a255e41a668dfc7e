// Backend error types

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("failed to connect to store '{store}': {source}")]
    Connect {
        store: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("query failed: {0}")]
    Query(#[from] tokio_postgres::Error),

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("backend exited with status {status}: {stderr}")]
    Failed { status: i32, stderr: String },

    #[error("backend output is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
}
