// Serves a dispatcher on an ephemeral loopback port and queries it over TCP

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::client::conn::http1;
use hyper::{header, Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::LocalSet;

use crate::config::{AppState, Config};
use crate::dispatch::Dispatcher;
use crate::server::{create_reusable_listener, run_server_loop};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("cannot bind loopback listener: {0}")]
    Bind(#[source] std::io::Error),

    #[error("cannot connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot build request: {0}")]
    Request(#[from] hyper::http::Error),

    #[error("HTTP exchange failed: {0}")]
    Http(#[from] hyper::Error),

    #[error("response body is not JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no response within {}s", .0.as_secs())]
    Timeout(Duration),
}

/// Status and decoded body of one POST
#[derive(Debug)]
pub struct EndpointReply {
    pub status: StatusCode,
    pub body: Value,
}

/// Run the accept loop for `dispatcher` on `127.0.0.1:0`, POST each query to
/// its endpoint, then fire the shutdown signal and wait for the loop to exit.
pub async fn serve_and_query(
    config: &Config,
    dispatcher: Dispatcher,
    queries: &[&str],
) -> Result<(SocketAddr, Vec<EndpointReply>), EndpointError> {
    let listener = create_reusable_listener(
        SocketAddr::from(([127, 0, 0, 1], 0)),
        config.server.backlog,
    )
    .map_err(EndpointError::Bind)?;
    let addr = listener.local_addr().map_err(EndpointError::Bind)?;
    let path = dispatcher.endpoint().to_string();

    let mut config = config.clone();
    config.logging.access_log = false;
    let state = Arc::new(AppState::new(config, dispatcher));
    let shutdown = Arc::clone(&state.shutdown_signal);

    let local = LocalSet::new();
    local
        .run_until(async move {
            let server = tokio::task::spawn_local(run_server_loop(
                listener,
                state,
                Arc::new(AtomicUsize::new(0)),
            ));

            let mut replies = Vec::with_capacity(queries.len());
            let mut failure = None;
            for query in queries {
                match post_query(addr, &path, query).await {
                    Ok(reply) => replies.push(reply),
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }

            shutdown.notify_one();
            let _ = server.await;

            match failure {
                Some(e) => Err(e),
                None => Ok((addr, replies)),
            }
        })
        .await
}

async fn post_query(
    addr: SocketAddr,
    path: &str,
    query: &str,
) -> Result<EndpointReply, EndpointError> {
    tokio::time::timeout(REQUEST_TIMEOUT, exchange(addr, path, query))
        .await
        .map_err(|_| EndpointError::Timeout(REQUEST_TIMEOUT))?
}

/// One request on its own connection; the connection is closed before returning
async fn exchange(
    addr: SocketAddr,
    path: &str,
    query: &str,
) -> Result<EndpointReply, EndpointError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|source| EndpointError::Connect { addr, source })?;
    let (mut sender, connection) = http1::handshake(TokioIo::new(stream)).await?;
    let driver = tokio::task::spawn_local(connection);

    let body = serde_json::json!({ "query": query }).to_string();
    let request = Request::builder()
        .method(Method::POST)
        .uri(path)
        .header(header::HOST, addr.to_string())
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))?;

    let response = sender.send_request(request).await?;
    let status = response.status();
    let bytes = response.into_body().collect().await?.to_bytes();

    drop(sender);
    let _ = driver.await;

    Ok(EndpointReply {
        status,
        body: serde_json::from_slice(&bytes)?,
    })
}
