// Server loop module
// Accepts connections until a shutdown signal arrives, then drains

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use super::connection::accept_connection;
use super::shutdown::drain_connections;
use crate::config::AppState;
use crate::logger;

/// Accept loop for the query endpoint.
///
/// Runs until `state.shutdown_signal` fires, then closes the listener and
/// gives in-flight connections `performance.shutdown_grace` seconds.
/// Must run inside a `LocalSet`.
#[allow(clippy::ignored_unit_patterns)]
pub async fn run_server_loop(
    listener: TcpListener,
    state: Arc<AppState>,
    active_connections: Arc<AtomicUsize>,
) -> std::io::Result<()> {
    let local_addr = listener.local_addr()?;

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        accept_connection(stream, peer_addr, &state, &active_connections);
                    }
                    Err(e) => {
                        logger::log_error(&format!("Failed to accept connection on {local_addr}: {e}"));
                    }
                }
            }

            _ = state.shutdown_signal.notified() => {
                logger::log_shutdown_requested(active_connections.load(Ordering::SeqCst));
                break;
            }
        }
    }

    drop(listener);

    let grace = Duration::from_secs(state.config.performance.shutdown_grace);
    let remaining = drain_connections(&active_connections, grace).await;
    logger::log_shutdown_complete(remaining);
    Ok(())
}
