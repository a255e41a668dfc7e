//! Query dispatcher
//!
//! Turns one HTTP request on the query endpoint into exactly one response.
//! Every failure inside is converted into an envelope; nothing propagates to
//! the transport.

pub mod envelope;
pub mod resolver;

use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use hyper::{HeaderMap, Method, Request, Response, StatusCode};
use std::sync::Arc;

use crate::backend::DataBackend;
use crate::config::Config;
use crate::http;
use crate::logger;

pub use envelope::{OutcomeKind, QueryOutcome, QueryResponse};
pub use resolver::{Resolver, ResolverError};

use envelope::{BODY_TOO_LARGE, INVALID_BODY, QUERY_FAILED, UNKNOWN_QUERY, UNSUPPORTED_METHOD};

pub struct Dispatcher {
    endpoint: String,
    store: String,
    max_body_size: u64,
    resolver: Resolver,
    backend: Arc<dyn DataBackend>,
}

impl Dispatcher {
    pub fn new(
        endpoint: &str,
        store: &str,
        max_body_size: u64,
        resolver: Resolver,
        backend: Arc<dyn DataBackend>,
    ) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            store: store.to_string(),
            max_body_size,
            resolver,
            backend,
        }
    }

    /// Dispatcher for the configured endpoint, target store and keyword table
    pub fn from_config(
        config: &Config,
        backend: Arc<dyn DataBackend>,
    ) -> Result<Self, ResolverError> {
        let resolver = Resolver::from_config(&config.resolvers)?;
        Ok(Self::new(
            &config.endpoint.path,
            &config.database.dbname,
            config.endpoint.max_body_size,
            resolver,
            backend,
        ))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn store(&self) -> &str {
        &self.store
    }

    pub const fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn backend(&self) -> &dyn DataBackend {
        self.backend.as_ref()
    }

    /// Handle one request on the transport
    pub async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        // 1. Single endpoint, any method; a query string is part of the target
        if request_target(req.uri()) != self.endpoint {
            return with_outcome(
                http::build_404_response(),
                QueryOutcome::new(OutcomeKind::NotFound),
            );
        }

        // 2. Method
        match *req.method() {
            Method::POST => {}
            Method::OPTIONS => {
                return with_outcome(
                    http::build_preflight_response(),
                    QueryOutcome::new(OutcomeKind::Preflight),
                );
            }
            ref other => {
                logger::log_warning(&format!("Method not allowed on query endpoint: {other}"));
                return with_outcome(
                    http::build_unsupported_method_response(&QueryResponse::error(
                        UNSUPPORTED_METHOD,
                    )),
                    QueryOutcome::new(OutcomeKind::UnsupportedMethod),
                );
            }
        }

        // 3. Body
        if exceeds_declared_length(req.headers(), self.max_body_size) {
            return too_large();
        }
        let body = match read_body(req.into_body(), self.max_body_size).await {
            Ok(body) => body,
            Err(BodyError::TooLarge) => return too_large(),
            Err(BodyError::Read(e)) => {
                logger::log_warning(&format!("Failed to read request body: {e}"));
                return invalid_request();
            }
        };

        let query = match envelope::parse_query(&body) {
            Ok(query) => query,
            Err(e) => {
                logger::log_debug(&format!("Rejected request payload: {e}"));
                return invalid_request();
            }
        };

        // 4. Resolve and execute
        let (response, outcome) = self.execute_query(&query).await;
        with_outcome(http::build_json_response(StatusCode::OK, &response), outcome)
    }

    /// Resolve `query` against the keyword table and run the matching backend
    /// query. Soft errors come back as `errors` envelopes.
    pub async fn execute_query(&self, query: &str) -> (QueryResponse, QueryOutcome) {
        let Some(entry) = self.resolver.resolve(query) else {
            return (
                QueryResponse::error(UNKNOWN_QUERY),
                QueryOutcome::new(OutcomeKind::UnknownQuery),
            );
        };

        match self.backend.execute(&entry.query, &self.store).await {
            Ok(records) => (
                QueryResponse::data(&entry.field, records),
                QueryOutcome::for_field(&entry.field, OutcomeKind::Data),
            ),
            Err(e) => {
                logger::log_backend_error(
                    self.backend.name(),
                    &format!("'{}' query failed: {e}", entry.field),
                );
                (
                    QueryResponse::error(QUERY_FAILED),
                    QueryOutcome::for_field(&entry.field, OutcomeKind::BackendFailure),
                )
            }
        }
    }
}

/// Path plus query string, as sent on the request line
pub fn request_target(uri: &hyper::Uri) -> &str {
    uri.path_and_query()
        .map_or_else(|| uri.path(), hyper::http::uri::PathAndQuery::as_str)
}

enum BodyError {
    TooLarge,
    Read(Box<dyn std::error::Error + Send + Sync>),
}

/// Check Content-Length against the limit before reading anything
fn exceeds_declared_length(headers: &HeaderMap, max_body_size: u64) -> bool {
    let Some(value) = headers.get(hyper::header::CONTENT_LENGTH) else {
        return false;
    };
    match value.to_str().ok().and_then(|v| v.parse::<u64>().ok()) {
        Some(size) if size > max_body_size => {
            logger::log_warning(&format!(
                "Request body too large: {size} bytes (max: {max_body_size})"
            ));
            true
        }
        Some(_) => false,
        None => {
            logger::log_warning("Invalid Content-Length value, skipping size check");
            false
        }
    }
}

async fn read_body<B>(body: B, max_body_size: u64) -> Result<Bytes, BodyError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let limit = usize::try_from(max_body_size).unwrap_or(usize::MAX);
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => Err(BodyError::TooLarge),
        Err(e) => Err(BodyError::Read(e)),
    }
}

fn invalid_request() -> Response<Full<Bytes>> {
    with_outcome(
        http::build_json_response(StatusCode::BAD_REQUEST, &QueryResponse::error(INVALID_BODY)),
        QueryOutcome::new(OutcomeKind::InvalidRequest),
    )
}

fn too_large() -> Response<Full<Bytes>> {
    with_outcome(
        http::build_413_response(&QueryResponse::error(BODY_TOO_LARGE)),
        QueryOutcome::new(OutcomeKind::BodyTooLarge),
    )
}

fn with_outcome(
    mut response: Response<Full<Bytes>>,
    outcome: QueryOutcome,
) -> Response<Full<Bytes>> {
    response.extensions_mut().insert(outcome);
    response
}
