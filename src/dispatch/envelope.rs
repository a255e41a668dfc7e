// Request and response envelopes for the query endpoint

use serde::Serialize;
use serde_json::{Map, Value};

pub const UNKNOWN_QUERY: &str = "Unknown query";
pub const QUERY_FAILED: &str = "Database query failed";
pub const INVALID_BODY: &str = "Invalid request body";
pub const UNSUPPORTED_METHOD: &str = "Unsupported method";
pub const BODY_TOO_LARGE: &str = "Request body too large";

/// Response body: either a `data` object keyed by field, or an `errors` list
#[derive(Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum QueryResponse {
    Data { data: Map<String, Value> },
    Errors { errors: Vec<ErrorMessage> },
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ErrorMessage {
    pub message: String,
}

impl QueryResponse {
    /// `{"data": {field: records}}`, with a null result becoming `[]`
    pub fn data(field: &str, records: Value) -> Self {
        let records = if records.is_null() {
            Value::Array(Vec::new())
        } else {
            records
        };
        let mut data = Map::new();
        data.insert(field.to_string(), records);
        Self::Data { data }
    }

    /// `{"errors": [{"message": message}]}`
    pub fn error(message: &str) -> Self {
        Self::Errors {
            errors: vec![ErrorMessage {
                message: message.to_string(),
            }],
        }
    }

    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Errors { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("body is not a JSON object")]
    NotAnObject,

    #[error("`query` field is not a string")]
    QueryNotText,
}

/// Extract the `query` text from a request body.
///
/// A missing `query` field is the empty string.
pub fn parse_query(body: &[u8]) -> Result<String, RequestError> {
    let Value::Object(mut payload) = serde_json::from_slice::<Value>(body)? else {
        return Err(RequestError::NotAnObject);
    };
    match payload.remove("query") {
        None => Ok(String::new()),
        Some(Value::String(query)) => Ok(query),
        Some(_) => Err(RequestError::QueryNotText),
    }
}

/// What the dispatcher did with a request; attached to the response as an
/// extension for access logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOutcome {
    /// Resolved field, when a keyword matched
    pub operation: Option<String>,
    pub kind: OutcomeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Data,
    UnknownQuery,
    BackendFailure,
    InvalidRequest,
    BodyTooLarge,
    Preflight,
    UnsupportedMethod,
    NotFound,
}

impl OutcomeKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::UnknownQuery => "unknown_query",
            Self::BackendFailure => "backend_failure",
            Self::InvalidRequest => "invalid_request",
            Self::BodyTooLarge => "body_too_large",
            Self::Preflight => "preflight",
            Self::UnsupportedMethod => "unsupported_method",
            Self::NotFound => "not_found",
        }
    }
}

impl QueryOutcome {
    pub const fn new(kind: OutcomeKind) -> Self {
        Self {
            operation: None,
            kind,
        }
    }

    pub fn for_field(field: &str, kind: OutcomeKind) -> Self {
        Self {
            operation: Some(field.to_string()),
            kind,
        }
    }
}
