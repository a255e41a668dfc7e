//! HTTP protocol layer module
//!
//! Response builders shared by the query endpoint, decoupled from dispatch logic.

pub mod response;

// Re-export commonly used types
pub use response::{
    build_404_response, build_413_response, build_json_response, build_preflight_response,
    build_unsupported_method_response,
};
