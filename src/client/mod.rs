//! HTTP client functionality
//!
//! [`HttpService`] is the transport seam: it sends one request and returns
//! one response, nothing more. [`ReqwestService`] is the production
//! implementation and [`AuthorizationClient`] wraps any transport with
//! challenge/response negotiation.

pub mod http;
pub mod reactive;

pub use self::http::{ReqwestService, USER_AGENT_STRING};
pub use reactive::AuthorizationClient;

use async_trait::async_trait;
use thiserror::Error;

use crate::message::{Request, Response};

/// Failures of the underlying transport. These are terminal: the reactive
/// client never negotiates or retries after one.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {uri} timed out")]
    Timeout { uri: String },

    #[error("connection to {uri} failed: {message}")]
    Connect { uri: String, message: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("request failed: {0}")]
    Request(String),
}

#[async_trait]
pub trait HttpService: Send + Sync {
    async fn send(&self, request: Request) -> Result<Response, TransportError>;
}
