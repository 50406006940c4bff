//! Error types for solid-auth

use thiserror::Error;

use crate::auth::AuthError;
use crate::client::TransportError;
use crate::dpop::ProofError;

/// Main error type for solid-auth
#[derive(Error, Debug)]
pub enum SolidAuthError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Proof error: {0}")]
    Proof(#[from] ProofError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    Argument(String),
}

pub type Result<T> = std::result::Result<T, SolidAuthError>;
