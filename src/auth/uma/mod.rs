//! User-Managed Access ticket exchange
//!
//! A `UMA` challenge names an authorization server (`as_uri`) and a
//! permission `ticket`. The [`UmaAuthenticator`] discovers the server's
//! token endpoint, trades the ticket (plus the session's ID token as a
//! claim token) for an access token, and gathers further claims when the
//! server answers `need_info`.

pub mod claims;
pub mod client;
pub mod provider;

pub use claims::{ClaimGatheringHandler, ClaimToken, NeedInfo, NeedInfoHandler, RequiredClaims};
pub use client::{Metadata, TokenRequest, TokenResponse, UmaClient, UMA_TICKET_GRANT};
pub use provider::{UmaAuthenticator, UmaProvider, UMA_PRIORITY};

use thiserror::Error;

use crate::client::TransportError;
use crate::dpop::ProofError;

#[derive(Debug, Error)]
pub enum UmaError {
    #[error("UMA discovery failed for {as_uri}: {message}")]
    Metadata { as_uri: String, message: String },

    #[error("unexpected response during token negotiation: HTTP {status}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("request denied: {0}")]
    RequestDenied(String),

    #[error("invalid grant: {0}")]
    InvalidGrant(String),

    #[error("invalid scope: {0}")]
    InvalidScope(String),

    #[error("invalid need_info response: {0}")]
    NeedInfo(String),

    #[error("claim gathering exceeded the configured maximum of {0} iterations")]
    MaxIterations(usize),

    #[error("invalid UMA challenge: {0}")]
    InvalidChallenge(String),

    #[error("failed to encode token request: {0}")]
    Form(#[from] serde_urlencoded::ser::Error),

    #[error("invalid JSON from authorization server: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Proof(#[from] ProofError),
}
