//! Challenge-driven authentication
//!
//! Provides:
//! - [`Credential`] values and the [`Authenticator`] / [`AuthenticationProvider`] traits
//! - [`ReactiveAuthorization`], the scheme registry that turns challenges
//!   into a negotiated credential
//! - OpenID ID-token presentation (`Bearer`, `DPoP`)
//! - UMA ticket exchange (`UMA`)

pub mod credential;
pub mod openid;
pub mod registry;
pub mod uma;

pub use credential::{Credential, BEARER, DPOP};
pub use openid::OpenIdProvider;
pub use registry::{ReactiveAuthorization, ReactiveAuthorizationBuilder};
pub use uma::{UmaClient, UmaError, UmaProvider};

use std::collections::BTreeSet;

use async_trait::async_trait;
use thiserror::Error;

use crate::client::TransportError;
use crate::dpop::ProofError;
use crate::headers::Challenge;
use crate::message::Request;
use crate::session::Session;

/// Authentication error types
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("negotiation failed: {0}")]
    Negotiation(String),

    #[error("invalid authentication challenge: {0}")]
    InvalidChallenge(String),

    /// The long-lived credential is malformed, expired, or fails verification.
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    #[error("credential refresh failed: {0}")]
    Refresh(String),

    #[error("UMA error: {0}")]
    Uma(#[from] UmaError),

    #[error("proof error: {0}")]
    Proof(#[from] ProofError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// One way of answering a challenge. Built per challenge by its provider
/// and discarded after use.
#[async_trait]
pub trait Authenticator: Send + Sync {
    fn name(&self) -> &str;

    /// Higher wins when several challenges can be answered.
    fn priority(&self) -> i32;

    /// Obtain a credential for `request`. `algorithms` holds the proof
    /// algorithms the server advertised alongside its challenges.
    async fn authenticate(
        &self,
        session: &dyn Session,
        request: &Request,
        algorithms: &BTreeSet<String>,
    ) -> Result<Credential, AuthError>;
}

/// Factory of [`Authenticator`]s for a family of schemes. Registered once
/// with the [`ReactiveAuthorization`] registry.
pub trait AuthenticationProvider: Send + Sync {
    fn schemes(&self) -> BTreeSet<String>;

    /// Fails when the challenge lacks what this provider needs.
    fn authenticator(&self, challenge: &Challenge) -> Result<Box<dyn Authenticator>, AuthError>;
}
