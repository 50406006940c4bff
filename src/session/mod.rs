//! Client-side authentication state
//!
//! A [`Session`] owns the identity the client acts as: an optional
//! long-lived credential (an OpenID ID token), a cache of credentials
//! negotiated per resource, and the keys used for DPoP proofs.
//!
//! - [`AnonymousSession`] - no identity; only ticket-based (UMA) negotiation
//! - [`OpenIdSession`] - identity from a verified ID token

pub mod cache;
pub mod openid;
pub mod verification;

pub use cache::{CredentialCache, CredentialSlot};
pub use openid::{OpenIdSession, OpenIdSessionBuilder, TokenRefresher};
pub use verification::OpenIdVerificationConfig;

use std::collections::BTreeSet;

use async_trait::async_trait;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::auth::{AuthError, Authenticator, Credential};
use crate::config::CacheConfig;
use crate::dpop::ProofError;
use crate::message::Request;

/// Name of the long-lived OpenID Connect ID-token credential.
pub const ID_TOKEN: &str = "http://openid.net/specs/openid-connect-core-1_0.html#IDToken";

/// Scheme of ticket-based negotiation; every session may answer it.
pub const UMA: &str = "UMA";

#[async_trait]
pub trait Session: Send + Sync {
    fn id(&self) -> &str;

    fn principal(&self) -> Option<Url>;

    /// Authentication schemes this session can answer.
    fn supported_schemes(&self) -> BTreeSet<String>;

    /// The long-lived credential called `name`, refreshed if expired.
    /// At most one refresh runs at a time per session.
    async fn credential(&self, name: &str, uri: &Url) -> Result<Option<Credential>, AuthError>;

    /// An unexpired negotiated credential for the request URI.
    fn from_cache(&self, request: &Request) -> Option<Credential>;

    /// Thumbprint of the first proof key whose algorithm is in `algorithms`.
    fn select_thumbprint(&self, algorithms: &BTreeSet<String>) -> Option<String>;

    /// A proof for `request` signed by the key with `thumbprint`, or `None`
    /// when this session holds no such key.
    fn generate_proof(&self, thumbprint: &str, request: &Request) -> Result<Option<String>, ProofError>;

    /// Run `authenticator` and cache its credential under the request URI.
    async fn authenticate(
        &self,
        authenticator: &dyn Authenticator,
        request: &Request,
        algorithms: &BTreeSet<String>,
    ) -> Result<Option<Credential>, AuthError>;

    /// Forget every credential.
    fn reset(&self);

    fn supports_scheme(&self, scheme: &str) -> bool {
        scheme.eq_ignore_ascii_case(UMA)
            || self
                .supported_schemes()
                .iter()
                .any(|s| s.eq_ignore_ascii_case(scheme))
    }
}

/// Shared body of [`Session::authenticate`].
pub(crate) async fn authenticate_and_cache(
    session: &dyn Session,
    cache: &CredentialCache,
    authenticator: &dyn Authenticator,
    request: &Request,
    algorithms: &BTreeSet<String>,
) -> Result<Option<Credential>, AuthError> {
    debug!(
        session = %session.id(),
        authenticator = %authenticator.name(),
        uri = %request.uri(),
        "Authenticating"
    );
    let credential = authenticator.authenticate(session, request, algorithms).await?;
    cache.put(request.uri(), credential.clone());
    Ok(Some(credential))
}

/// A session without identity. It can still negotiate UMA tickets, and
/// caches what it negotiates.
pub struct AnonymousSession {
    id: String,
    cache: CredentialCache,
}

impl AnonymousSession {
    pub fn new() -> Self {
        Self::with_cache(&CacheConfig::default())
    }

    pub fn with_cache(config: &CacheConfig) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            cache: config.credential_cache(),
        }
    }
}

impl Default for AnonymousSession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Session for AnonymousSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn principal(&self) -> Option<Url> {
        None
    }

    fn supported_schemes(&self) -> BTreeSet<String> {
        BTreeSet::from([UMA.to_string()])
    }

    async fn credential(&self, _name: &str, _uri: &Url) -> Result<Option<Credential>, AuthError> {
        Ok(None)
    }

    fn from_cache(&self, request: &Request) -> Option<Credential> {
        self.cache.get(request.uri())
    }

    fn select_thumbprint(&self, _algorithms: &BTreeSet<String>) -> Option<String> {
        None
    }

    fn generate_proof(&self, _thumbprint: &str, _request: &Request) -> Result<Option<String>, ProofError> {
        Ok(None)
    }

    async fn authenticate(
        &self,
        authenticator: &dyn Authenticator,
        request: &Request,
        algorithms: &BTreeSet<String>,
    ) -> Result<Option<Credential>, AuthError> {
        authenticate_and_cache(self, &self.cache, authenticator, request, algorithms).await
    }

    fn reset(&self) {
        self.cache.clear();
    }
}
