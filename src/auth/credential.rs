//! Negotiated and long-lived credentials

use std::fmt;

use chrono::{DateTime, Utc};
use url::Url;

pub const BEARER: &str = "Bearer";
pub const DPOP: &str = "DPoP";

/// A token together with everything needed to present it.
///
/// Immutable once built. A credential is expired as soon as its expiration
/// is not strictly in the future; there is no grace period at this layer.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    scheme: String,
    issuer: Url,
    token: String,
    expiration: DateTime<Utc>,
    principal: Option<Url>,
    proof_thumbprint: Option<String>,
}

impl Credential {
    pub fn new(
        scheme: impl Into<String>,
        issuer: Url,
        token: impl Into<String>,
        expiration: DateTime<Utc>,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            issuer,
            token: token.into(),
            expiration,
            principal: None,
            proof_thumbprint: None,
        }
    }

    pub fn with_principal(mut self, principal: Option<Url>) -> Self {
        self.principal = principal;
        self
    }

    pub fn with_proof_thumbprint(mut self, thumbprint: Option<String>) -> Self {
        self.proof_thumbprint = thumbprint;
        self
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn issuer(&self) -> &Url {
        &self.issuer
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expiration(&self) -> DateTime<Utc> {
        self.expiration
    }

    pub fn principal(&self) -> Option<&Url> {
        self.principal.as_ref()
    }

    pub fn proof_thumbprint(&self) -> Option<&str> {
        self.proof_thumbprint.as_deref()
    }

    pub fn is_dpop(&self) -> bool {
        self.scheme.eq_ignore_ascii_case(DPOP)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration <= now
    }

    /// Value of the `Authorization` header: `<scheme> <token>`.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.scheme, self.token)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("scheme", &self.scheme)
            .field("issuer", &self.issuer.as_str())
            .field("token", &"[redacted]")
            .field("expiration", &self.expiration)
            .field("principal", &self.principal.as_ref().map(Url::as_str))
            .field("proof_thumbprint", &self.proof_thumbprint)
            .finish()
    }
}
