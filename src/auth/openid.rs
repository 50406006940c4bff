//! ID-token presentation for `Bearer` and `DPoP` challenges

use std::collections::BTreeSet;

use async_trait::async_trait;
use tracing::debug;

use super::{AuthError, AuthenticationProvider, Authenticator, Credential, BEARER, DPOP};
use crate::headers::Challenge;
use crate::message::Request;
use crate::session::{Session, ID_TOKEN};

/// Priority of the OpenID authenticator; below UMA.
pub const OPENID_PRIORITY: i32 = 50;

#[derive(Debug, Clone, Default)]
pub struct OpenIdProvider;

impl OpenIdProvider {
    pub fn new() -> Self {
        Self
    }
}

impl AuthenticationProvider for OpenIdProvider {
    fn schemes(&self) -> BTreeSet<String> {
        BTreeSet::from([BEARER.to_string(), DPOP.to_string()])
    }

    fn authenticator(&self, challenge: &Challenge) -> Result<Box<dyn Authenticator>, AuthError> {
        let requires_proof = challenge.is_scheme(DPOP);
        if !requires_proof && !challenge.is_scheme(BEARER) {
            return Err(AuthError::InvalidChallenge(format!(
                "OpenID cannot answer {} challenges",
                challenge.scheme()
            )));
        }
        Ok(Box::new(OpenIdAuthenticator { requires_proof }))
    }
}

/// Answers with the session's ID token under the token's own scheme.
#[derive(Debug, Clone)]
pub struct OpenIdAuthenticator {
    requires_proof: bool,
}

#[async_trait]
impl Authenticator for OpenIdAuthenticator {
    fn name(&self) -> &str {
        "OpenId"
    }

    fn priority(&self) -> i32 {
        OPENID_PRIORITY
    }

    async fn authenticate(
        &self,
        session: &dyn Session,
        request: &Request,
        _algorithms: &BTreeSet<String>,
    ) -> Result<Credential, AuthError> {
        let credential = session
            .credential(ID_TOKEN, request.uri())
            .await?
            .ok_or_else(|| AuthError::Negotiation("session has no ID token".to_string()))?;

        if self.requires_proof && credential.proof_thumbprint().is_none() {
            return Err(AuthError::Negotiation(
                "DPoP challenge but the ID token is not bound to a proof key".to_string(),
            ));
        }

        debug!(session = %session.id(), scheme = %credential.scheme(), "Presenting ID token");
        Ok(credential)
    }
}
