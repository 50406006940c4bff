//! `UMA` challenge handling

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use url::Url;

use super::claims::{ClaimGatheringHandler, ClaimToken, NeedInfoHandler};
use super::client::{ProofBinding, TokenRequest, UmaClient};
use super::UmaError;
use crate::auth::{AuthError, AuthenticationProvider, Authenticator, Credential};
use crate::headers::Challenge;
use crate::message::Request;
use crate::session::{Session, ID_TOKEN, UMA};

/// Priority of the UMA authenticator; above OpenID.
pub const UMA_PRIORITY: i32 = 100;

/// Lifetime assumed when the token response carries no `expires_in`.
const DEFAULT_EXPIRES_IN: i64 = 300;

const AS_URI: &str = "as_uri";
const TICKET: &str = "ticket";

pub struct UmaProvider {
    client: Arc<UmaClient>,
    claims: NeedInfoHandler,
    priority: i32,
}

impl UmaProvider {
    pub fn new(client: Arc<UmaClient>) -> Self {
        Self {
            client,
            claims: NeedInfoHandler::new(),
            priority: UMA_PRIORITY,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_handler(mut self, handler: Arc<dyn ClaimGatheringHandler>) -> Self {
        self.claims.add_handler(handler);
        self
    }

    fn validate(challenge: &Challenge) -> Result<(Url, String), UmaError> {
        if !challenge.is_scheme(UMA) {
            return Err(UmaError::InvalidChallenge(format!("scheme {}", challenge.scheme())));
        }
        let as_uri = challenge
            .parameter(AS_URI)
            .ok_or_else(|| UmaError::InvalidChallenge("missing as_uri".to_string()))?;
        let as_uri = Url::parse(as_uri)
            .map_err(|e| UmaError::InvalidChallenge(format!("as_uri {}: {}", as_uri, e)))?;
        let ticket = challenge
            .parameter(TICKET)
            .ok_or_else(|| UmaError::InvalidChallenge("missing ticket".to_string()))?;
        Ok((as_uri, ticket.to_string()))
    }
}

impl AuthenticationProvider for UmaProvider {
    fn schemes(&self) -> BTreeSet<String> {
        BTreeSet::from([UMA.to_string()])
    }

    fn authenticator(&self, challenge: &Challenge) -> Result<Box<dyn Authenticator>, AuthError> {
        let (as_uri, ticket) =
            Self::validate(challenge).map_err(|e| AuthError::InvalidChallenge(e.to_string()))?;
        Ok(Box::new(UmaAuthenticator {
            client: self.client.clone(),
            claims: self.claims.clone(),
            as_uri,
            ticket,
            priority: self.priority,
        }))
    }
}

/// Trades one challenge's ticket for an access token.
pub struct UmaAuthenticator {
    client: Arc<UmaClient>,
    claims: NeedInfoHandler,
    as_uri: Url,
    ticket: String,
    priority: i32,
}

#[async_trait]
impl Authenticator for UmaAuthenticator {
    fn name(&self) -> &str {
        "UMA"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn authenticate(
        &self,
        session: &dyn Session,
        request: &Request,
        _algorithms: &BTreeSet<String>,
    ) -> Result<Credential, AuthError> {
        let id_token = session.credential(ID_TOKEN, request.uri()).await?;
        let claim_token = id_token.as_ref().map(|c| ClaimToken::new(c.token(), ID_TOKEN));
        let principal = id_token.as_ref().and_then(|c| c.principal().cloned());
        let jkt = id_token
            .as_ref()
            .and_then(|c| c.proof_thumbprint().map(String::from));

        let metadata = self.client.metadata(&self.as_uri).await?;

        let server_algorithms: BTreeSet<String> =
            metadata.dpop_signing_alg_values_supported.iter().cloned().collect();
        let binding = session
            .select_thumbprint(&server_algorithms)
            .map(|thumbprint| ProofBinding { session, thumbprint });
        if let Some(binding) = &binding {
            debug!(as_uri = %self.as_uri, thumbprint = %binding.thumbprint, "Binding UMA token to proof key");
        }

        let token_request = TokenRequest::new(self.ticket.clone()).with_claim_token(claim_token);
        let token = self
            .client
            .token(&metadata.token_endpoint, token_request, &self.claims, binding.as_ref())
            .await?;

        let expiration = expiration_after(token.expires_in)?;
        let thumbprint = binding.map(|b| b.thumbprint).or(jkt);

        Ok(Credential::new(
            token.token_type,
            self.as_uri.clone(),
            token.access_token,
            expiration,
        )
        .with_principal(principal)
        .with_proof_thumbprint(thumbprint))
    }
}

/// Expiry of a token issued now with lifetime `expires_in` seconds. A
/// lifetime past the representable range is rejected.
fn expiration_after(expires_in: Option<u64>) -> Result<DateTime<Utc>, AuthError> {
    let secs = match expires_in {
        Some(secs) => i64::try_from(secs).ok(),
        None => Some(DEFAULT_EXPIRES_IN),
    };
    secs.and_then(Duration::try_seconds)
        .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
        .ok_or_else(|| {
            AuthError::InvalidCredential(format!(
                "token lifetime out of range: {}",
                expires_in.unwrap_or_default()
            ))
        })
}
