//! Sessions backed by an OpenID Connect ID token

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use super::cache::{CredentialCache, CredentialSlot};
use super::verification::{verify_id_token, OpenIdVerificationConfig};
use super::{authenticate_and_cache, Session, ID_TOKEN};
use crate::auth::{AuthError, Authenticator, Credential, BEARER, DPOP};
use crate::client::{HttpService, ReqwestService};
use crate::config::CacheConfig;
use crate::dpop::{DpopManager, ProofError, ProofGenerator};
use crate::message::Request;

/// Source of fresh ID tokens for a session whose token expires. Token
/// issuance itself (authorization code, client credentials) lives behind
/// this seam.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self) -> Result<String, AuthError>;
}

pub struct OpenIdSessionBuilder {
    config: OpenIdVerificationConfig,
    transport: Option<Arc<dyn HttpService>>,
    cache: CacheConfig,
}

impl OpenIdSessionBuilder {
    /// Transport used to fetch signing keys.
    pub fn transport(mut self, transport: Arc<dyn HttpService>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Build a session from a token, verifying it now. A token that fails
    /// verification is a terminal error.
    pub async fn id_token(self, token: &str) -> Result<OpenIdSession, AuthError> {
        let transport = self.resolved_transport();
        let verified = verify_id_token(token, &self.config, transport.as_ref()).await?;
        info!(session = %verified.session_id, "Created OpenID session");
        OpenIdSession::assemble(
            verified.session_id,
            Some(verified.credential),
            None,
            self.config,
            transport,
            &self.cache,
        )
    }

    /// Build a session whose ID token is obtained lazily from `refresher`.
    pub fn refresher(self, refresher: Arc<dyn TokenRefresher>) -> Result<OpenIdSession, AuthError> {
        let transport = self.resolved_transport();
        OpenIdSession::assemble(
            Uuid::new_v4().to_string(),
            None,
            Some(refresher),
            self.config,
            transport,
            &self.cache,
        )
    }

    fn resolved_transport(&self) -> Arc<dyn HttpService> {
        self.transport
            .clone()
            .unwrap_or_else(|| Arc::new(ReqwestService::shared()))
    }
}

pub struct OpenIdSession {
    id: String,
    slot: CredentialSlot,
    refresher: Option<Arc<dyn TokenRefresher>>,
    config: OpenIdVerificationConfig,
    transport: Arc<dyn HttpService>,
    cache: CredentialCache,
    proofs: Option<DpopManager>,
}

impl OpenIdSession {
    pub fn builder(config: OpenIdVerificationConfig) -> OpenIdSessionBuilder {
        OpenIdSessionBuilder {
            config,
            transport: None,
            cache: CacheConfig::default(),
        }
    }

    pub async fn from_id_token(token: &str, config: OpenIdVerificationConfig) -> Result<Self, AuthError> {
        Self::builder(config).id_token(token).await
    }

    pub fn with_refresher(
        refresher: Arc<dyn TokenRefresher>,
        config: OpenIdVerificationConfig,
    ) -> Result<Self, AuthError> {
        Self::builder(config).refresher(refresher)
    }

    fn assemble(
        id: String,
        credential: Option<Credential>,
        refresher: Option<Arc<dyn TokenRefresher>>,
        config: OpenIdVerificationConfig,
        transport: Arc<dyn HttpService>,
        cache: &CacheConfig,
    ) -> Result<Self, AuthError> {
        let proofs = if config.proof_key_pairs.is_empty() {
            None
        } else {
            Some(DpopManager::with_keys(config.proof_key_pairs.iter().cloned())?)
        };

        Ok(Self {
            id,
            slot: CredentialSlot::new(credential),
            refresher,
            config,
            transport,
            cache: cache.credential_cache(),
            proofs,
        })
    }

    async fn refresh_id_token(&self) -> Result<Option<Credential>, AuthError> {
        let Some(refresher) = &self.refresher else {
            debug!(session = %self.id, "ID token expired and no refresher is configured");
            return Ok(None);
        };
        let token = refresher.refresh().await?;
        let verified = verify_id_token(&token, &self.config, self.transport.as_ref()).await?;
        Ok(Some(verified.credential))
    }
}

#[async_trait]
impl Session for OpenIdSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn principal(&self) -> Option<Url> {
        self.slot.last().and_then(|c| c.principal().cloned())
    }

    fn supported_schemes(&self) -> BTreeSet<String> {
        let mut schemes = BTreeSet::from([BEARER.to_string()]);
        if self.proofs.is_some() {
            schemes.insert(DPOP.to_string());
        }
        schemes
    }

    async fn credential(&self, name: &str, _uri: &Url) -> Result<Option<Credential>, AuthError> {
        if name != ID_TOKEN {
            return Ok(None);
        }
        self.slot.get_or_refresh(|| self.refresh_id_token()).await
    }

    fn from_cache(&self, request: &Request) -> Option<Credential> {
        self.cache.get(request.uri())
    }

    fn select_thumbprint(&self, algorithms: &BTreeSet<String>) -> Option<String> {
        let proofs = self.proofs.as_ref()?;
        proofs
            .algorithms()
            .iter()
            .filter(|alg| algorithms.contains(*alg))
            .find_map(|alg| proofs.lookup_thumbprint(alg))
    }

    fn generate_proof(&self, thumbprint: &str, request: &Request) -> Result<Option<String>, ProofError> {
        let Some(proofs) = &self.proofs else {
            return Ok(None);
        };
        match proofs.lookup_algorithm(thumbprint) {
            Some(algorithm) => proofs
                .generate_proof(&algorithm, request.uri(), request.method())
                .map(Some),
            None => Ok(None),
        }
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
        debug!(session = %self.id, "Resetting session");
        self.slot.clear();
        self.cache.clear();
    }
}
