//! UMA authorization-server client: discovery and ticket exchange

use std::sync::Arc;

use http::header::{HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use http::{Method, StatusCode};
use moka::sync::Cache;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use super::claims::{ClaimToken, NeedInfo, NeedInfoHandler, RequiredClaims};
use super::UmaError;
use crate::client::{HttpService, ReqwestService, TransportError};
use crate::config::{CacheConfig, Config};
use crate::dpop::ProofError;
use crate::headers;
use crate::message::{Request, Response};
use crate::session::Session;

/// `grant_type` of a UMA ticket exchange
pub const UMA_TICKET_GRANT: &str = "urn:ietf:params:oauth:grant-type:uma-ticket";

const METADATA_PATH: &str = "/.well-known/uma2-configuration";
const JSON: &str = "application/json";
const FORM: &str = "application/x-www-form-urlencoded";

const NEED_INFO: &str = "need_info";
const REQUEST_DENIED: &str = "request_denied";
const INVALID_GRANT: &str = "invalid_grant";
const INVALID_SCOPE: &str = "invalid_scope";

/// Authorization-server discovery document
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Metadata {
    #[serde(default)]
    pub issuer: Option<Url>,
    pub token_endpoint: Url,
    #[serde(default)]
    pub jwks_uri: Option<Url>,
    #[serde(default)]
    pub grant_types_supported: Vec<String>,
    #[serde(default)]
    pub dpop_signing_alg_values_supported: Vec<String>,
    #[serde(default)]
    pub uma_profiles_supported: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenRequest {
    pub ticket: String,
    /// Persisted claims token
    pub pct: Option<String>,
    /// Requesting party token to upgrade
    pub rpt: Option<String>,
    pub claim_token: Option<ClaimToken>,
    pub scopes: Vec<String>,
}

impl TokenRequest {
    pub fn new(ticket: impl Into<String>) -> Self {
        Self {
            ticket: ticket.into(),
            ..Self::default()
        }
    }

    pub fn with_claim_token(mut self, claim_token: Option<ClaimToken>) -> Self {
        self.claim_token = claim_token;
        self
    }

    fn form(&self) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("grant_type", UMA_TICKET_GRANT.to_string()),
            ("ticket", self.ticket.clone()),
        ];
        if let Some(pct) = &self.pct {
            form.push(("pct", pct.clone()));
        }
        if let Some(rpt) = &self.rpt {
            form.push(("rpt", rpt.clone()));
        }
        if let Some(claim_token) = &self.claim_token {
            form.push(("claim_token", claim_token.token.clone()));
            form.push(("claim_token_type", claim_token.token_type.clone()));
        }
        if !self.scopes.is_empty() {
            form.push(("scope", self.scopes.join(" ")));
        }
        form
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    ticket: Option<String>,
    #[serde(default)]
    redirect_user: Option<String>,
    #[serde(default)]
    required_claims: Vec<RequiredClaims>,
}

/// Key a token request's DPoP proof is signed with.
pub struct ProofBinding<'a> {
    pub session: &'a dyn Session,
    pub thumbprint: String,
}

/// Talks to UMA authorization servers. Discovery documents are cached per
/// server.
pub struct UmaClient {
    transport: Arc<dyn HttpService>,
    metadata: Cache<String, Metadata>,
    max_iterations: usize,
}

impl UmaClient {
    pub fn new(transport: Arc<dyn HttpService>) -> Self {
        Self::with_settings(transport, &CacheConfig::default(), 5)
    }

    pub fn from_config(transport: Arc<dyn HttpService>, config: &Config) -> Self {
        Self::with_settings(transport, &config.cache, config.uma.max_iterations)
    }

    pub fn with_settings(transport: Arc<dyn HttpService>, cache: &CacheConfig, max_iterations: usize) -> Self {
        Self {
            transport,
            metadata: Cache::builder()
                .max_capacity(cache.max_entries)
                .time_to_live(cache.ttl())
                .build(),
            max_iterations,
        }
    }

    /// Fetch (or reuse) the discovery document of `as_uri`.
    pub async fn metadata(&self, as_uri: &Url) -> Result<Metadata, UmaError> {
        let location = metadata_url(as_uri);
        if let Some(metadata) = self.metadata.get(location.as_str()) {
            debug!(as_uri = %as_uri, "Using cached UMA metadata");
            return Ok(metadata);
        }

        let request = Request::builder(Method::GET, location.clone())
            .header(ACCEPT, HeaderValue::from_static(JSON))
            .build();
        let response = self.transport.send(request).await?;

        if response.status() != StatusCode::OK {
            return Err(UmaError::Metadata {
                as_uri: as_uri.to_string(),
                message: format!("unexpected response code {}", response.status().as_u16()),
            });
        }

        let metadata: Metadata = serde_json::from_slice(response.body()).map_err(|e| UmaError::Metadata {
            as_uri: as_uri.to_string(),
            message: e.to_string(),
        })?;

        debug!(as_uri = %as_uri, token_endpoint = %metadata.token_endpoint, "Discovered UMA metadata");
        self.metadata.insert(location.into(), metadata.clone());
        Ok(metadata)
    }

    /// Exchange a ticket for an access token. A `need_info` answer is
    /// retried with the new ticket and whatever claim token `claims`
    /// gathers, up to the configured number of round trips.
    pub async fn token(
        &self,
        token_endpoint: &Url,
        request: TokenRequest,
        claims: &NeedInfoHandler,
        binding: Option<&ProofBinding<'_>>,
    ) -> Result<TokenResponse, UmaError> {
        let mut request = request;

        for iteration in 1..=self.max_iterations {
            debug!(endpoint = %token_endpoint, iteration, "Requesting UMA token");
            let http_request = token_http_request(token_endpoint, &request, binding)?;
            let response = self.transport.send(http_request).await?;

            if response.status() == StatusCode::OK {
                let token: TokenResponse = serde_json::from_slice(response.body())?;
                info!(endpoint = %token_endpoint, token_type = %token.token_type, "Obtained UMA token");
                return Ok(token);
            }

            let error: ErrorResponse = match serde_json::from_slice(response.body()) {
                Ok(error) => error,
                Err(_) => return Err(unexpected_status(&response)),
            };
            let description = error.error_description.clone();

            match error.error.as_deref() {
                Some(NEED_INFO) => {
                    let need_info = need_info(error)?;
                    let claim_token = claims.claim_token(&need_info).await?;
                    request = TokenRequest {
                        ticket: need_info.ticket,
                        pct: None,
                        rpt: None,
                        claim_token,
                        scopes: request.scopes,
                    };
                }
                Some(REQUEST_DENIED) => {
                    return Err(UmaError::RequestDenied(description.unwrap_or_else(|| {
                        "the client is not authorized for the requested permissions".to_string()
                    })))
                }
                Some(INVALID_GRANT) => {
                    return Err(UmaError::InvalidGrant(
                        description.unwrap_or_else(|| "invalid grant provided".to_string()),
                    ))
                }
                Some(INVALID_SCOPE) => {
                    return Err(UmaError::InvalidScope(
                        description.unwrap_or_else(|| "invalid scope provided".to_string()),
                    ))
                }
                _ => return Err(unexpected_status(&response)),
            }
        }

        Err(UmaError::MaxIterations(self.max_iterations))
    }
}

impl Default for UmaClient {
    fn default() -> Self {
        Self::new(Arc::new(ReqwestService::shared()))
    }
}

fn metadata_url(as_uri: &Url) -> Url {
    let mut location = as_uri.clone();
    let path = format!("{}{}", as_uri.path().trim_end_matches('/'), METADATA_PATH);
    location.set_path(&path);
    location.set_query(None);
    location.set_fragment(None);
    location
}

fn token_http_request(
    token_endpoint: &Url,
    request: &TokenRequest,
    binding: Option<&ProofBinding<'_>>,
) -> Result<Request, UmaError> {
    let body = serde_urlencoded::to_string(request.form())?;
    let mut http_request = Request::builder(Method::POST, token_endpoint.clone())
        .header(CONTENT_TYPE, HeaderValue::from_static(FORM))
        .header(ACCEPT, HeaderValue::from_static(JSON))
        .body(body)
        .build();

    if let Some(binding) = binding {
        let proof = binding
            .session
            .generate_proof(&binding.thumbprint, &http_request)?
            .ok_or_else(|| ProofError::UnknownThumbprint(binding.thumbprint.clone()))?;
        let value = HeaderValue::from_str(&proof)
            .map_err(|e| TransportError::InvalidRequest(format!("invalid DPoP header: {}", e)))?;
        http_request.set_header(HeaderName::from_static(headers::DPOP), value);
    }

    Ok(http_request)
}

fn need_info(error: ErrorResponse) -> Result<NeedInfo, UmaError> {
    let ticket = error
        .ticket
        .ok_or_else(|| UmaError::NeedInfo("missing ticket".to_string()))?;
    Ok(NeedInfo {
        ticket,
        redirect_user: error.redirect_user.as_deref().and_then(|u| Url::parse(u).ok()),
        required_claims: error.required_claims,
    })
}

fn unexpected_status(response: &Response) -> UmaError {
    UmaError::UnexpectedStatus {
        status: response.status().as_u16(),
        body: String::from_utf8_lossy(response.body()).into_owned(),
    }
}
