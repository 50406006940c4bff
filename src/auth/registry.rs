//! Scheme registry and challenge negotiation

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use http::header::WWW_AUTHENTICATE;
use http::HeaderMap;
use tracing::debug;

use super::openid::OpenIdProvider;
use super::uma::{UmaClient, UmaProvider};
use super::{AuthError, AuthenticationProvider, Authenticator, Credential};
use crate::client::HttpService;
use crate::config::{Config, NegotiationConfig};
use crate::headers::{header_values, parse_www_authenticate, Challenge};
use crate::message::Request;
use crate::session::Session;

/// Challenge parameter listing the proof algorithms a server accepts
const ALGORITHMS_PARAMETER: &str = "algs";

/// Registry of authentication providers keyed by scheme.
///
/// Built once, then shared read-only. [`negotiate`](Self::negotiate) turns a
/// 401's challenges into at most one credential: every challenge whose
/// scheme is registered and supported by the session yields an
/// authenticator, and only the highest-priority one runs.
pub struct ReactiveAuthorization {
    providers: BTreeMap<String, Arc<dyn AuthenticationProvider>>,
    fallback: Option<String>,
}

pub struct ReactiveAuthorizationBuilder {
    providers: Vec<Arc<dyn AuthenticationProvider>>,
    prohibited: BTreeSet<String>,
    fallback: Option<String>,
}

impl Default for ReactiveAuthorizationBuilder {
    fn default() -> Self {
        Self::from_negotiation_config(&NegotiationConfig::default())
    }
}

impl ReactiveAuthorizationBuilder {
    pub fn from_negotiation_config(config: &NegotiationConfig) -> Self {
        Self {
            providers: Vec::new(),
            prohibited: config.prohibited_schemes.iter().map(|s| s.to_ascii_lowercase()).collect(),
            fallback: config.fallback_scheme.clone(),
        }
    }

    /// Register a provider. A later provider replaces an earlier one for
    /// the schemes they share.
    pub fn provider(mut self, provider: Arc<dyn AuthenticationProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn prohibited_schemes<I, S>(mut self, schemes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.prohibited = schemes.into_iter().map(|s| s.as_ref().to_ascii_lowercase()).collect();
        self
    }

    /// Scheme tried with a bare challenge when nothing else matches.
    pub fn fallback_scheme(mut self, scheme: Option<String>) -> Self {
        self.fallback = scheme;
        self
    }

    pub fn build(self) -> ReactiveAuthorization {
        let mut providers: BTreeMap<String, Arc<dyn AuthenticationProvider>> = BTreeMap::new();
        for provider in self.providers {
            for scheme in provider.schemes() {
                let key = scheme.to_ascii_lowercase();
                if self.prohibited.contains(&key) {
                    debug!(scheme = %scheme, "Omitting provider for prohibited scheme");
                    continue;
                }
                debug!(scheme = %scheme, "Registering authentication provider");
                providers.insert(key, provider.clone());
            }
        }

        ReactiveAuthorization {
            providers,
            fallback: self.fallback,
        }
    }
}

impl ReactiveAuthorization {
    pub fn builder() -> ReactiveAuthorizationBuilder {
        ReactiveAuthorizationBuilder::default()
    }

    /// OpenID and UMA providers with the default negotiation settings.
    pub fn with_defaults(uma: Arc<UmaClient>) -> Self {
        Self::builder()
            .provider(Arc::new(OpenIdProvider::new()))
            .provider(Arc::new(UmaProvider::new(uma)))
            .build()
    }

    pub fn from_config(config: &Config, transport: Arc<dyn HttpService>) -> Self {
        let uma = Arc::new(UmaClient::from_config(transport, config));
        ReactiveAuthorizationBuilder::from_negotiation_config(&config.negotiation)
            .provider(Arc::new(OpenIdProvider::new()))
            .provider(Arc::new(UmaProvider::new(uma)))
            .build()
    }

    /// Registered schemes, lowercased.
    pub fn schemes(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    pub fn is_registered(&self, scheme: &str) -> bool {
        self.providers.contains_key(&scheme.to_ascii_lowercase())
    }

    /// Negotiate from the `WWW-Authenticate` headers of a response.
    pub async fn negotiate(
        &self,
        session: &dyn Session,
        request: &Request,
        headers: &HeaderMap,
    ) -> Result<Option<Credential>, AuthError> {
        let challenges = parse_www_authenticate(header_values(headers, WWW_AUTHENTICATE));
        self.negotiate_challenges(session, request, &challenges).await
    }

    /// Run the highest-priority authenticator among `challenges`.
    /// `Ok(None)` means no registered scheme applied.
    pub async fn negotiate_challenges(
        &self,
        session: &dyn Session,
        request: &Request,
        challenges: &[Challenge],
    ) -> Result<Option<Credential>, AuthError> {
        let algorithms = algorithms(challenges);
        let mut authenticators = self.authenticators(session, challenges);

        if authenticators.is_empty() {
            if let Some(authenticator) = self.fallback_authenticator(session) {
                authenticators.push(authenticator);
            }
        }

        // stable: equal priorities keep challenge order
        authenticators.sort_by_key(|a| Reverse(a.priority()));

        let Some(authenticator) = authenticators.first() else {
            debug!(uri = %request.uri(), challenges = challenges.len(), "No authenticator for challenges");
            return Ok(None);
        };

        debug!(
            uri = %request.uri(),
            authenticator = %authenticator.name(),
            priority = authenticator.priority(),
            candidates = authenticators.len(),
            "Selected authenticator"
        );
        session.authenticate(authenticator.as_ref(), request, &algorithms).await
    }

    fn authenticators(&self, session: &dyn Session, challenges: &[Challenge]) -> Vec<Box<dyn Authenticator>> {
        let mut authenticators = Vec::new();
        for challenge in challenges {
            let Some(provider) = self.providers.get(&challenge.scheme().to_ascii_lowercase()) else {
                debug!(scheme = %challenge.scheme(), "Unregistered challenge scheme");
                continue;
            };
            if !session.supports_scheme(challenge.scheme()) {
                debug!(scheme = %challenge.scheme(), session = %session.id(), "Session does not support scheme");
                continue;
            }
            match provider.authenticator(challenge) {
                Ok(authenticator) => authenticators.push(authenticator),
                Err(e) => debug!(challenge = %challenge, error = %e, "Skipping invalid challenge"),
            }
        }
        authenticators
    }

    fn fallback_authenticator(&self, session: &dyn Session) -> Option<Box<dyn Authenticator>> {
        let scheme = self.fallback.as_deref()?;
        let provider = self.providers.get(&scheme.to_ascii_lowercase())?;
        if !session.supports_scheme(scheme) {
            return None;
        }
        debug!(scheme = %scheme, "Trying fallback scheme");
        provider
            .authenticator(&Challenge::new(scheme))
            .map_err(|e| debug!(scheme = %scheme, error = %e, "Fallback scheme unavailable"))
            .ok()
    }
}

fn algorithms(challenges: &[Challenge]) -> BTreeSet<String> {
    challenges
        .iter()
        .filter_map(|c| c.parameter(ALGORITHMS_PARAMETER))
        .flat_map(|algs| algs.split_whitespace().map(String::from))
        .collect()
}
