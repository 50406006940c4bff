//! Reactive authorization: send, and negotiate only when challenged

use std::sync::Arc;

use http::header::{HeaderName, HeaderValue, AUTHORIZATION};
use http::StatusCode;
use tracing::{debug, warn};

use super::{HttpService, ReqwestService, TransportError};
use crate::auth::{Credential, ReactiveAuthorization, UmaClient};
use crate::dpop::ProofError;
use crate::errors::Result;
use crate::headers;
use crate::message::{Request, Response};
use crate::session::{AnonymousSession, Session};

/// Steps of one [`AuthorizationClient::send`].
#[derive(Debug)]
enum State {
    /// The caller supplied `Authorization`; send untouched.
    Passthrough,
    /// A cached credential covers the URI; send upgraded.
    Cached(Credential),
    UnauthenticatedSend,
    /// The server answered 401; try its challenges.
    Negotiate(Response),
    /// Resend once with the negotiated credential.
    Retry(Credential),
    Done(Response),
}

/// HTTP client that answers authentication challenges on behalf of a
/// [`Session`].
///
/// A request is sent unauthenticated unless the session already holds a
/// credential for its URI. On a 401 the response's challenges are
/// negotiated and the request is resent exactly once. A failed negotiation
/// is not an error: the caller gets the server's 401.
#[derive(Clone)]
pub struct AuthorizationClient {
    transport: Arc<dyn HttpService>,
    session: Arc<dyn Session>,
    registry: Arc<ReactiveAuthorization>,
}

impl AuthorizationClient {
    pub fn new(
        transport: Arc<dyn HttpService>,
        session: Arc<dyn Session>,
        registry: Arc<ReactiveAuthorization>,
    ) -> Self {
        Self {
            transport,
            session,
            registry,
        }
    }

    /// Shared reqwest transport, default providers, anonymous session.
    pub fn with_defaults() -> Self {
        let transport: Arc<dyn HttpService> = Arc::new(ReqwestService::shared());
        let registry = ReactiveAuthorization::with_defaults(Arc::new(UmaClient::new(transport.clone())));
        Self::new(transport, Arc::new(AnonymousSession::new()), Arc::new(registry))
    }

    /// A client for `session` sharing this client's transport and registry.
    pub fn with_session(&self, session: Arc<dyn Session>) -> Self {
        Self {
            transport: self.transport.clone(),
            session,
            registry: self.registry.clone(),
        }
    }

    pub fn session(&self) -> &Arc<dyn Session> {
        &self.session
    }

    pub fn registry(&self) -> &ReactiveAuthorization {
        &self.registry
    }

    /// Send `request`, upgrading it with a credential when possible.
    ///
    /// Transport failures and proof-generation failures are returned as
    /// errors; authentication failures surface as the server's response.
    pub async fn send(&self, request: Request) -> Result<Response> {
        let mut state = self.initial_state(&request);

        loop {
            debug!(uri = %request.uri(), state = state.name(), "Reactive client step");
            state = match state {
                State::Passthrough => State::Done(self.transport.send(request.clone()).await?),
                State::Cached(credential) => {
                    let upgraded = self.upgrade(&request, &credential)?;
                    State::Done(self.transport.send(upgraded).await?)
                }
                State::UnauthenticatedSend => {
                    let response = self.transport.send(request.clone()).await?;
                    if response.status() == StatusCode::UNAUTHORIZED {
                        State::Negotiate(response)
                    } else {
                        State::Done(response)
                    }
                }
                State::Negotiate(unauthorized) => {
                    match self
                        .registry
                        .negotiate(self.session.as_ref(), &request, unauthorized.headers())
                        .await
                    {
                        Ok(Some(credential)) => State::Retry(credential),
                        Ok(None) => {
                            debug!(uri = %request.uri(), "No credential negotiated");
                            State::Done(unauthorized)
                        }
                        Err(e) => {
                            warn!(uri = %request.uri(), error = %e, "Negotiation failed");
                            State::Done(unauthorized)
                        }
                    }
                }
                State::Retry(credential) => {
                    let upgraded = self.upgrade(&request, &credential)?;
                    State::Done(self.transport.send(upgraded).await?)
                }
                State::Done(response) => return Ok(response),
            };
        }
    }

    fn initial_state(&self, request: &Request) -> State {
        if request.headers().contains_key(AUTHORIZATION) {
            return State::Passthrough;
        }
        match self.session.from_cache(request) {
            Some(credential) => State::Cached(credential),
            None => State::UnauthenticatedSend,
        }
    }

    /// Copy of `request` carrying `credential`. `Authorization` and `DPoP`
    /// replace any existing values; the proof covers the original method
    /// and URI.
    fn upgrade(&self, request: &Request, credential: &Credential) -> Result<Request> {
        let mut upgraded = request.clone();
        upgraded.set_header(AUTHORIZATION, header_value(&credential.authorization_header())?);

        if credential.is_dpop() {
            let thumbprint = credential.proof_thumbprint().ok_or(ProofError::Unbound)?;
            let proof = self
                .session
                .generate_proof(thumbprint, request)?
                .ok_or_else(|| ProofError::UnknownThumbprint(thumbprint.to_string()))?;
            upgraded.set_header(HeaderName::from_static(headers::DPOP), header_value(&proof)?);
        }

        Ok(upgraded)
    }
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::Passthrough => "PASSTHROUGH",
            State::Cached(_) => "CACHED",
            State::UnauthenticatedSend => "UNAUTHENTICATED_SEND",
            State::Negotiate(_) => "NEGOTIATE",
            State::Retry(_) => "RETRY",
            State::Done(_) => "DONE",
        }
    }
}

fn header_value(value: &str) -> std::result::Result<HeaderValue, TransportError> {
    HeaderValue::from_str(value).map_err(|e| TransportError::InvalidRequest(format!("invalid header value: {}", e)))
}
