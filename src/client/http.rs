//! reqwest-backed transport

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::Client;
use tracing::debug;

use super::{HttpService, TransportError};
use crate::message::{Request, Response};

pub const USER_AGENT_STRING: &str = concat!("solid-auth/", env!("CARGO_PKG_VERSION"));

static SHARED_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .user_agent(USER_AGENT_STRING)
        .referer(false)
        .build()
        .expect("Failed to create HTTP client")
});

/// [`HttpService`] over a `reqwest::Client`.
///
/// Redirects follow reqwest's default policy; a per-request timeout on the
/// [`Request`] overrides the client-wide one.
#[derive(Debug, Clone)]
pub struct ReqwestService {
    client: Client,
}

impl ReqwestService {
    /// Build a dedicated client with a client-wide timeout.
    pub fn new(timeout: Option<Duration>) -> Result<Self, TransportError> {
        let mut builder = Client::builder().user_agent(USER_AGENT_STRING).referer(false);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::Request(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Share the process-wide client.
    pub fn shared() -> Self {
        Self {
            client: SHARED_CLIENT.clone(),
        }
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestService {
    fn default() -> Self {
        Self::shared()
    }
}

#[async_trait]
impl HttpService for ReqwestService {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        let uri = request.uri().clone();
        debug!(method = %request.method(), uri = %uri, "Sending request");

        let mut builder = self
            .client
            .request(request.method().clone(), uri.clone())
            .headers(request.headers().clone());
        if let Some(body) = request.body() {
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = request.timeout() {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|e| transport_error(&uri, e))?;
        let final_uri = response.url().clone();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| transport_error(&uri, e))?;

        debug!(uri = %final_uri, status = status.as_u16(), "Received response");
        Ok(Response::new(final_uri, status, headers, body))
    }
}

fn transport_error(uri: &url::Url, err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout { uri: uri.to_string() }
    } else if err.is_connect() {
        TransportError::Connect {
            uri: uri.to_string(),
            message: err.to_string(),
        }
    } else if err.is_builder() {
        TransportError::InvalidRequest(err.to_string())
    } else {
        TransportError::Request(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_response_carries_final_uri() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/container/doc"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/container/doc"))
            .respond_with(ResponseTemplate::new(200).insert_header("Link", "<.acl>; rel=\"acl\""))
            .mount(&server)
            .await;

        let uri = url::Url::parse(&format!("{}/old", server.uri())).unwrap();
        let response = ReqwestService::shared().send(Request::get(uri)).await.unwrap();

        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(response.uri().path(), "/container/doc");
        let acl = response.links()[0].resolve(response.uri()).unwrap();
        assert_eq!(acl.path(), "/container/.acl");
    }

    #[tokio::test]
    async fn test_refused_connection_is_a_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let uri = url::Url::parse(&format!("http://127.0.0.1:{}/", port)).unwrap();
        let err = ReqwestService::shared().send(Request::get(uri)).await.unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
    }
}
