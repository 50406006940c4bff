//! Request and response values exchanged with the transport
//!
//! Both are plain data: the reactive client clones and rewrites requests
//! freely, and never looks at a body beyond passing it through.

use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue, LINK, WWW_AUTHENTICATE};
use http::{Method, StatusCode};
use url::Url;

use crate::headers::{self, Challenge, Link, WacAllow};

#[derive(Debug, Clone)]
pub struct Request {
    uri: Url,
    method: Method,
    headers: HeaderMap,
    body: Option<Bytes>,
    timeout: Option<Duration>,
}

impl Request {
    pub fn new(method: Method, uri: Url) -> Self {
        Self {
            uri,
            method,
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn get(uri: Url) -> Self {
        Self::new(Method::GET, uri)
    }

    pub fn builder(method: Method, uri: Url) -> RequestBuilder {
        RequestBuilder {
            request: Self::new(method, uri),
        }
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// The request URI without its fragment. Fragments never reach the
    /// server, so they neither scope credentials nor appear in proofs.
    pub fn uri_without_fragment(&self) -> Url {
        let mut uri = self.uri.clone();
        uri.set_fragment(None);
        uri
    }

    /// Replace every existing value of `name` with `value`.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }
}

pub struct RequestBuilder {
    request: Request,
}

impl RequestBuilder {
    /// Append a header value, keeping values already present under `name`.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.request.headers.append(name, value);
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        for (name, value) in headers.iter() {
            self.request.headers.append(name.clone(), value.clone());
        }
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.request.body = Some(body.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.request.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Request {
        self.request
    }
}

#[derive(Debug, Clone)]
pub struct Response {
    uri: Url,
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Response {
    pub fn new(uri: Url, status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            uri,
            status,
            headers,
            body,
        }
    }

    /// URI of the request this response answers.
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }

    pub fn challenges(&self) -> Vec<Challenge> {
        headers::parse_www_authenticate(headers::header_values(&self.headers, WWW_AUTHENTICATE))
    }

    pub fn wac_allow(&self) -> WacAllow {
        headers::parse_wac_allow(headers::header_values(
            &self.headers,
            HeaderName::from_static(headers::WAC_ALLOW),
        ))
    }

    pub fn links(&self) -> Vec<Link> {
        headers::parse_link(headers::header_values(&self.headers, LINK))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_keeps_multi_valued_headers() {
        let uri = Url::parse("https://pod.example/data#frag").unwrap();
        let request = Request::builder(Method::PUT, uri)
            .header(http::header::ACCEPT, HeaderValue::from_static("text/turtle"))
            .header(http::header::ACCEPT, HeaderValue::from_static("application/ld+json"))
            .body("<> a <#Thing> .")
            .timeout(Duration::from_secs(5))
            .build();

        assert_eq!(request.headers().get_all(http::header::ACCEPT).iter().count(), 2);
        assert_eq!(request.timeout(), Some(Duration::from_secs(5)));
        assert_eq!(request.uri_without_fragment().as_str(), "https://pod.example/data");
        assert_eq!(request.uri().fragment(), Some("frag"));
    }

    #[test]
    fn test_set_header_overwrites() {
        let mut request = Request::get(Url::parse("https://pod.example/").unwrap());
        request.headers_mut().append(http::header::AUTHORIZATION, HeaderValue::from_static("Bearer a"));
        request.headers_mut().append(http::header::AUTHORIZATION, HeaderValue::from_static("Bearer b"));
        request.set_header(http::header::AUTHORIZATION, HeaderValue::from_static("DPoP c"));

        let values: Vec<_> = request.headers().get_all(http::header::AUTHORIZATION).iter().collect();
        assert_eq!(values, vec![&HeaderValue::from_static("DPoP c")]);
    }

    #[test]
    fn test_response_header_helpers() {
        let mut map = HeaderMap::new();
        map.append(WWW_AUTHENTICATE, HeaderValue::from_static("UMA ticket=\"t\", as_uri=\"https://as.example\""));
        map.append(HeaderName::from_static(headers::WAC_ALLOW), HeaderValue::from_static("user=\"read write\""));
        map.append(LINK, HeaderValue::from_static("</acl>; rel=\"acl\""));

        let response = Response::new(
            Url::parse("https://pod.example/data").unwrap(),
            StatusCode::UNAUTHORIZED,
            map,
            Bytes::new(),
        );

        assert_eq!(response.challenges()[0].parameter("ticket"), Some("t"));
        assert!(response.wac_allow().allows("user", "write"));
        let acl = &response.links()[0];
        assert!(acl.has_rel("acl"));
        assert_eq!(acl.resolve(response.uri()).unwrap().as_str(), "https://pod.example/acl");
    }
}
