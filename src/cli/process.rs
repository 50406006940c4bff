//! Post-processing argument logic
//!
//! Turns parsed arguments into a [`Request`] and the inputs of a session:
//! method inference, URL normalization, header items and DPoP key specs.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use http::header::{HeaderName, HeaderValue};
use http::Method;
use url::Url;

use crate::cli::args::Args;
use crate::dpop::ProofAlgorithm;
use crate::errors::SolidAuthError;
use crate::message::Request;

/// Check if a string has a valid URL scheme (e.g., "http://", "https://")
/// Per RFC 3986: scheme = ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )
fn has_url_scheme(s: &str) -> bool {
    if let Some(pos) = s.find("://") {
        let scheme = &s[..pos];
        !scheme.is_empty()
            && scheme.chars().next().map(|c| c.is_ascii_alphabetic()).unwrap_or(false)
            && scheme.chars().skip(1).all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
    } else {
        false
    }
}

/// Parse localhost shorthand (:PORT/path or :/path)
/// Returns (port, rest) if it matches the pattern
fn parse_localhost_shorthand(s: &str) -> Option<(&str, &str)> {
    if !s.starts_with(':') || s.starts_with("::") {
        return None;
    }

    let after_colon = &s[1..];
    let (port, rest) = match after_colon.find('/') {
        Some(slash_pos) => (&after_colon[..slash_pos], &after_colon[slash_pos..]),
        None => (after_colon, ""),
    };

    if port.chars().all(|c| c.is_ascii_digit()) {
        Some((port, rest))
    } else {
        None
    }
}

/// Normalize a command-line URL: `:8080/x` means localhost, and a missing
/// scheme means `https`.
pub fn normalize_url(input: &str) -> Result<Url, SolidAuthError> {
    let candidate = if let Some((port, rest)) = parse_localhost_shorthand(input) {
        if port.is_empty() {
            format!("http://localhost{}", rest)
        } else {
            format!("http://localhost:{}{}", port, rest)
        }
    } else if has_url_scheme(input) || input.starts_with("urn:") {
        input.to_string()
    } else {
        format!("https://{}", input)
    };

    Ok(Url::parse(&candidate)?)
}

/// Split the positional `[METHOD] URL` arguments.
pub fn parse_target(request: &[String]) -> Result<(Method, Url), SolidAuthError> {
    match request {
        [url] => Ok((Method::GET, normalize_url(url)?)),
        [method, url] => {
            let method = Method::from_str(&method.to_ascii_uppercase())
                .map_err(|_| SolidAuthError::Argument(format!("invalid HTTP method: {}", method)))?;
            Ok((method, normalize_url(url)?))
        }
        _ => Err(SolidAuthError::Argument("expected [METHOD] URL".to_string())),
    }
}

/// Parse `Name: value`.
pub fn parse_header(item: &str) -> Result<(HeaderName, HeaderValue), SolidAuthError> {
    let (name, value) = item
        .split_once(':')
        .ok_or_else(|| SolidAuthError::Argument(format!("header must be NAME: VALUE, got {:?}", item)))?;
    let name = HeaderName::from_str(name.trim())
        .map_err(|e| SolidAuthError::Argument(format!("invalid header name {:?}: {}", name, e)))?;
    let value = HeaderValue::from_str(value.trim())
        .map_err(|e| SolidAuthError::Argument(format!("invalid value for {}: {}", name, e)))?;
    Ok((name, value))
}

/// Parse `ALG=path`.
pub fn parse_dpop_key(item: &str) -> Result<(ProofAlgorithm, PathBuf), SolidAuthError> {
    let (algorithm, path) = item
        .split_once('=')
        .ok_or_else(|| SolidAuthError::Argument(format!("DPoP key must be ALG=PEM, got {:?}", item)))?;
    let algorithm = ProofAlgorithm::from_name(algorithm.trim())?;
    if path.trim().is_empty() {
        return Err(SolidAuthError::Argument(format!("missing key path for {}", algorithm)));
    }
    Ok((algorithm, PathBuf::from(path.trim())))
}

/// Build the request described by `args`.
pub fn build_request(args: &Args) -> Result<Request, SolidAuthError> {
    let (method, url) = parse_target(&args.request)?;
    let mut builder = Request::builder(method, url);

    for item in &args.headers {
        let (name, value) = parse_header(item)?;
        builder = builder.header(name, value);
    }
    if let Some(data) = &args.data {
        builder = builder.body(data.clone());
    }
    if let Some(secs) = args.timeout {
        builder = builder.timeout(Duration::from_secs(secs));
    }

    Ok(builder.build())
}
