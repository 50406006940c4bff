//! `WWW-Authenticate` challenges (RFC 7235 §2.1)
//!
//! The grammar is tolerant in the way servers in the wild require: a bare
//! token68 after the scheme is accepted (`Basic abcdef==`), parameters may
//! follow the scheme separated by whitespace or by commas, and a malformed
//! element is logged and skipped without losing the rest of the header.

use std::fmt;
use std::hash::{Hash, Hasher};

use indexmap::IndexMap;
use tracing::debug;
use winnow::combinator::fail;
use winnow::prelude::*;
use winnow::ModalResult;

use super::lexer::{is_tchar, is_ws, ows, param, skip_separators, skip_until, token, token68};

/// One authentication scheme offered by a server.
///
/// The scheme compares case-insensitively; parameter names and values are
/// compared exactly. Parameters keep the order of their first occurrence.
#[derive(Debug, Clone, Eq)]
pub struct Challenge {
    scheme: String,
    parameters: IndexMap<String, String>,
}

impl Challenge {
    pub fn new(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            parameters: IndexMap::new(),
        }
    }

    /// Builder-style parameter insertion. An existing parameter of the same
    /// name is left untouched.
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name.into(), value.into());
        self
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn parameters(&self) -> &IndexMap<String, String> {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    pub fn is_scheme(&self, scheme: &str) -> bool {
        self.scheme.eq_ignore_ascii_case(scheme)
    }

    /// Parse a single header value.
    pub fn parse(value: &str) -> Vec<Challenge> {
        parse_www_authenticate([value])
    }

    fn insert(&mut self, name: String, value: String) {
        if self.parameters.contains_key(&name) {
            debug!(scheme = %self.scheme, parameter = %name, "Ignoring repeated challenge parameter");
            return;
        }
        self.parameters.insert(name, value);
    }
}

impl PartialEq for Challenge {
    fn eq(&self, other: &Self) -> bool {
        self.scheme.eq_ignore_ascii_case(&other.scheme) && self.parameters == other.parameters
    }
}

impl Hash for Challenge {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.scheme.to_ascii_lowercase().hash(state);
        self.parameters.len().hash(state);
    }
}

impl fmt::Display for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.scheme)?;
        for (idx, (name, value)) in self.parameters.iter().enumerate() {
            let sep = if idx == 0 { " " } else { ", " };
            let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
            write!(f, "{}{}=\"{}\"", sep, name, escaped)?;
        }
        Ok(())
    }
}

/// Parse every `WWW-Authenticate` value of a response. Multiple values are
/// treated as one comma-separated list, and server order is preserved.
pub fn parse_www_authenticate<I, S>(values: I) -> Vec<Challenge>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let joined = values
        .into_iter()
        .map(|v| v.as_ref().trim().to_string())
        .filter(|v| !v.is_empty())
        .collect::<Vec<_>>()
        .join(", ");

    let mut input = joined.as_str();
    let mut challenges = Vec::new();
    let mut current: Option<Challenge> = None;

    loop {
        skip_separators(&mut input);
        if input.is_empty() {
            break;
        }
        let start = input;

        if let Ok((name, value)) = param_element(&mut input) {
            match current.as_mut() {
                Some(challenge) => challenge.insert(name, value),
                None => debug!(parameter = %name, "Dropping parameter without a challenge scheme"),
            }
            continue;
        }
        input = start;

        match challenge_element(&mut input) {
            Ok(challenge) => {
                if let Some(done) = current.replace(challenge) {
                    challenges.push(done);
                }
            }
            Err(_) => {
                input = start;
                let skipped = skip_until(&mut input, |c| c == ',', false);
                debug!(element = %skipped, "Skipping malformed WWW-Authenticate element");
                if looks_like_challenge(start) {
                    if let Some(done) = current.take() {
                        challenges.push(done);
                    }
                }
            }
        }
    }

    if let Some(done) = current {
        challenges.push(done);
    }
    challenges
}

/// A comma-separated `auth-param` continuing the previous challenge.
fn param_element(input: &mut &str) -> ModalResult<(String, String)> {
    let pair = param(input, &[','])?;
    ows(input)?;
    if !(input.is_empty() || input.starts_with(',')) {
        return fail(input);
    }
    Ok(pair)
}

/// `scheme [ 1*SP ( token68 / auth-param ) ... ]` up to the next top-level comma.
fn challenge_element(input: &mut &str) -> ModalResult<Challenge> {
    let scheme = token(input)?;
    let mut challenge = Challenge::new(scheme);

    loop {
        let gap = ows(input)?;
        if input.is_empty() || input.starts_with(',') {
            break;
        }
        if gap.is_empty() {
            return fail(input);
        }

        let checkpoint = *input;
        if let Ok((name, value)) = param(input, &[',']) {
            challenge.insert(name, value);
            continue;
        }
        *input = checkpoint;

        if token68(input).is_ok() {
            continue;
        }
        *input = checkpoint;

        if input.starts_with(is_tchar) {
            let skipped = skip_until(input, |c| c == ',' || is_ws(c), false);
            debug!(scheme = %challenge.scheme, item = %skipped, "Skipping malformed challenge item");
            continue;
        }
        return fail(input);
    }

    Ok(challenge)
}

fn looks_like_challenge(element: &str) -> bool {
    let mut probe = element;
    token.parse_next(&mut probe).is_ok() && probe.starts_with(is_ws)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiple_challenges_in_order() {
        let challenges = Challenge::parse(
            r#"UMA as_uri="https://example.test", ticket=value, Bearer, DPoP algs="ES256 RS256""#,
        );
        assert_eq!(
            challenges,
            vec![
                Challenge::new("UMA")
                    .with_parameter("as_uri", "https://example.test")
                    .with_parameter("ticket", "value"),
                Challenge::new("Bearer"),
                Challenge::new("DPoP").with_parameter("algs", "ES256 RS256"),
            ]
        );
    }

    #[test]
    fn test_scheme_is_case_insensitive() {
        let upper = Challenge::parse(r#"UMA ticket="abc""#);
        let lower = Challenge::parse(r#"uma ticket="abc""#);
        assert_eq!(upper, lower);
        assert!(lower[0].is_scheme("UMA"));

        let other = Challenge::parse(r#"UMA ticket="ABC""#);
        assert_ne!(upper, other);
    }

    #[test]
    fn test_token68_is_tolerated() {
        let challenges = Challenge::parse(r#"Basic abcdef== realm=basic key="a value""#);
        assert_eq!(
            challenges,
            vec![Challenge::new("Basic")
                .with_parameter("realm", "basic")
                .with_parameter("key", "a value")]
        );
    }

    #[test]
    fn test_invalid_parameters_are_skipped() {
        let challenges = Challenge::parse("Basic realm==basic, UMA =not =valid");
        assert_eq!(challenges, vec![Challenge::new("Basic")]);
    }

    #[test]
    fn test_unparsable_header_is_empty() {
        assert!(Challenge::parse(r#"In=Valid realm="basic""#).is_empty());
        assert!(Challenge::parse("").is_empty());
        assert!(Challenge::parse(" , ,").is_empty());
    }

    #[test]
    fn test_unknown_schemes_are_kept() {
        let challenges = Challenge::parse(
            r#"Bearer, UMA as_uri="https://example.test", GNAP ticket=1234567890"#,
        );
        let schemes: Vec<_> = challenges.iter().map(Challenge::scheme).collect();
        assert_eq!(schemes, vec!["Bearer", "UMA", "GNAP"]);
        assert_eq!(challenges[2].parameter("ticket"), Some("1234567890"));
    }

    #[test]
    fn test_multiple_header_values_are_joined() {
        let challenges = parse_www_authenticate([
            r#"Bearer realm="solid""#,
            r#"UMA ticket="t", as_uri="https://as.example""#,
        ]);
        assert_eq!(challenges.len(), 2);
        assert_eq!(challenges[0].parameter("realm"), Some("solid"));
        assert_eq!(challenges[1].parameter("as_uri"), Some("https://as.example"));
    }

    #[test]
    fn test_first_parameter_occurrence_wins() {
        let challenges = Challenge::parse(r#"Bearer realm="a", realm="b""#);
        assert_eq!(challenges[0].parameter("realm"), Some("a"));
    }

    #[test]
    fn test_display_quotes_parameters() {
        let challenge = Challenge::new("UMA")
            .with_parameter("ticket", "t\"1")
            .with_parameter("as_uri", "https://as.example");
        assert_eq!(
            challenge.to_string(),
            r#"UMA ticket="t\"1", as_uri="https://as.example""#
        );
        assert_eq!(Challenge::parse(&challenge.to_string()), vec![challenge]);
    }
}
