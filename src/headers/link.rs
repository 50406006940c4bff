//! `Link` headers (RFC 8288)
//!
//! Targets are kept as the URI-references the server sent. Relative
//! references, IRIs and non-HTTP schemes (`urn:`, `did:`, `file:`) are
//! accepted; a target with characters no URI-reference may contain
//! invalidates its whole link-value instead of being percent-encoded.

use indexmap::IndexMap;
use tracing::debug;
use url::Url;
use winnow::combinator::fail;
use winnow::prelude::*;
use winnow::token::take_while;
use winnow::ModalResult;

use super::lexer::{is_ws, ows, param, skip_until};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    uri: String,
    parameters: IndexMap<String, String>,
}

impl Link {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            parameters: IndexMap::new(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.entry(name.into()).or_insert(value.into());
        self
    }

    /// The target URI-reference, exactly as sent.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn parameters(&self) -> &IndexMap<String, String> {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    /// Whether the space-separated `rel` parameter contains `rel`.
    pub fn has_rel(&self, rel: &str) -> bool {
        self.parameter("rel")
            .is_some_and(|rels| rels.split_whitespace().any(|r| r.eq_ignore_ascii_case(rel)))
    }

    /// Resolve the target against the URI of the response carrying it.
    pub fn resolve(&self, base: &Url) -> Result<Url, url::ParseError> {
        base.join(&self.uri)
    }

    /// Parse a single header value.
    pub fn parse(value: &str) -> Vec<Link> {
        parse_link([value])
    }
}

/// Parse every `Link` value of a response, preserving server order.
pub fn parse_link<I, S>(values: I) -> Vec<Link>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut links = Vec::new();

    for value in values {
        let mut input = value.as_ref();
        loop {
            input = input.trim_start_matches(|c: char| c == ',' || is_ws(c));
            if input.is_empty() {
                break;
            }
            let start = input;
            match link_value(&mut input) {
                Ok(link) => links.push(link),
                Err(_) => {
                    input = start;
                    let skipped = skip_until(&mut input, |c| c == ',', true);
                    debug!(element = %skipped, "Skipping malformed Link element");
                }
            }
        }
    }

    links
}

/// `"<" URI-Reference ">" *( OWS ";" OWS link-param )`
fn link_value(input: &mut &str) -> ModalResult<Link> {
    '<'.parse_next(input)?;
    let target = take_while(0.., is_uri_char).parse_next(input)?;
    '>'.parse_next(input)?;
    if !is_uri_reference(target) {
        return fail(input);
    }
    let mut link = Link::new(target);

    loop {
        ows(input)?;
        if input.is_empty() || input.starts_with(',') {
            break;
        }
        ';'.parse_next(input)?;
        ows(input)?;
        if input.is_empty() || input.starts_with([';', ',']) {
            continue;
        }

        let checkpoint = *input;
        match param(input, &[';', ',']) {
            Ok((name, value)) => {
                if link.parameters.contains_key(&name) {
                    debug!(uri = %link.uri, parameter = %name, "Ignoring repeated link parameter");
                } else {
                    link.parameters.insert(name, value);
                }
            }
            Err(_) => {
                *input = checkpoint;
                let skipped = skip_until(input, |c| c == ';' || c == ',', false);
                debug!(uri = %link.uri, parameter = %skipped, "Skipping malformed link parameter");
            }
        }
    }

    Ok(link)
}

/// Characters a URI-reference (or IRI-reference) may contain unescaped.
fn is_uri_char(c: char) -> bool {
    if c.is_ascii() {
        c.is_ascii_alphanumeric()
            || matches!(
                c,
                '-' | '.' | '_' | '~' | ':' | '/' | '?' | '#' | '[' | ']' | '@' | '!' | '$' | '&'
                    | '\'' | '(' | ')' | '*' | '+' | ',' | ';' | '=' | '%'
            )
    } else {
        !c.is_control() && !c.is_whitespace()
    }
}

/// Structural checks on top of the character set: non-empty, well-formed
/// percent escapes, and a valid scheme when one is present.
fn is_uri_reference(target: &str) -> bool {
    if target.is_empty() {
        return false;
    }

    let bytes = target.as_bytes();
    let mut idx = 0;
    while idx < bytes.len() {
        if bytes[idx] == b'%' {
            let hex = bytes.get(idx + 1..idx + 3);
            if !hex.is_some_and(|h| h.iter().all(u8::is_ascii_hexdigit)) {
                return false;
            }
            idx += 3;
        } else {
            idx += 1;
        }
    }

    let head_end = target.find(['/', '?', '#']).unwrap_or(target.len());
    match target[..head_end].find(':') {
        Some(colon) => is_scheme(&target[..colon]),
        None => true,
    }
}

fn is_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}
