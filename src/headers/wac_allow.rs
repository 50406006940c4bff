//! `WAC-Allow` access modes
//!
//! `WAC-Allow: user="read write", public="read"` lists, per audience, the
//! access modes the server grants on the resource.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use super::lexer::{ows, param, skip_separators, skip_until};

/// Access modes keyed by audience (`user`, `public`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WacAllow {
    access: BTreeMap<String, BTreeSet<String>>,
}

impl WacAllow {
    /// Parse a single header value.
    pub fn parse(value: &str) -> Self {
        parse_wac_allow([value])
    }

    pub fn modes(&self, audience: &str) -> Option<&BTreeSet<String>> {
        self.access.get(audience)
    }

    pub fn allows(&self, audience: &str, mode: &str) -> bool {
        self.access
            .get(audience)
            .is_some_and(|modes| modes.iter().any(|m| m.eq_ignore_ascii_case(mode)))
    }

    pub fn audiences(&self) -> impl Iterator<Item = &str> {
        self.access.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.access.is_empty()
    }

    pub fn as_map(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.access
    }

    pub fn into_map(self) -> BTreeMap<String, BTreeSet<String>> {
        self.access
    }

    fn merge(&mut self, audience: String, modes: &str) {
        let modes: BTreeSet<String> = modes.split_whitespace().map(str::to_string).collect();
        if modes.is_empty() {
            return;
        }
        self.access.entry(audience).or_default().extend(modes);
    }
}

/// Parse every `WAC-Allow` value of a response, merging audiences that
/// appear more than once. An all-whitespace mode list adds no entry.
pub fn parse_wac_allow<I, S>(values: I) -> WacAllow
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut result = WacAllow::default();

    for value in values {
        let mut input = strip_header_name(value.as_ref().trim());
        loop {
            skip_separators(&mut input);
            if input.is_empty() {
                break;
            }
            let start = input;
            match access_param(&mut input) {
                Some((audience, modes)) => result.merge(audience, &modes),
                None => {
                    input = start;
                    let skipped = skip_until(&mut input, |c| c == ',', false);
                    debug!(element = %skipped, "Skipping malformed WAC-Allow element");
                }
            }
        }
    }

    result
}

fn access_param(input: &mut &str) -> Option<(String, String)> {
    let pair = param(input, &[',']).ok()?;
    ows(input).ok()?;
    if input.is_empty() || input.starts_with(',') {
        Some(pair)
    } else {
        None
    }
}

fn strip_header_name(value: &str) -> &str {
    const NAME: &str = "wac-allow:";
    match value.get(..NAME.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(NAME) => value[NAME.len()..].trim_start(),
        _ => value,
    }
}
