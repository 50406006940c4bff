//! Parsers for the authorization-related response headers
//!
//! - [`challenge`] - `WWW-Authenticate` challenges
//! - [`wac_allow`] - `WAC-Allow` access modes
//! - [`link`] - `Link` relations
//!
//! All three are tolerant: malformed elements are logged at debug level and
//! skipped, and a header that cannot be parsed at all yields an empty result.

mod lexer;

pub mod challenge;
pub mod link;
pub mod wac_allow;

pub use challenge::{parse_www_authenticate, Challenge};
pub use link::{parse_link, Link};
pub use wac_allow::{parse_wac_allow, WacAllow};

use http::header::{HeaderMap, HeaderName};
use tracing::debug;

pub const WAC_ALLOW: &str = "wac-allow";
pub const DPOP: &str = "dpop";

/// All values of `name`, in the order they were received. Values that are
/// not visible ASCII are skipped.
pub fn header_values<'a, K>(headers: &'a HeaderMap, name: K) -> Vec<&'a str>
where
    K: Into<HeaderName>,
{
    let name = name.into();
    headers
        .get_all(&name)
        .iter()
        .filter_map(|value| match value.to_str() {
            Ok(v) => Some(v),
            Err(_) => {
                debug!(header = %name, "Skipping non-ASCII header value");
                None
            }
        })
        .collect()
}
