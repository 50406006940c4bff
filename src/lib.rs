//! solid-auth library interface
//!
//! Reactive authorization for Solid clients: requests go out without
//! credentials, and a `401` carrying `WWW-Authenticate` challenges is
//! answered by negotiating a credential (an OpenID ID token, an UMA access
//! token, optionally DPoP-bound) and resending once.
//!
//! # Module Organization
//!
//! - [`headers`] - `WWW-Authenticate`, `WAC-Allow` and `Link` parsing
//! - [`auth`] - Credentials, authenticators and the scheme registry
//! - [`session`] - Identity, credential caching and single-flight refresh
//! - [`dpop`] - Proof keys and DPoP proof generation
//! - [`client`] - Transport seam and the reactive client
//! - [`config`] - TOML configuration
//! - [`errors`] - Error types (SolidAuthError, Result)
//! - [`status`] - Exit status codes (ExitStatus)
//! - [`core`] - Main execution logic of the CLI

pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod core;
pub mod dpop;
pub mod errors;
pub mod headers;
pub mod logging;
pub mod message;
pub mod session;
pub mod status;
