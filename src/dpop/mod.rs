//! DPoP proof generation (RFC 9449)
//!
//! A [`ProofGenerator`] holds one key pair per signing algorithm and signs a
//! fresh proof JWT for every request: new `jti`, current `iat`, and the
//! request's method and URI in `htm`/`htu`.

pub mod keys;

pub use keys::{ProofAlgorithm, ProofKeyPair};

use std::collections::BTreeSet;

use chrono::Utc;
use http::Method;
use indexmap::IndexMap;
use jsonwebtoken::Header;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;
use uuid::Uuid;

/// JWS `typ` of a DPoP proof
pub const PROOF_TYPE: &str = "dpop+jwt";

#[derive(Debug, Error)]
pub enum ProofError {
    #[error("unsupported proof algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("no proof key configured for thumbprint {0}")]
    UnknownThumbprint(String),

    #[error("DPoP credential is not bound to a proof key")]
    Unbound,

    #[error("invalid proof key: {0}")]
    InvalidKey(String),

    #[error("failed to read key file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to sign proof: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

/// Claims of a DPoP proof JWT.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProofClaims {
    pub jti: String,
    pub htm: String,
    pub htu: String,
    pub iat: i64,
}

pub trait ProofGenerator: Send + Sync {
    /// Algorithms a proof can be generated for.
    fn algorithms(&self) -> BTreeSet<String>;

    /// Sign a new proof for `method uri` with the key configured for
    /// `algorithm`. Fails for an algorithm without a key.
    fn generate_proof(&self, algorithm: &str, uri: &Url, method: &Method) -> Result<String, ProofError>;

    fn lookup_thumbprint(&self, algorithm: &str) -> Option<String>;

    fn lookup_algorithm(&self, thumbprint: &str) -> Option<String>;
}

/// Key-pair backed [`ProofGenerator`].
#[derive(Debug, Clone)]
pub struct DpopManager {
    keys: IndexMap<String, ProofKeyPair>,
}

impl DpopManager {
    /// A manager with a single freshly generated ES256 key.
    pub fn new() -> Result<Self, ProofError> {
        Self::with_keys(Vec::new())
    }

    /// A manager over the given keys, one per algorithm; a later key for
    /// the same algorithm replaces an earlier one. An empty set falls back
    /// to a generated ES256 key.
    pub fn with_keys(keys: impl IntoIterator<Item = ProofKeyPair>) -> Result<Self, ProofError> {
        let mut map = IndexMap::new();
        for key in keys {
            map.insert(key.algorithm().as_str().to_string(), key);
        }
        if map.is_empty() {
            let key = ProofKeyPair::generate(ProofAlgorithm::ES256)?;
            debug!(thumbprint = %key.thumbprint(), "Generated ES256 proof key");
            map.insert(key.algorithm().as_str().to_string(), key);
        }
        Ok(Self { keys: map })
    }

    pub fn key(&self, algorithm: &str) -> Option<&ProofKeyPair> {
        self.keys.get(algorithm)
    }
}

impl ProofGenerator for DpopManager {
    fn algorithms(&self) -> BTreeSet<String> {
        self.keys.keys().cloned().collect()
    }

    fn generate_proof(&self, algorithm: &str, uri: &Url, method: &Method) -> Result<String, ProofError> {
        let key = self
            .keys
            .get(algorithm)
            .ok_or_else(|| ProofError::UnsupportedAlgorithm(algorithm.to_string()))?;

        let mut htu = uri.clone();
        htu.set_fragment(None);

        let mut header = Header::new(key.algorithm().jwt_algorithm());
        header.typ = Some(PROOF_TYPE.to_string());
        header.jwk = Some(key.jwk().clone());

        let claims = ProofClaims {
            jti: Uuid::new_v4().to_string(),
            htm: method.as_str().to_string(),
            htu: htu.to_string(),
            iat: Utc::now().timestamp(),
        };

        Ok(jsonwebtoken::encode(&header, &claims, key.encoding_key())?)
    }

    fn lookup_thumbprint(&self, algorithm: &str) -> Option<String> {
        self.keys.get(algorithm).map(|k| k.thumbprint().to_string())
    }

    fn lookup_algorithm(&self, thumbprint: &str) -> Option<String> {
        self.keys
            .values()
            .find(|k| k.thumbprint() == thumbprint)
            .map(|k| k.algorithm().as_str().to_string())
    }
}
