//! Credential storage for sessions
//!
//! [`CredentialCache`] holds negotiated credentials per request URI.
//! [`CredentialSlot`] holds the one long-lived credential and serializes
//! its refresh.

use std::future::Future;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use chrono::Utc;
use moka::sync::Cache;
use moka::Expiry;
use tracing::debug;
use url::Url;

use crate::auth::{AuthError, Credential};

/// Evicts each entry when its credential expires, or after `ttl`.
struct CredentialExpiry {
    ttl: Duration,
}

impl Expiry<String, Credential> for CredentialExpiry {
    fn expire_after_create(&self, _key: &String, value: &Credential, _created_at: Instant) -> Option<Duration> {
        let remaining = (value.expiration() - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        Some(remaining.min(self.ttl))
    }
}

/// Bounded, time-expiring map from normalized request URI to credential.
///
/// Writers to the same key race and the last one wins. Expiration is
/// checked again on every read, so eviction timing never matters for
/// correctness.
#[derive(Clone)]
pub struct CredentialCache {
    entries: Cache<String, Credential>,
}

impl CredentialCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .expire_after(CredentialExpiry { ttl })
            .build();
        Self { entries }
    }

    /// Cache key: the URI without its fragment.
    pub fn key(uri: &Url) -> String {
        let mut uri = uri.clone();
        uri.set_fragment(None);
        uri.into()
    }

    pub fn get(&self, uri: &Url) -> Option<Credential> {
        let key = Self::key(uri);
        let credential = self.entries.get(&key)?;
        if credential.is_expired() {
            debug!(uri = %key, "Dropping expired cached credential");
            self.entries.invalidate(&key);
            return None;
        }
        Some(credential)
    }

    pub fn put(&self, uri: &Url, credential: Credential) {
        let key = Self::key(uri);
        debug!(uri = %key, scheme = %credential.scheme(), "Caching negotiated credential");
        self.entries.insert(key, credential);
    }

    pub fn clear(&self) {
        self.entries.invalidate_all();
    }
}

impl Default for CredentialCache {
    fn default() -> Self {
        Self::new(1000, Duration::from_secs(300))
    }
}

#[derive(Default)]
struct SlotState {
    credential: Option<Credential>,
    generation: u64,
    last_failure: Option<String>,
}

/// The long-lived credential of a session, refreshed single-flight.
///
/// Callers that find the slot expired queue on one async mutex. The first
/// one runs the refresh; everyone who queued behind it observes that same
/// outcome instead of refreshing again.
#[derive(Default)]
pub struct CredentialSlot {
    state: RwLock<SlotState>,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl CredentialSlot {
    pub fn new(initial: Option<Credential>) -> Self {
        Self {
            state: RwLock::new(SlotState {
                credential: initial,
                ..SlotState::default()
            }),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// The stored credential even when expired.
    pub fn last(&self) -> Option<Credential> {
        self.read().credential.clone()
    }

    pub async fn get_or_refresh<F, Fut>(&self, refresh: F) -> Result<Option<Credential>, AuthError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<Credential>, AuthError>>,
    {
        let generation = {
            let state = self.read();
            if let Some(credential) = state.credential.as_ref().filter(|c| !c.is_expired()) {
                return Ok(Some(credential.clone()));
            }
            state.generation
        };

        let _guard = self.refresh_lock.lock().await;

        {
            let state = self.read();
            if state.generation != generation {
                debug!("Observed concurrent credential refresh");
                if let Some(failure) = &state.last_failure {
                    return Err(AuthError::Refresh(failure.clone()));
                }
                return Ok(state.credential.as_ref().filter(|c| !c.is_expired()).cloned());
            }
        }

        debug!("Refreshing long-lived credential");
        let outcome = refresh().await;

        let mut state = self.write();
        state.generation += 1;
        match outcome {
            Ok(credential) => {
                state.last_failure = None;
                state.credential = credential;
                let fresh = state.credential.as_ref().filter(|c| !c.is_expired()).cloned();
                if fresh.is_none() {
                    debug!("Refresh produced no usable credential");
                }
                Ok(fresh)
            }
            Err(err) => {
                state.last_failure = Some(err.to_string());
                Err(err)
            }
        }
    }

    pub fn clear(&self) {
        let mut state = self.write();
        state.credential = None;
        state.last_failure = None;
        state.generation += 1;
    }

    fn read(&self) -> RwLockReadGuard<'_, SlotState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, SlotState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}
