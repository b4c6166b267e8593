//! Provider JWKS fetching and caching.
//!
//! Responsibility:
//! - Fetch a provider's public key set over HTTP with a bounded timeout
//! - Cache per JWKS URL with a TTL; fresh reads never touch the network
//! - Single-flight refresh: N concurrent callers for the same stale URL
//!   cause exactly one fetch
//! - `invalidate` drops an entry so the verifier can absorb key rotation
//!   with one refetch
//!
//! Failure handling is fail-closed: after a failed fetch the previous
//! (stale) material is never served, so outdated keys cannot silently keep
//! validating tokens.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyResolutionError {
    #[error("jwks fetch failed: {0}")]
    Fetch(String),

    #[error("jwks endpoint returned HTTP {0}")]
    Status(u16),

    #[error("jwks body malformed: {0}")]
    Parse(String),
}

/// Network capability behind the cache, injectable so tests can count
/// fetches and serve canned key sets.
#[async_trait]
pub trait KeyFetcher: Send + Sync {
    async fn fetch_keys(&self, jwks_url: &str) -> Result<JwkSet, KeyResolutionError>;
}

/// reqwest-backed fetcher. The timeout bounds the whole request; a timeout
/// fails the resolution exactly like any other fetch error.
pub struct HttpKeyFetcher {
    client: reqwest::Client,
}

impl HttpKeyFetcher {
    pub fn new(timeout: Duration) -> Result<Self, KeyResolutionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KeyResolutionError::Fetch(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl KeyFetcher for HttpKeyFetcher {
    async fn fetch_keys(&self, jwks_url: &str) -> Result<JwkSet, KeyResolutionError> {
        let response = self
            .client
            .get(jwks_url)
            .send()
            .await
            .map_err(|e| KeyResolutionError::Fetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(KeyResolutionError::Status(response.status().as_u16()));
        }

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| KeyResolutionError::Parse(e.to_string()))
    }
}

/// Immutable view of one fetched key set. Readers share it via `Arc`, so a
/// concurrent refresh never mutates what a verification in progress sees.
pub struct KeySnapshot {
    keys: HashMap<String, Jwk>,
    fetched_at: Instant,
}

impl KeySnapshot {
    fn from_jwk_set(set: JwkSet, fetched_at: Instant) -> Self {
        let mut keys = HashMap::new();
        for jwk in set.keys {
            // Keys without a kid cannot be addressed by a token header.
            if let Some(kid) = jwk.common.key_id.clone() {
                keys.insert(kid, jwk);
            }
        }
        Self { keys, fetched_at }
    }

    pub fn key(&self, kid: &str) -> Option<&Jwk> {
        self.keys.get(kid)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

struct CacheSlot {
    /// Serializes refreshes for this URL only; unrelated providers fetch in
    /// parallel.
    refresh: tokio::sync::Mutex<()>,
    current: RwLock<Option<Arc<KeySnapshot>>>,
}

impl CacheSlot {
    fn new() -> Self {
        Self {
            refresh: tokio::sync::Mutex::new(()),
            current: RwLock::new(None),
        }
    }

    fn fresh(&self, ttl: Duration) -> Option<Arc<KeySnapshot>> {
        let current = self.current.read().expect("jwks slot lock poisoned");
        current
            .as_ref()
            .filter(|s| s.fetched_at.elapsed() <= ttl)
            .cloned()
    }
}

pub struct JwksCache {
    ttl: Duration,
    fetcher: Arc<dyn KeyFetcher>,
    slots: RwLock<HashMap<String, Arc<CacheSlot>>>,
}

impl JwksCache {
    pub fn new(fetcher: Arc<dyn KeyFetcher>, ttl: Duration) -> Self {
        Self {
            ttl,
            fetcher,
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Return a fresh key set for `jwks_url`, fetching if the cached entry
    /// is missing or older than the TTL.
    pub async fn resolve(&self, jwks_url: &str) -> Result<Arc<KeySnapshot>, KeyResolutionError> {
        let slot = self.slot(jwks_url);

        if let Some(snapshot) = slot.fresh(self.ttl) {
            return Ok(snapshot);
        }

        // Single-flight: only one caller per URL performs the fetch; the
        // rest wait here and pick up the refreshed snapshot below.
        let _refresh = slot.refresh.lock().await;
        if let Some(snapshot) = slot.fresh(self.ttl) {
            return Ok(snapshot);
        }

        let fetched_at = Instant::now();
        let set = self.fetcher.fetch_keys(jwks_url).await?;
        let snapshot = Arc::new(KeySnapshot::from_jwk_set(set, fetched_at));

        let mut current = slot.current.write().expect("jwks slot lock poisoned");
        // Last-fetch-wins: never regress to an older fetch.
        let newer_exists = current
            .as_ref()
            .is_some_and(|existing| existing.fetched_at > snapshot.fetched_at);
        if !newer_exists {
            *current = Some(Arc::clone(&snapshot));
        }

        Ok(snapshot)
    }

    /// Drop the cached entry so the next `resolve` refetches. Called by the
    /// verifier after a signature failure with an unrecognized key id.
    pub fn invalidate(&self, jwks_url: &str) {
        let slots = self.slots.read().expect("jwks cache lock poisoned");
        if let Some(slot) = slots.get(jwks_url) {
            let mut current = slot.current.write().expect("jwks slot lock poisoned");
            *current = None;
        }
    }

    fn slot(&self, jwks_url: &str) -> Arc<CacheSlot> {
        if let Some(slot) = self
            .slots
            .read()
            .expect("jwks cache lock poisoned")
            .get(jwks_url)
        {
            return Arc::clone(slot);
        }

        let mut slots = self.slots.write().expect("jwks cache lock poisoned");
        Arc::clone(
            slots
                .entry(jwks_url.to_string())
                .or_insert_with(|| Arc::new(CacheSlot::new())),
        )
    }
}
