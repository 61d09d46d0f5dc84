//! Coalescing metadata resolver.
//!
//! Concurrent lookups for the same key share one pending [`OnceCell`]; only the
//! caller that initializes it talks to the catalog. Every outcome, including a
//! permanent miss, is written to the cache so the key is never queried again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info, warn};
use rand::Rng;
use tokio::sync::OnceCell;

use super::cache::MetadataCache;
use super::catalog::{query_variants, CatalogClient, CatalogError, CatalogHit};
use super::{metadata_key, CatalogMetadata};
use crate::config::MetadataConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Upper bound of the random delay added to every backoff.
    pub jitter: Duration,
    /// Rounds over the full variant list, first round included.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&MetadataConfig::default())
    }
}

impl From<&MetadataConfig> for RetryPolicy {
    fn from(config: &MetadataConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            multiplier: config.backoff_multiplier,
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: Duration::from_millis(config.jitter_ms),
            max_attempts: config.max_attempts.max(1),
        }
    }
}

impl RetryPolicy {
    /// Backoff after the failed round `attempt` (1-based), before jitter.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let scaled_ms = self.base_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped_ms = scaled_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }

    pub fn delay_with_jitter(&self, attempt: u32) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let extra = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        self.backoff_delay(attempt) + Duration::from_millis(extra)
    }
}

enum RoundOutcome {
    Hit(CatalogHit),
    NoResults,
    Retry(CatalogError),
}

pub struct MetadataResolver {
    cache: Arc<dyn MetadataCache>,
    catalog: Arc<dyn CatalogClient>,
    retry: RetryPolicy,
    in_flight: Mutex<HashMap<String, Arc<OnceCell<CatalogMetadata>>>>,
}

impl MetadataResolver {
    pub fn new(
        cache: Arc<dyn MetadataCache>,
        catalog: Arc<dyn CatalogClient>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            cache,
            catalog,
            retry,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Cover and preview URLs for a song. Never fails; misses resolve to empty fields.
    pub async fn resolve_metadata(&self, artist: &str, title: &str) -> CatalogMetadata {
        let key = metadata_key(artist, title);
        if let Some(cached) = self.cached(&key).await {
            return cached;
        }

        let pending = self.pending_lookup(&key);
        let metadata = pending
            .get_or_init(|| async {
                // A previous lookup may have completed between the cache check and here.
                if let Some(cached) = self.cached(&key).await {
                    return cached;
                }
                let resolved = self.query_catalog(artist, title).await;
                self.remember(&key, &resolved).await;
                resolved
            })
            .await
            .clone();
        self.finish_lookup(&key, &pending);
        metadata
    }

    /// Resolves a batch concurrently; results are in input order.
    pub async fn resolve_many(self: &Arc<Self>, pairs: Vec<(String, String)>) -> Vec<CatalogMetadata> {
        let handles: Vec<_> = pairs
            .into_iter()
            .map(|(artist, title)| {
                let resolver = Arc::clone(self);
                tokio::spawn(async move { resolver.resolve_metadata(&artist, &title).await })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(metadata) => results.push(metadata),
                Err(error) => {
                    warn!("Metadata: lookup task failed: {}", error);
                    results.push(CatalogMetadata::miss());
                }
            }
        }
        results
    }

    /// Cache reads can hit SQLite, so they run on the blocking pool.
    async fn cached(&self, key: &str) -> Option<CatalogMetadata> {
        let cache = Arc::clone(&self.cache);
        let key = key.to_string();
        match tokio::task::spawn_blocking(move || cache.get(&key)).await {
            Ok(cached) => cached,
            Err(error) => {
                warn!("Metadata: cache read task failed: {}", error);
                None
            }
        }
    }

    async fn remember(&self, key: &str, metadata: &CatalogMetadata) {
        let cache = Arc::clone(&self.cache);
        let key = key.to_string();
        let metadata = metadata.clone();
        if let Err(error) = tokio::task::spawn_blocking(move || cache.put(&key, &metadata)).await {
            warn!("Metadata: cache write task failed: {}", error);
        }
    }

    /// Get-or-create the shared pending lookup for `key`.
    fn pending_lookup(&self, key: &str) -> Arc<OnceCell<CatalogMetadata>> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(
            in_flight
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new())),
        )
    }

    fn finish_lookup(&self, key: &str, pending: &Arc<OnceCell<CatalogMetadata>>) {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if in_flight
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, pending))
        {
            in_flight.remove(key);
        }
    }

    async fn query_catalog(&self, artist: &str, title: &str) -> CatalogMetadata {
        let variants = query_variants(artist, title);
        if variants.is_empty() {
            return CatalogMetadata::miss();
        }

        for attempt in 1..=self.retry.max_attempts {
            match self.search_variants(&variants).await {
                RoundOutcome::Hit(hit) => return CatalogMetadata::from(hit),
                RoundOutcome::NoResults => {
                    info!("Metadata: no catalog match for '{} - {}'", artist, title);
                    return CatalogMetadata::miss();
                }
                RoundOutcome::Retry(error) if attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_with_jitter(attempt);
                    debug!(
                        "Metadata: {} for '{} - {}'; retrying in {}ms (attempt {}/{})",
                        error,
                        artist,
                        title,
                        delay.as_millis(),
                        attempt + 1,
                        self.retry.max_attempts
                    );
                    tokio::time::sleep(delay).await;
                }
                RoundOutcome::Retry(error) => {
                    warn!(
                        "Metadata: giving up on '{} - {}' after {} attempts: {}",
                        artist, title, attempt, error
                    );
                }
            }
        }
        CatalogMetadata::miss()
    }

    async fn search_variants(&self, variants: &[String]) -> RoundOutcome {
        for variant in variants {
            let catalog = Arc::clone(&self.catalog);
            let query = variant.clone();
            match tokio::task::spawn_blocking(move || catalog.search(&query)).await {
                Ok(Ok(Some(hit))) => return RoundOutcome::Hit(hit),
                Ok(Ok(None)) => {}
                Ok(Err(error)) if error.is_retryable() => return RoundOutcome::Retry(error),
                Ok(Err(error)) => {
                    warn!("Metadata: query '{}' failed: {}", variant, error);
                }
                Err(error) => {
                    warn!("Metadata: query '{}' task failed: {}", variant, error);
                }
            }
        }
        RoundOutcome::NoResults
    }
}
