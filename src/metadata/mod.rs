//! Artwork and preview enrichment for leaderboard rows.
//!
//! Lookups go through a tiered cache and, on a miss, a coalescing resolver that
//! queries the external catalog with backoff. Misses are cached like hits.

pub mod cache;
pub mod catalog;
pub mod resolver;

use serde::{Deserialize, Serialize};

pub use cache::{MemoryMetadataCache, MetadataCache, SqliteMetadataCache, TieredMetadataCache};
pub use catalog::{CatalogClient, CatalogError, CatalogHit, ItunesCatalog};
pub use resolver::{MetadataResolver, RetryPolicy};

/// Resolved presentation metadata for one song. Both fields empty is a cached miss.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogMetadata {
    pub cover_url: Option<String>,
    pub preview_url: Option<String>,
}

impl CatalogMetadata {
    pub fn miss() -> Self {
        Self::default()
    }

    pub fn is_miss(&self) -> bool {
        self.cover_url.is_none() && self.preview_url.is_none()
    }
}

impl From<CatalogHit> for CatalogMetadata {
    fn from(hit: CatalogHit) -> Self {
        Self {
            cover_url: hit.artwork_url,
            preview_url: hit.preview_url,
        }
    }
}

/// Normalized `"artist|title"` cache key.
pub fn metadata_key(artist: &str, title: &str) -> String {
    format!("{}|{}", normalize_key_part(artist), normalize_key_part(title))
}

fn normalize_key_part(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
