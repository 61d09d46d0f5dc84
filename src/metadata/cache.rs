//! Metadata cache tiers.
//!
//! Cache failures never reach callers: a tier that cannot be read behaves like a
//! miss and a failed write is logged.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::{debug, warn};

use super::CatalogMetadata;
use crate::db_manager::DbManager;
use crate::model::now_unix_ms;

pub trait MetadataCache: Send + Sync {
    fn get(&self, key: &str) -> Option<CatalogMetadata>;
    fn put(&self, key: &str, metadata: &CatalogMetadata);
    fn has(&self, key: &str) -> bool;
}

/// In-process tier.
#[derive(Default)]
pub struct MemoryMetadataCache {
    entries: Mutex<HashMap<String, CatalogMetadata>>,
}

impl MemoryMetadataCache {
    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MetadataCache for MemoryMetadataCache {
    fn get(&self, key: &str) -> Option<CatalogMetadata> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn put(&self, key: &str, metadata: &CatalogMetadata) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), metadata.clone());
        }
    }

    fn has(&self, key: &str) -> bool {
        self.entries
            .lock()
            .map(|entries| entries.contains_key(key))
            .unwrap_or(false)
    }
}

/// Durable tier backed by the `catalog_metadata` table.
pub struct SqliteMetadataCache {
    db: Arc<Mutex<DbManager>>,
}

impl SqliteMetadataCache {
    pub fn new(db: Arc<Mutex<DbManager>>) -> Self {
        Self { db }
    }

    /// Removes cached misses so the next lookup queries the catalog again.
    pub fn clear_negative_entries(&self) -> Result<usize, String> {
        let db = self
            .db
            .lock()
            .map_err(|_| "database lock poisoned".to_string())?;
        db.clear_negative_metadata()
            .map_err(|error| error.to_string())
    }

    fn with_db<T>(&self, operation: impl FnOnce(&DbManager) -> Result<T, rusqlite::Error>) -> Option<T> {
        let db = match self.db.lock() {
            Ok(db) => db,
            Err(_) => {
                warn!("Metadata cache: database lock poisoned");
                return None;
            }
        };
        match operation(&db) {
            Ok(value) => Some(value),
            Err(error) => {
                warn!("Metadata cache: database operation failed: {}", error);
                None
            }
        }
    }
}

impl MetadataCache for SqliteMetadataCache {
    fn get(&self, key: &str) -> Option<CatalogMetadata> {
        self.with_db(|db| db.get_metadata(key)).flatten()
    }

    fn put(&self, key: &str, metadata: &CatalogMetadata) {
        let _ = self.with_db(|db| db.put_metadata(key, metadata, now_unix_ms()));
    }

    fn has(&self, key: &str) -> bool {
        self.with_db(|db| db.has_metadata(key)).unwrap_or(false)
    }
}

/// Tiers consulted in order; a hit back-fills every tier above it.
pub struct TieredMetadataCache {
    tiers: Vec<Arc<dyn MetadataCache>>,
}

impl TieredMetadataCache {
    pub fn new(tiers: Vec<Arc<dyn MetadataCache>>) -> Self {
        Self { tiers }
    }
}

impl MetadataCache for TieredMetadataCache {
    fn get(&self, key: &str) -> Option<CatalogMetadata> {
        for (depth, tier) in self.tiers.iter().enumerate() {
            if let Some(metadata) = tier.get(key) {
                if depth > 0 {
                    debug!("Metadata cache: '{}' found in tier {}", key, depth);
                }
                for upper in &self.tiers[..depth] {
                    upper.put(key, &metadata);
                }
                return Some(metadata);
            }
        }
        None
    }

    fn put(&self, key: &str, metadata: &CatalogMetadata) {
        for tier in &self.tiers {
            tier.put(key, metadata);
        }
    }

    fn has(&self, key: &str) -> bool {
        self.tiers.iter().any(|tier| tier.has(key))
    }
}
