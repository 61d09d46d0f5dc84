//! Whole-snapshot cache in front of the ingestion pipeline.
//!
//! A stored snapshot younger than the TTL is served as is. Otherwise one
//! ingestion run rebuilds it; if that run fails the previous snapshot keeps
//! being served.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, warn};

use crate::db_manager::DbManager;
use crate::ingest::{run_ingestion, IngestionError};
use crate::model::{now_unix_ms, LeaderboardSnapshot};
use crate::scoring::ScoringPolicy;
use crate::source::DocumentSource;

/// Durable slot holding the latest snapshot.
pub trait SnapshotStore: Send + Sync {
    fn load(&self) -> Result<Option<LeaderboardSnapshot>, String>;
    /// Replaces the stored snapshot as a whole.
    fn save(&self, snapshot: &LeaderboardSnapshot) -> Result<(), String>;
}

pub struct SqliteSnapshotStore {
    db: Arc<Mutex<DbManager>>,
}

impl SqliteSnapshotStore {
    pub fn new(db: Arc<Mutex<DbManager>>) -> Self {
        Self { db }
    }

    fn db(&self) -> Result<MutexGuard<'_, DbManager>, String> {
        self.db
            .lock()
            .map_err(|_| "database lock poisoned".to_string())
    }
}

impl SnapshotStore for SqliteSnapshotStore {
    fn load(&self) -> Result<Option<LeaderboardSnapshot>, String> {
        self.db()?.load_snapshot().map_err(|error| error.to_string())
    }

    fn save(&self, snapshot: &LeaderboardSnapshot) -> Result<(), String> {
        self.db()?
            .save_snapshot(snapshot)
            .map_err(|error| error.to_string())
    }
}

#[derive(Default)]
pub struct MemorySnapshotStore {
    slot: Mutex<Option<LeaderboardSnapshot>>,
}

impl MemorySnapshotStore {
    pub fn with_snapshot(snapshot: LeaderboardSnapshot) -> Self {
        Self {
            slot: Mutex::new(Some(snapshot)),
        }
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self) -> Result<Option<LeaderboardSnapshot>, String> {
        self.slot
            .lock()
            .map(|slot| slot.clone())
            .map_err(|_| "snapshot slot lock poisoned".to_string())
    }

    fn save(&self, snapshot: &LeaderboardSnapshot) -> Result<(), String> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| "snapshot slot lock poisoned".to_string())?;
        *slot = Some(snapshot.clone());
        Ok(())
    }
}

pub struct SnapshotCache {
    store: Arc<dyn SnapshotStore>,
    source: Arc<dyn DocumentSource>,
    policy: ScoringPolicy,
    ttl: Duration,
    /// Held for the duration of an ingestion run.
    run_guard: Mutex<()>,
}

impl SnapshotCache {
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        source: Arc<dyn DocumentSource>,
        policy: ScoringPolicy,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            source,
            policy,
            ttl,
            run_guard: Mutex::new(()),
        }
    }

    /// Serves the stored snapshot while fresh, rebuilding it otherwise.
    pub fn get_leaderboard(&self) -> Result<LeaderboardSnapshot, IngestionError> {
        if let Ok(Some(snapshot)) = self.store.load() {
            if snapshot.is_fresh(now_unix_ms(), self.ttl) {
                debug!("Snapshot cache: serving fresh snapshot");
                return Ok(snapshot);
            }
        }

        let _run = self.lock_run_guard();
        // Another caller may have finished a run while we waited.
        let stored = self.store.load();
        if let Ok(Some(snapshot)) = &stored {
            if snapshot.is_fresh(now_unix_ms(), self.ttl) {
                debug!("Snapshot cache: snapshot rebuilt by a concurrent run");
                return Ok(snapshot.clone());
            }
        }

        match self.run_and_store() {
            Ok(snapshot) => Ok(snapshot),
            Err(run_error) => match stored {
                Ok(Some(stale)) => {
                    warn!(
                        "Snapshot cache: ingestion failed ({}); serving snapshot built at {}",
                        run_error, stale.built_at
                    );
                    Ok(stale)
                }
                Ok(None) => Err(run_error),
                Err(read_error) => Err(IngestionError::Storage(format!(
                    "{read_error}; ingestion also failed: {run_error}"
                ))),
            },
        }
    }

    /// Rebuilds regardless of freshness. Failures are returned and leave the stored
    /// snapshot untouched.
    pub fn refresh(&self) -> Result<LeaderboardSnapshot, IngestionError> {
        let _run = self.lock_run_guard();
        self.run_and_store()
    }

    pub fn stored_snapshot(&self) -> Result<Option<LeaderboardSnapshot>, IngestionError> {
        self.store.load().map_err(IngestionError::Storage)
    }

    fn lock_run_guard(&self) -> MutexGuard<'_, ()> {
        self.run_guard
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn run_and_store(&self) -> Result<LeaderboardSnapshot, IngestionError> {
        info!("Snapshot cache: running ingestion");
        let snapshot = run_ingestion(self.source.as_ref(), &self.policy)?;
        if let Err(error) = self.store.save(&snapshot) {
            warn!("Snapshot cache: failed to persist snapshot: {}", error);
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::{MemorySnapshotStore, SnapshotCache, SnapshotStore, SqliteSnapshotStore};
    use crate::db_manager::DbManager;
    use crate::ingest::tests::grid_markup;
    use crate::ingest::IngestionError;
    use crate::model::{now_unix_ms, LeaderboardSnapshot};
    use crate::scoring::ScoringPolicy;
    use crate::source::DocumentSource;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);
    const HOUR_MS: i64 = 60 * 60 * 1000;

    struct FakeSource {
        response: Mutex<Result<String, IngestionError>>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl FakeSource {
        fn serving(markup: String) -> Arc<Self> {
            Arc::new(Self {
                response: Mutex::new(Ok(markup)),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                response: Mutex::new(Err(IngestionError::SourceUnavailable(
                    "HTTP 503".to_string(),
                ))),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl DocumentSource for FakeSource {
        fn fetch_markup(&self) -> Result<String, IngestionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            self.response.lock().expect("response lock").clone()
        }
    }

    fn markup() -> String {
        let editions: Vec<u16> = (1999..=2020).collect();
        grid_markup(&editions, 6, 6)
    }

    fn stored(built_at: i64) -> LeaderboardSnapshot {
        LeaderboardSnapshot {
            built_at,
            effective_cutoff_year: 1999,
            entries: Vec::new(),
        }
    }

    fn cache(store: Arc<dyn SnapshotStore>, source: Arc<FakeSource>) -> SnapshotCache {
        SnapshotCache::new(store, source, ScoringPolicy::default(), DAY)
    }

    #[test]
    fn test_cold_start_runs_once_then_serves_cached_snapshot() {
        let source = FakeSource::serving(markup());
        let store = Arc::new(MemorySnapshotStore::default());
        let cache = cache(store.clone(), source.clone());

        let first = cache.get_leaderboard().expect("first read should ingest");
        let second = cache.get_leaderboard().expect("second read should hit cache");
        assert_eq!(source.calls(), 1);
        assert_eq!(first, second);
        assert_eq!(first.entries.len(), 6);
        assert_eq!(store.load().expect("load"), Some(first));
    }

    #[test]
    fn test_fresh_stored_snapshot_skips_ingestion() {
        let source = FakeSource::serving(markup());
        let store = Arc::new(MemorySnapshotStore::with_snapshot(stored(
            now_unix_ms() - HOUR_MS,
        )));
        let snapshot = cache(store, source.clone())
            .get_leaderboard()
            .expect("fresh snapshot");
        assert_eq!(source.calls(), 0);
        assert!(snapshot.entries.is_empty());
    }

    #[test]
    fn test_expired_snapshot_is_rebuilt() {
        let source = FakeSource::serving(markup());
        let store = Arc::new(MemorySnapshotStore::with_snapshot(stored(
            now_unix_ms() - 25 * HOUR_MS,
        )));
        let snapshot = cache(store, source.clone())
            .get_leaderboard()
            .expect("rebuilt snapshot");
        assert_eq!(source.calls(), 1);
        assert_eq!(snapshot.entries.len(), 6);
    }

    #[test]
    fn test_failed_run_serves_stale_snapshot() {
        let stale = stored(now_unix_ms() - 48 * HOUR_MS);
        let store = Arc::new(MemorySnapshotStore::with_snapshot(stale.clone()));
        let source = FakeSource::failing();
        let served = cache(store, source.clone())
            .get_leaderboard()
            .expect("stale snapshot should be served");
        assert_eq!(served, stale);
        assert_eq!(source.calls(), 1);
    }

    #[test]
    fn test_failed_run_without_snapshot_surfaces_error() {
        let store = Arc::new(MemorySnapshotStore::default());
        let result = cache(store, FakeSource::failing()).get_leaderboard();
        assert_eq!(
            result,
            Err(IngestionError::SourceUnavailable("HTTP 503".to_string()))
        );
    }

    #[test]
    fn test_refresh_ignores_freshness_and_surfaces_errors() {
        let fresh = stored(now_unix_ms());
        let store = Arc::new(MemorySnapshotStore::with_snapshot(fresh.clone()));
        let source = FakeSource::serving(markup());
        let cache = cache(store.clone(), source.clone());

        let rebuilt = cache.refresh().expect("refresh should ingest");
        assert_eq!(source.calls(), 1);
        assert_eq!(rebuilt.entries.len(), 6);

        *source.response.lock().expect("response lock") =
            Err(IngestionError::NoQualifyingTable);
        assert_eq!(cache.refresh(), Err(IngestionError::NoQualifyingTable));
        assert_eq!(store.load().expect("load"), Some(rebuilt));
    }

    #[test]
    fn test_concurrent_cold_starts_run_ingestion_once() {
        let source = Arc::new(FakeSource {
            response: Mutex::new(Ok(markup())),
            delay: Duration::from_millis(50),
            calls: AtomicUsize::new(0),
        });
        let cache = cache(Arc::new(MemorySnapshotStore::default()), source.clone());

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| cache.get_leaderboard()))
                .collect();
            for handle in handles {
                let snapshot = handle
                    .join()
                    .expect("reader thread panicked")
                    .expect("snapshot expected");
                assert_eq!(snapshot.entries.len(), 6);
            }
        });
        assert_eq!(source.calls(), 1);
    }

    #[test]
    fn test_sqlite_store_persists_snapshot() {
        let db = DbManager::new_in_memory().expect("failed to create in-memory db");
        let store = Arc::new(SqliteSnapshotStore::new(Arc::new(Mutex::new(db))));
        let source = FakeSource::serving(markup());
        let built = cache(store.clone(), source)
            .get_leaderboard()
            .expect("snapshot expected");
        assert_eq!(store.load().expect("load"), Some(built));
    }
}
