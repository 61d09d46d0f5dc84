use std::path::{Path, PathBuf};

use log::info;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

use crate::config::app_data_dir;
use crate::metadata::CatalogMetadata;
use crate::model::LeaderboardSnapshot;

const DB_FILE_NAME: &str = "ledger.db";
/// The snapshot table only ever holds this one row.
const SNAPSHOT_SLOT: i64 = 1;

pub struct DbManager {
    conn: Connection,
}

impl DbManager {
    pub fn new() -> Result<Self, rusqlite::Error> {
        let data_dir = app_data_dir()
            .ok_or_else(|| rusqlite::Error::InvalidPath(PathBuf::from(DB_FILE_NAME)))?;
        if !data_dir.exists() {
            std::fs::create_dir_all(&data_dir)
                .map_err(|_| rusqlite::Error::InvalidPath(data_dir.clone()))?;
        }
        Self::open(&data_dir.join(DB_FILE_NAME))
    }

    pub fn open(path: &Path) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        let db_manager = Self { conn };
        db_manager.initialize_schema()?;
        info!("Database: opened {}", path.display());
        Ok(db_manager)
    }

    pub fn new_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        let db_manager = Self { conn };
        db_manager.initialize_schema()?;
        Ok(db_manager)
    }

    fn initialize_schema(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS leaderboard_snapshot (
                slot INTEGER PRIMARY KEY CHECK (slot = 1),
                built_at_ms INTEGER NOT NULL,
                effective_cutoff_year INTEGER NOT NULL,
                payload TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS catalog_metadata (
                key TEXT PRIMARY KEY,
                cover_url TEXT,
                preview_url TEXT,
                resolved_at_ms INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    pub fn load_snapshot(&self) -> Result<Option<LeaderboardSnapshot>, rusqlite::Error> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload FROM leaderboard_snapshot WHERE slot = ?1",
                params![SNAPSHOT_SLOT],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .map(|payload| {
                serde_json::from_str::<LeaderboardSnapshot>(&payload).map_err(|error| {
                    rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(error))
                })
            })
            .transpose()
    }

    /// Replaces the stored snapshot in a single statement.
    pub fn save_snapshot(&self, snapshot: &LeaderboardSnapshot) -> Result<(), rusqlite::Error> {
        let payload = serde_json::to_string(snapshot)
            .map_err(|error| rusqlite::Error::ToSqlConversionFailure(Box::new(error)))?;
        self.conn.execute(
            "INSERT OR REPLACE INTO leaderboard_snapshot
                (slot, built_at_ms, effective_cutoff_year, payload)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                SNAPSHOT_SLOT,
                snapshot.built_at,
                snapshot.effective_cutoff_year,
                payload
            ],
        )?;
        Ok(())
    }

    pub fn get_metadata(&self, key: &str) -> Result<Option<CatalogMetadata>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT cover_url, preview_url FROM catalog_metadata WHERE key = ?1",
                params![key],
                |row| {
                    Ok(CatalogMetadata {
                        cover_url: row.get(0)?,
                        preview_url: row.get(1)?,
                    })
                },
            )
            .optional()
    }

    pub fn put_metadata(
        &self,
        key: &str,
        metadata: &CatalogMetadata,
        resolved_at_ms: i64,
    ) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO catalog_metadata (key, cover_url, preview_url, resolved_at_ms)
             VALUES (?1, ?2, ?3, ?4)",
            params![key, metadata.cover_url, metadata.preview_url, resolved_at_ms],
        )?;
        Ok(())
    }

    pub fn has_metadata(&self, key: &str) -> Result<bool, rusqlite::Error> {
        self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM catalog_metadata WHERE key = ?1)",
            params![key],
            |row| row.get(0),
        )
    }

    /// Deletes cached misses so they are queried again. Returns the number removed.
    pub fn clear_negative_metadata(&self) -> Result<usize, rusqlite::Error> {
        self.conn.execute(
            "DELETE FROM catalog_metadata WHERE cover_url IS NULL AND preview_url IS NULL",
            [],
        )
    }

    pub fn count_metadata(&self) -> Result<(usize, usize), rusqlite::Error> {
        self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(cover_url IS NULL AND preview_url IS NULL), 0)
             FROM catalog_metadata",
            [],
            |row| {
                let total: i64 = row.get(0)?;
                let misses: i64 = row.get(1)?;
                Ok((
                    usize::try_from(total).unwrap_or(0),
                    usize::try_from(misses).unwrap_or(0),
                ))
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::DbManager;
    use crate::metadata::CatalogMetadata;
    use crate::model::{LeaderboardEntry, LeaderboardSnapshot, RankValue, RankingRecord};

    fn snapshot(built_at: i64, artist: &str) -> LeaderboardSnapshot {
        let mut record = RankingRecord::new(artist, "Song", 1975);
        record.set_rank(1999, RankValue::Ranked(3));
        record.set_rank(2000, RankValue::NotListed);
        LeaderboardSnapshot {
            built_at,
            effective_cutoff_year: 2000,
            entries: vec![LeaderboardEntry {
                record,
                total_score: 1998,
                all_time_rank: 1,
                previous_all_time_rank: Some(1),
            }],
        }
    }

    #[test]
    fn test_snapshot_slot_starts_empty() {
        let db = DbManager::new_in_memory().expect("failed to create in-memory db");
        assert_eq!(db.load_snapshot().expect("load should succeed"), None);
    }

    #[test]
    fn test_save_snapshot_replaces_previous_snapshot() {
        let db = DbManager::new_in_memory().expect("failed to create in-memory db");
        db.save_snapshot(&snapshot(1, "Old")).expect("save should succeed");
        db.save_snapshot(&snapshot(2, "New")).expect("save should succeed");

        let loaded = db
            .load_snapshot()
            .expect("load should succeed")
            .expect("snapshot should exist");
        assert_eq!(loaded, snapshot(2, "New"));
        assert_eq!(loaded.entries[0].record.rank_in(2000), RankValue::NotListed);
        assert_eq!(loaded.entries[0].record.rank_in(2001), RankValue::Unknown);
    }

    #[test]
    fn test_metadata_put_get_has() {
        let db = DbManager::new_in_memory().expect("failed to create in-memory db");
        let hit = CatalogMetadata {
            cover_url: Some("https://example.test/cover.jpg".to_string()),
            preview_url: None,
        };
        assert!(!db.has_metadata("queen|bohemian rhapsody").expect("query should succeed"));
        db.put_metadata("queen|bohemian rhapsody", &hit, 10)
            .expect("put should succeed");
        assert!(db.has_metadata("queen|bohemian rhapsody").expect("query should succeed"));
        assert_eq!(
            db.get_metadata("queen|bohemian rhapsody").expect("query should succeed"),
            Some(hit)
        );
        assert_eq!(db.get_metadata("other|song").expect("query should succeed"), None);
    }

    #[test]
    fn test_clear_negative_metadata_keeps_hits() {
        let db = DbManager::new_in_memory().expect("failed to create in-memory db");
        let hit = CatalogMetadata {
            cover_url: None,
            preview_url: Some("https://example.test/preview.m4a".to_string()),
        };
        db.put_metadata("a|hit", &hit, 1).expect("put should succeed");
        db.put_metadata("b|miss", &CatalogMetadata::miss(), 1)
            .expect("put should succeed");
        db.put_metadata("c|miss", &CatalogMetadata::miss(), 1)
            .expect("put should succeed");
        assert_eq!(db.count_metadata().expect("count should succeed"), (3, 2));

        assert_eq!(db.clear_negative_metadata().expect("clear should succeed"), 2);
        assert!(db.has_metadata("a|hit").expect("query should succeed"));
        assert!(!db.has_metadata("b|miss").expect("query should succeed"));
        assert_eq!(db.count_metadata().expect("count should succeed"), (1, 0));
    }
}
