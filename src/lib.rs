//! All-time leaderboard for the yearly Top 2000 countdown.
//!
//! The ranking grid is scraped from the Wikipedia list article, scored across
//! editions and cached as one snapshot. Artwork and preview URLs are resolved
//! lazily per song through a cached, coalescing catalog lookup.

pub mod config;
pub mod db_manager;
pub mod ingest;
pub mod metadata;
pub mod model;
pub mod ranking;
pub mod scoring;
pub mod snapshot_cache;
pub mod source;

pub use ingest::IngestionError;
pub use metadata::{CatalogMetadata, MetadataResolver};
pub use model::{LeaderboardEntry, LeaderboardSnapshot, RankValue, RankingRecord};
pub use snapshot_cache::SnapshotCache;
