//! Persistent configuration model and defaults.

use std::path::PathBuf;
use std::time::Duration;

use log::{info, warn};

const APP_DIR_NAME: &str = "alltime-ledger";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Where the ranking document is fetched from.
    pub source: SourceConfig,
    #[serde(default)]
    /// Score engine parameters.
    pub scoring: ScoringConfig,
    #[serde(default)]
    /// Leaderboard snapshot cache behavior.
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    /// Catalog lookups used for artwork and previews.
    pub metadata: MetadataConfig,
}

/// Source document location.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SourceConfig {
    #[serde(default = "default_source_api_url")]
    pub api_url: String,
    #[serde(default = "default_source_page")]
    pub page: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_source_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Score engine parameters.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ScoringConfig {
    /// Editions with fewer ranked songs than this are treated as still being published.
    #[serde(default = "default_partial_edition_threshold")]
    pub partial_edition_threshold: usize,
    /// Lowest position that still earns points.
    #[serde(default = "default_max_scoring_rank")]
    pub max_scoring_rank: u32,
}

/// Snapshot cache behavior.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SnapshotConfig {
    #[serde(default = "default_snapshot_ttl_hours")]
    pub ttl_hours: u64,
}

/// Catalog lookup and retry behavior.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct MetadataConfig {
    #[serde(default = "default_catalog_url")]
    pub catalog_url: String,
    /// Storefront country hint passed with every search.
    #[serde(default = "default_catalog_country")]
    pub country: String,
    /// Edge length requested for artwork URLs.
    #[serde(default = "default_artwork_edge_px")]
    pub artwork_edge_px: u32,
    #[serde(default = "default_catalog_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Minimum spacing between catalog requests across all lookups.
    #[serde(default = "default_min_request_interval_ms")]
    pub min_request_interval_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            api_url: default_source_api_url(),
            page: default_source_page(),
            user_agent: default_user_agent(),
            request_timeout_secs: default_source_timeout_secs(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            partial_edition_threshold: default_partial_edition_threshold(),
            max_scoring_rank: default_max_scoring_rank(),
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            ttl_hours: default_snapshot_ttl_hours(),
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            catalog_url: default_catalog_url(),
            country: default_catalog_country(),
            artwork_edge_px: default_artwork_edge_px(),
            request_timeout_secs: default_catalog_timeout_secs(),
            base_delay_ms: default_base_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ms: default_jitter_ms(),
            max_attempts: default_max_attempts(),
            min_request_interval_ms: default_min_request_interval_ms(),
        }
    }
}

impl SnapshotConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_hours.saturating_mul(60 * 60))
    }
}

fn default_source_api_url() -> String {
    "https://nl.wikipedia.org/w/api.php".to_string()
}

fn default_source_page() -> String {
    "Lijst van Radio 2-Top 2000's".to_string()
}

fn default_user_agent() -> String {
    "alltime-ledger/0.1.0 (leaderboard ingestion; contact: maintainers)".to_string()
}

fn default_source_timeout_secs() -> u64 {
    20
}

fn default_partial_edition_threshold() -> usize {
    1500
}

fn default_max_scoring_rank() -> u32 {
    2000
}

fn default_snapshot_ttl_hours() -> u64 {
    24
}

fn default_catalog_url() -> String {
    "https://itunes.apple.com/search".to_string()
}

fn default_catalog_country() -> String {
    "NL".to_string()
}

fn default_artwork_edge_px() -> u32 {
    600
}

fn default_catalog_timeout_secs() -> u64 {
    8
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_backoff_multiplier() -> f64 {
    1.5
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter_ms() -> u64 {
    250
}

fn default_max_attempts() -> u32 {
    4
}

fn default_min_request_interval_ms() -> u64 {
    350
}

/// Clamps values that would make scoring or retries misbehave.
pub fn sanitize_config(config: Config) -> Config {
    let max_scoring_rank = config.scoring.max_scoring_rank.max(1);
    let base_delay_ms = config.metadata.base_delay_ms.max(1);
    Config {
        source: SourceConfig {
            request_timeout_secs: config.source.request_timeout_secs.clamp(1, 300),
            ..config.source
        },
        scoring: ScoringConfig {
            partial_edition_threshold: config.scoring.partial_edition_threshold,
            max_scoring_rank,
        },
        snapshot: SnapshotConfig {
            ttl_hours: config.snapshot.ttl_hours.max(1),
        },
        metadata: MetadataConfig {
            artwork_edge_px: config.metadata.artwork_edge_px.clamp(30, 3000),
            request_timeout_secs: config.metadata.request_timeout_secs.clamp(1, 120),
            base_delay_ms,
            backoff_multiplier: if config.metadata.backoff_multiplier.is_finite() {
                config.metadata.backoff_multiplier.clamp(1.0, 10.0)
            } else {
                default_backoff_multiplier()
            },
            max_delay_ms: config.metadata.max_delay_ms.max(base_delay_ms),
            max_attempts: config.metadata.max_attempts.clamp(1, 20),
            ..config.metadata
        },
    }
}

pub fn app_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|path| path.join(APP_DIR_NAME))
}

pub fn app_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|path| path.join(APP_DIR_NAME))
}

pub fn config_file_path() -> Option<PathBuf> {
    app_config_dir().map(|path| path.join(CONFIG_FILE_NAME))
}

/// Loads the config file, writing defaults first when it does not exist yet.
/// Unreadable or invalid files fall back to defaults.
pub fn load_or_create_config() -> Config {
    let Some(config_file) = config_file_path() else {
        warn!("No config directory available; using default configuration");
        return Config::default();
    };

    if !config_file.exists() {
        info!(
            "Config file not found. Creating default config. path={}",
            config_file.display()
        );
        let written = config_file
            .parent()
            .map(std::fs::create_dir_all)
            .transpose()
            .map_err(|error| error.to_string())
            .and_then(|_| {
                toml::to_string(&Config::default()).map_err(|error| error.to_string())
            })
            .and_then(|content| {
                std::fs::write(&config_file, content).map_err(|error| error.to_string())
            });
        if let Err(error) = written {
            warn!(
                "Failed to write default config to {}: {}",
                config_file.display(),
                error
            );
        }
        return Config::default();
    }

    match std::fs::read_to_string(&config_file) {
        Ok(content) => match toml::from_str::<Config>(&content) {
            Ok(config) => sanitize_config(config),
            Err(error) => {
                warn!(
                    "Invalid config file {}; using defaults: {}",
                    config_file.display(),
                    error
                );
                Config::default()
            }
        },
        Err(error) => {
            warn!(
                "Failed to read config file {}; using defaults: {}",
                config_file.display(),
                error
            );
            Config::default()
        }
    }
}
