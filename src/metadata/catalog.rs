//! External catalog search (iTunes Search API) and the query variants tried against it.

use std::fmt;
use std::io::Read;
use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use log::debug;
use serde_json::Value;

use crate::config::MetadataConfig;

const ARTWORK_SOURCE_SIZE: &str = "100x100bb";
const RATE_LIMIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Best catalog match for one query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogHit {
    pub artwork_url: Option<String>,
    pub preview_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// The catalog asked us to slow down (HTTP 429, or 403 throttling).
    RateLimited(String),
    /// Timeouts and server-side failures.
    Transient(String),
    Hard(String),
    /// The response body was not a search result document.
    Malformed(String),
}

impl CatalogError {
    /// Whether the whole variant list should be retried after a backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::Transient(_))
    }
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited(reason) => write!(f, "catalog rate limited: {reason}"),
            Self::Transient(reason) => write!(f, "catalog temporarily unavailable: {reason}"),
            Self::Hard(reason) => write!(f, "catalog request failed: {reason}"),
            Self::Malformed(reason) => write!(f, "catalog response malformed: {reason}"),
        }
    }
}

impl std::error::Error for CatalogError {}

pub trait CatalogClient: Send + Sync {
    /// `Ok(None)` means the catalog answered with zero results.
    fn search(&self, query: &str) -> Result<Option<CatalogHit>, CatalogError>;
}

pub struct ItunesCatalog {
    search_url: String,
    country: String,
    artwork_size: String,
    http_client: ureq::Agent,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl ItunesCatalog {
    pub fn new(config: &MetadataConfig) -> Self {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();
        let quota = Quota::with_period(Duration::from_millis(config.min_request_interval_ms))
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(NonZeroU32::MIN);

        Self {
            search_url: config.catalog_url.clone(),
            country: config.country.clone(),
            artwork_size: format!("{0}x{0}bb", config.artwork_edge_px),
            http_client,
            limiter: RateLimiter::direct(quota),
        }
    }

    pub fn request_url(&self, query: &str) -> String {
        format!(
            "{}?term={}&country={}&entity=song&limit=1",
            self.search_url,
            urlencoding::encode(query),
            urlencoding::encode(&self.country)
        )
    }

    fn wait_for_rate_limit_slot(&self) {
        while self.limiter.check().is_err() {
            std::thread::sleep(RATE_LIMIT_POLL_INTERVAL);
        }
    }

    pub fn parse_response(&self, body: &str) -> Result<Option<CatalogHit>, CatalogError> {
        let json: Value = serde_json::from_str(body)
            .map_err(|error| CatalogError::Malformed(format!("Invalid JSON response: {error}")))?;
        let results = json["results"]
            .as_array()
            .ok_or_else(|| CatalogError::Malformed("Response has no results array".to_string()))?;
        let Some(first) = results.first() else {
            return Ok(None);
        };
        Ok(Some(CatalogHit {
            artwork_url: first["artworkUrl100"]
                .as_str()
                .map(|url| upscale_artwork_url(url, &self.artwork_size)),
            preview_url: first["previewUrl"].as_str().map(str::to_string),
        }))
    }
}

impl CatalogClient for ItunesCatalog {
    fn search(&self, query: &str) -> Result<Option<CatalogHit>, CatalogError> {
        self.wait_for_rate_limit_slot();
        let url = self.request_url(query);
        debug!("Catalog: searching '{}'", query);
        let response = self
            .http_client
            .get(&url)
            .set("Accept", "application/json")
            .call()
            .map_err(|error| classify_ureq_failure(&error))?;

        let mut body = String::new();
        response
            .into_reader()
            .read_to_string(&mut body)
            .map_err(|error| {
                if error.kind() == std::io::ErrorKind::TimedOut {
                    CatalogError::Transient(format!("Failed to read response: {error}"))
                } else {
                    CatalogError::Hard(format!("Failed to read response: {error}"))
                }
            })?;
        self.parse_response(&body)
    }
}

pub fn classify_ureq_failure(error: &ureq::Error) -> CatalogError {
    let message = format!("Request failed: {error}");
    match error {
        ureq::Error::Status(code, _) => match code {
            403 | 429 => CatalogError::RateLimited(message),
            408 | 500 | 502 | 503 | 504 => CatalogError::Transient(message),
            _ => CatalogError::Hard(message),
        },
        ureq::Error::Transport(transport) => {
            let lowered = transport.to_string().to_ascii_lowercase();
            if lowered.contains("timed out") || lowered.contains("timeout") {
                CatalogError::Transient(message)
            } else {
                CatalogError::Hard(message)
            }
        }
    }
}

/// Swaps the thumbnail size segment of an artwork URL for `size`.
pub fn upscale_artwork_url(url: &str, size: &str) -> String {
    match url.rfind(ARTWORK_SOURCE_SIZE) {
        Some(position) => format!(
            "{}{}{}",
            &url[..position],
            size,
            &url[position + ARTWORK_SOURCE_SIZE.len()..]
        ),
        None => url.to_string(),
    }
}

/// Builds one query from normalized artist and title.
pub type QueryStrategy = fn(&str, &str) -> String;

/// Tried in order; the first variant with a catalog result wins.
pub const QUERY_STRATEGIES: &[QueryStrategy] = &[artist_then_title, title_then_artist, title_only];

pub fn artist_then_title(artist: &str, title: &str) -> String {
    format!("{artist} {title}")
}

pub fn title_then_artist(artist: &str, title: &str) -> String {
    format!("{title} {artist}")
}

pub fn title_only(_artist: &str, title: &str) -> String {
    title.to_string()
}

/// Lowercases, folds punctuation to spaces and collapses whitespace.
pub fn normalize_query(text: &str) -> String {
    text.chars()
        .map(|ch| if ch.is_alphanumeric() { ch } else { ' ' })
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Distinct non-empty query variants in strategy order.
pub fn query_variants(artist: &str, title: &str) -> Vec<String> {
    let artist = normalize_query(artist);
    let title = normalize_query(title);
    let mut variants: Vec<String> = Vec::with_capacity(QUERY_STRATEGIES.len());
    for strategy in QUERY_STRATEGIES {
        let variant = normalize_query(&strategy(&artist, &title));
        if !variant.is_empty() && !variants.contains(&variant) {
            variants.push(variant);
        }
    }
    variants
}
