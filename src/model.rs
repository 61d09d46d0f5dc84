//! Leaderboard data model shared by ingestion, scoring and the snapshot cache.
//!
//! Records are rebuilt wholesale on every ingestion run; nothing here is patched
//! in place once a snapshot has been produced.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Position of a song in one edition of the countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RankValue {
    /// Listed at this 1-based position.
    Ranked(u32),
    /// The edition column exists for this row but holds no position.
    NotListed,
    /// The edition was never observed for this row.
    Unknown,
}

impl RankValue {
    pub fn position(self) -> Option<u32> {
        match self {
            Self::Ranked(position) => Some(position),
            Self::NotListed | Self::Unknown => None,
        }
    }

    pub fn is_ranked(self) -> bool {
        matches!(self, Self::Ranked(_))
    }
}

/// One song's per-edition chart history as read from the source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingRecord {
    /// Slug of `artist-title`. Not guaranteed unique.
    pub id: String,
    pub artist: String,
    pub title: String,
    /// Release year, `0` when unknown.
    #[serde(default)]
    pub release_year: u16,
    /// Observed editions only; `Unknown` is represented by a missing key.
    #[serde(default, with = "rankings_layout")]
    pub rankings: BTreeMap<u16, RankValue>,
}

impl RankingRecord {
    pub fn new(artist: impl Into<String>, title: impl Into<String>, release_year: u16) -> Self {
        let artist = artist.into();
        let title = title.into();
        Self {
            id: slugify(&format!("{artist}-{title}")),
            artist,
            title,
            release_year,
            rankings: BTreeMap::new(),
        }
    }

    /// Records an observed edition. `Unknown` clears any previous observation.
    pub fn set_rank(&mut self, year: u16, value: RankValue) {
        match value {
            RankValue::Unknown => {
                self.rankings.remove(&year);
            }
            observed => {
                self.rankings.insert(year, observed);
            }
        }
    }

    pub fn rank_in(&self, year: u16) -> RankValue {
        self.rankings
            .get(&year)
            .copied()
            .unwrap_or(RankValue::Unknown)
    }

    pub fn editions_listed(&self) -> usize {
        self.rankings
            .values()
            .filter(|value| value.is_ranked())
            .count()
    }

    pub fn latest_edition(&self) -> Option<u16> {
        self.rankings.keys().next_back().copied()
    }
}

/// A ranking record with its aggregate score for the effective cutoff year.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredRecord {
    pub record: RankingRecord,
    pub total_score: u64,
    /// Aggregate up to the year before the cutoff. Only used to derive previous ranks.
    pub(crate) previous_total_score: u64,
}

/// A scored record placed on the all-time leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    #[serde(flatten)]
    pub record: RankingRecord,
    pub total_score: u64,
    pub all_time_rank: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_all_time_rank: Option<u32>,
}

impl LeaderboardEntry {
    /// Positions gained since the previous cutoff year; positive means the song climbed.
    pub fn rank_change(&self) -> Option<i64> {
        self.previous_all_time_rank
            .map(|previous| i64::from(previous) - i64::from(self.all_time_rank))
    }

    pub fn is_new_entry(&self) -> bool {
        self.previous_all_time_rank.is_none()
    }
}

/// The complete output of one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardSnapshot {
    /// Build time in unix milliseconds.
    pub built_at: i64,
    pub effective_cutoff_year: u16,
    pub entries: Vec<LeaderboardEntry>,
}

impl LeaderboardSnapshot {
    pub fn age(&self, now_unix_ms: i64) -> Duration {
        let elapsed_ms = now_unix_ms.saturating_sub(self.built_at).max(0);
        Duration::from_millis(elapsed_ms as u64)
    }

    /// A snapshot built in the future (clock skew) is never considered fresh.
    pub fn is_fresh(&self, now_unix_ms: i64, ttl: Duration) -> bool {
        self.built_at <= now_unix_ms && self.age(now_unix_ms) < ttl
    }

    pub fn top(&self, count: usize) -> &[LeaderboardEntry] {
        &self.entries[..count.min(self.entries.len())]
    }

    pub fn find(&self, id: &str) -> Option<&LeaderboardEntry> {
        self.entries.iter().find(|entry| entry.record.id == id)
    }
}

pub fn now_unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as i64)
        .unwrap_or(0)
}

/// Lowercase ASCII slug: alphanumeric runs joined by single dashes.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_dash = false;
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Persisted as `{"<year>": <position> | null}`; unobserved editions are omitted.
mod rankings_layout {
    use std::collections::BTreeMap;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::RankValue;

    pub fn serialize<S>(rankings: &BTreeMap<u16, RankValue>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let layout: BTreeMap<String, Option<u32>> = rankings
            .iter()
            .filter(|(_, value)| **value != RankValue::Unknown)
            .map(|(year, value)| (year.to_string(), value.position()))
            .collect();
        layout.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<u16, RankValue>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let layout = BTreeMap::<String, Option<u32>>::deserialize(deserializer)?;
        let mut rankings = BTreeMap::new();
        for (year, position) in layout {
            let year = year
                .trim()
                .parse::<u16>()
                .map_err(|_| D::Error::custom(format!("invalid edition year '{year}'")))?;
            let value = match position {
                Some(position) => RankValue::Ranked(position),
                None => RankValue::NotListed,
            };
            rankings.insert(year, value);
        }
        Ok(rankings)
    }
}

#[cfg(test)]
mod tests {
    use super::{slugify, LeaderboardEntry, LeaderboardSnapshot, RankValue, RankingRecord};
    use std::time::Duration;

    fn sample_record() -> RankingRecord {
        let mut record = RankingRecord::new("Queen", "Bohemian Rhapsody", 1975);
        record.set_rank(1999, RankValue::Ranked(1));
        record.set_rank(2000, RankValue::NotListed);
        record
    }

    #[test]
    fn test_slugify_collapses_punctuation_and_case() {
        assert_eq!(slugify("Guns N' Roses-Sweet Child O' Mine"), "guns-n-roses-sweet-child-o-mine");
        assert_eq!(slugify("  --ABBA--  "), "abba");
        assert_eq!(slugify("Röyksopp-Eple"), "r-yksopp-eple");
    }

    #[test]
    fn test_record_id_is_slug_of_artist_and_title() {
        assert_eq!(sample_record().id, "queen-bohemian-rhapsody");
    }

    #[test]
    fn test_rank_in_distinguishes_not_listed_from_unknown() {
        let record = sample_record();
        assert_eq!(record.rank_in(1999), RankValue::Ranked(1));
        assert_eq!(record.rank_in(2000), RankValue::NotListed);
        assert_eq!(record.rank_in(2001), RankValue::Unknown);
        assert_eq!(record.editions_listed(), 1);
        assert_eq!(record.latest_edition(), Some(2000));
    }

    #[test]
    fn test_set_rank_unknown_removes_observation() {
        let mut record = sample_record();
        record.set_rank(2000, RankValue::Unknown);
        assert_eq!(record.rank_in(2000), RankValue::Unknown);
        assert_eq!(record.rankings.len(), 1);
    }

    #[test]
    fn test_rankings_serialize_null_for_not_listed_and_omit_unknown() {
        let json = serde_json::to_value(sample_record()).expect("record should serialize");
        assert_eq!(json["rankings"]["1999"], 1);
        assert!(json["rankings"]["2000"].is_null());
        assert!(json["rankings"].get("2001").is_none());

        let restored: RankingRecord =
            serde_json::from_value(json).expect("record should deserialize");
        assert_eq!(restored, sample_record());
    }

    #[test]
    fn test_entry_rank_change_and_fresh_entry() {
        let climbed = LeaderboardEntry {
            record: sample_record(),
            total_score: 2000,
            all_time_rank: 3,
            previous_all_time_rank: Some(7),
        };
        assert_eq!(climbed.rank_change(), Some(4));
        assert!(!climbed.is_new_entry());

        let fresh = LeaderboardEntry {
            previous_all_time_rank: None,
            ..climbed
        };
        assert_eq!(fresh.rank_change(), None);
        assert!(fresh.is_new_entry());
    }

    #[test]
    fn test_snapshot_freshness_respects_ttl_and_clock_skew() {
        let snapshot = LeaderboardSnapshot {
            built_at: 1_000_000,
            effective_cutoff_year: 2024,
            entries: Vec::new(),
        };
        let ttl = Duration::from_secs(60);
        assert!(snapshot.is_fresh(1_000_000 + 59_999, ttl));
        assert!(!snapshot.is_fresh(1_000_000 + 60_000, ttl));
        assert!(!snapshot.is_fresh(999_000, ttl));
    }

    #[test]
    fn test_snapshot_serializes_flat_entries() {
        let snapshot = LeaderboardSnapshot {
            built_at: 42,
            effective_cutoff_year: 1999,
            entries: vec![LeaderboardEntry {
                record: sample_record(),
                total_score: 2000,
                all_time_rank: 1,
                previous_all_time_rank: None,
            }],
        };
        let json = serde_json::to_value(&snapshot).expect("snapshot should serialize");
        assert_eq!(json["entries"][0]["artist"], "Queen");
        assert_eq!(json["entries"][0]["all_time_rank"], 1);
        assert!(json["entries"][0].get("previous_all_time_rank").is_none());

        let restored: LeaderboardSnapshot =
            serde_json::from_value(json).expect("snapshot should deserialize");
        assert_eq!(restored, snapshot);
        assert_eq!(restored.top(5).len(), 1);
        assert!(restored.find("queen-bohemian-rhapsody").is_some());
    }
}
