//! Per-edition points and cutoff-adjusted aggregate scores.
//!
//! The newest edition is published gradually (the top of the list is revealed
//! last, during the broadcast), so an edition with only a handful of known
//! positions is left out of the aggregate until it is substantially complete.

use log::info;

use crate::config::ScoringConfig;
use crate::model::{RankValue, RankingRecord, ScoredRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoringPolicy {
    /// Editions with fewer ranked songs than this are excluded as partial.
    pub partial_edition_threshold: usize,
    /// Position `1` earns this many points; each lower position one fewer.
    pub max_scoring_rank: u32,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            partial_edition_threshold: 1500,
            max_scoring_rank: 2000,
        }
    }
}

impl From<&ScoringConfig> for ScoringPolicy {
    fn from(config: &ScoringConfig) -> Self {
        Self {
            partial_edition_threshold: config.partial_edition_threshold,
            max_scoring_rank: config.max_scoring_rank,
        }
    }
}

impl ScoringPolicy {
    pub fn points_for(&self, value: RankValue) -> u64 {
        match value {
            RankValue::Ranked(position) if (1..=self.max_scoring_rank).contains(&position) => {
                u64::from(self.max_scoring_rank - position + 1)
            }
            _ => 0,
        }
    }

    /// Sum of points for editions up to and including `cutoff_year`.
    pub fn score_up_to(&self, record: &RankingRecord, cutoff_year: u16) -> u64 {
        record
            .rankings
            .range(..=cutoff_year)
            .map(|(_, value)| self.points_for(*value))
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CutoffDecision {
    pub max_year: u16,
    pub count_at_max_year: usize,
    pub is_partial: bool,
    pub effective_cutoff_year: u16,
}

/// Decides which edition is the latest one trusted for scoring.
pub fn decide_cutoff(records: &[RankingRecord], policy: &ScoringPolicy) -> Option<CutoffDecision> {
    let max_year = records
        .iter()
        .filter_map(RankingRecord::latest_edition)
        .max()?;
    let count_at_max_year = records
        .iter()
        .filter(|record| record.rank_in(max_year).is_ranked())
        .count();
    let is_partial = count_at_max_year < policy.partial_edition_threshold;
    let effective_cutoff_year = if is_partial {
        max_year.saturating_sub(1)
    } else {
        max_year
    };
    Some(CutoffDecision {
        max_year,
        count_at_max_year,
        is_partial,
        effective_cutoff_year,
    })
}

/// Scores every record against `cutoff_year` and the year before it.
pub fn score_records(
    records: Vec<RankingRecord>,
    cutoff_year: u16,
    policy: &ScoringPolicy,
) -> Vec<ScoredRecord> {
    let previous_year = cutoff_year.saturating_sub(1);
    records
        .into_iter()
        .map(|record| {
            let total_score = policy.score_up_to(&record, cutoff_year);
            let previous_total_score = if cutoff_year == 0 {
                0
            } else {
                policy.score_up_to(&record, previous_year)
            };
            ScoredRecord {
                record,
                total_score,
                previous_total_score,
            }
        })
        .collect()
}

/// Applies the cutoff policy and scores all records.
pub fn score_with_cutoff(
    records: Vec<RankingRecord>,
    policy: &ScoringPolicy,
) -> Option<(CutoffDecision, Vec<ScoredRecord>)> {
    let decision = decide_cutoff(&records, policy)?;
    if decision.is_partial {
        info!(
            "Scoring: edition {} has {} ranked songs (< {}); counting up to {}",
            decision.max_year,
            decision.count_at_max_year,
            policy.partial_edition_threshold,
            decision.effective_cutoff_year
        );
    } else {
        info!(
            "Scoring: edition {} is complete ({} ranked songs)",
            decision.max_year, decision.count_at_max_year
        );
    }
    let scored = score_records(records, decision.effective_cutoff_year, policy);
    Some((decision, scored))
}
