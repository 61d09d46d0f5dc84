//! One ingestion run: document markup in, leaderboard snapshot out.

use std::fmt;

use log::info;

use crate::model::{now_unix_ms, LeaderboardSnapshot};
use crate::ranking::assign_ranks;
use crate::scoring::{score_with_cutoff, ScoringPolicy};
use crate::source::columns::map_columns;
use crate::source::extractor::extract_ranking_rows;
use crate::source::rows::parse_rows;
use crate::source::DocumentSource;

/// Why an ingestion run produced no snapshot. None of these are retried internally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestionError {
    /// Transport failure or non-success response fetching the document.
    SourceUnavailable(String),
    /// The response was not the structured content we expected.
    MalformedSource(String),
    /// No table looked like the ranking grid.
    NoQualifyingTable,
    /// The grid was found but no row survived parsing.
    EmptyResult,
    /// The snapshot store could not be read.
    Storage(String),
}

impl fmt::Display for IngestionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SourceUnavailable(reason) => write!(f, "source document unavailable: {reason}"),
            Self::MalformedSource(reason) => write!(f, "source document malformed: {reason}"),
            Self::NoQualifyingTable => write!(f, "no table in the source document looks like the ranking grid"),
            Self::EmptyResult => write!(f, "ranking grid found but no rows could be parsed"),
            Self::Storage(reason) => write!(f, "snapshot storage failed: {reason}"),
        }
    }
}

impl std::error::Error for IngestionError {}

/// Runs extraction, column mapping, row parsing, scoring and ranking over `markup`.
pub fn build_snapshot(
    markup: &str,
    policy: &ScoringPolicy,
    built_at: i64,
) -> Result<LeaderboardSnapshot, IngestionError> {
    let rows = extract_ranking_rows(markup);
    if rows.is_empty() {
        return Err(IngestionError::NoQualifyingTable);
    }

    let columns = map_columns(&rows);
    let data_rows = &rows[columns.header_rows.min(rows.len())..];
    let records = parse_rows(data_rows, &columns);
    let (decision, scored) =
        score_with_cutoff(records, policy).ok_or(IngestionError::EmptyResult)?;

    let snapshot = assign_ranks(scored, decision.effective_cutoff_year, built_at);
    info!(
        "Ingestion: built leaderboard with {} songs (cutoff {})",
        snapshot.entries.len(),
        snapshot.effective_cutoff_year
    );
    Ok(snapshot)
}

/// Fetches the document and builds a snapshot stamped with the current time.
pub fn run_ingestion(
    source: &dyn DocumentSource,
    policy: &ScoringPolicy,
) -> Result<LeaderboardSnapshot, IngestionError> {
    let markup = source.fetch_markup()?;
    build_snapshot(&markup, policy, now_unix_ms())
}
