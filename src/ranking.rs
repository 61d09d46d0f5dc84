//! All-time position assignment.

use crate::model::{LeaderboardEntry, LeaderboardSnapshot, ScoredRecord};

/// Ranks scored records into a snapshot.
///
/// Both orderings are stable sorts, so songs with equal scores keep the order in
/// which they appeared in the source document.
pub fn assign_ranks(
    scored: Vec<ScoredRecord>,
    effective_cutoff_year: u16,
    built_at: i64,
) -> LeaderboardSnapshot {
    let mut previous_order: Vec<usize> = (0..scored.len()).collect();
    previous_order.sort_by(|left, right| {
        scored[*right]
            .previous_total_score
            .cmp(&scored[*left].previous_total_score)
    });
    let mut previous_ranks = vec![0u32; scored.len()];
    for (position, index) in previous_order.into_iter().enumerate() {
        previous_ranks[index] = position as u32 + 1;
    }

    let mut ranked: Vec<(u32, ScoredRecord)> = previous_ranks.into_iter().zip(scored).collect();
    ranked.sort_by(|(_, left), (_, right)| right.total_score.cmp(&left.total_score));

    let entries = ranked
        .into_iter()
        .enumerate()
        .map(|(position, (previous_rank, scored))| LeaderboardEntry {
            all_time_rank: position as u32 + 1,
            previous_all_time_rank: (scored.previous_total_score > 0).then_some(previous_rank),
            total_score: scored.total_score,
            record: scored.record,
        })
        .collect();

    LeaderboardSnapshot {
        built_at,
        effective_cutoff_year,
        entries,
    }
}
