//! Picks the ranking grid out of all tables in the article.
//!
//! The grid carries one column per edition, so it is by far the widest table on
//! the page. Narrow tables (infoboxes, navigation boxes, yearly top-10 lists) are
//! rejected by the width threshold.

use log::{debug, info};

use super::markup::{find_tables, MarkupTable};

pub const MIN_TABLE_ROWS: usize = 5;
pub const WIDTH_PROBE_ROWS: usize = 3;
/// A qualifying table must be strictly wider than this.
pub const MIN_TABLE_COLUMNS: usize = 20;

/// Width of `table` if it qualifies as a ranking grid candidate.
pub fn qualifying_width(table: &MarkupTable) -> Option<usize> {
    if table.rows.len() < MIN_TABLE_ROWS {
        return None;
    }
    let width = table.max_cells_in_leading_rows(WIDTH_PROBE_ROWS);
    (width > MIN_TABLE_COLUMNS).then_some(width)
}

/// Rows of the widest qualifying table, or empty when none qualifies.
/// Ties keep the earliest table in the document.
pub fn extract_ranking_rows(markup: &str) -> Vec<Vec<String>> {
    let tables = find_tables(markup);
    let mut best: Option<(usize, MarkupTable)> = None;

    for (index, table) in tables.into_iter().enumerate() {
        let Some(width) = qualifying_width(&table) else {
            continue;
        };
        debug!(
            "Table extraction: table {} qualifies ({} rows, {} columns)",
            index,
            table.rows.len(),
            width
        );
        if best
            .as_ref()
            .map_or(true, |(best_width, _)| width > *best_width)
        {
            best = Some((width, table));
        }
    }

    match best {
        Some((width, table)) => {
            info!(
                "Table extraction: selected ranking grid with {} rows and {} columns",
                table.rows.len(),
                width
            );
            table.rows
        }
        None => Vec::new(),
    }
}
