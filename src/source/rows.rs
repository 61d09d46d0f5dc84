//! Turns raw ranking-grid rows into [`RankingRecord`]s.

use log::debug;

use super::columns::ColumnMap;
use super::markup::clean_cell_text;
use crate::model::{RankValue, RankingRecord};

const MIN_RELEASE_YEAR: u16 = 1900;
const MAX_RELEASE_YEAR: u16 = 2100;

/// A position cell: `"."` thousands separators are ignored, anything that is not a
/// positive integer means the song was not listed that edition.
pub fn parse_rank(text: &str) -> RankValue {
    let digits: String = text.trim().chars().filter(|ch| *ch != '.').collect();
    match digits.parse::<u32>() {
        Ok(position) if position > 0 => RankValue::Ranked(position),
        _ => RankValue::NotListed,
    }
}

/// Four-digit release year in `[1900, 2100]`, otherwise `0`.
pub fn parse_release_year(text: &str) -> u16 {
    let trimmed = text.trim();
    if trimmed.len() != 4 || !trimmed.chars().all(|ch| ch.is_ascii_digit()) {
        return 0;
    }
    trimmed
        .parse::<u16>()
        .ok()
        .filter(|year| (MIN_RELEASE_YEAR..=MAX_RELEASE_YEAR).contains(year))
        .unwrap_or(0)
}

fn cell_text(cells: &[String], index: Option<usize>) -> String {
    index
        .and_then(|index| cells.get(index))
        .map(|raw| clean_cell_text(raw))
        .unwrap_or_default()
}

/// Parses one row; `None` for rows that are too short, unnamed, or carry no positions.
pub fn parse_row(cells: &[String], columns: &ColumnMap) -> Option<RankingRecord> {
    let max_index = columns.max_index()?;
    if cells.len() < max_index {
        return None;
    }

    let artist = cell_text(cells, columns.artist);
    let title = cell_text(cells, columns.title);
    if artist.is_empty() || title.is_empty() {
        return None;
    }

    let release_year = parse_release_year(&cell_text(cells, columns.release_year));
    let mut record = RankingRecord::new(artist, title, release_year);
    for (index, year) in &columns.editions {
        // A row one cell short keeps its last edition unobserved.
        let Some(raw) = cells.get(*index) else {
            continue;
        };
        record.set_rank(*year, parse_rank(&clean_cell_text(raw)));
    }

    if record.editions_listed() == 0 {
        return None;
    }
    Some(record)
}

/// Parses data rows of the ranking table; spacer and subtotal rows are dropped.
pub fn parse_rows(rows: &[Vec<String>], columns: &ColumnMap) -> Vec<RankingRecord> {
    let records: Vec<RankingRecord> = rows
        .iter()
        .filter_map(|cells| parse_row(cells, columns))
        .collect();
    debug!(
        "Row parsing: {} of {} rows produced ranking records",
        records.len(),
        rows.len()
    );
    records
}

#[cfg(test)]
mod tests {
    use super::{parse_rank, parse_release_year, parse_row, parse_rows};
    use crate::model::RankValue;
    use crate::source::columns::ColumnMap;

    fn columns() -> ColumnMap {
        ColumnMap {
            artist: Some(0),
            title: Some(1),
            release_year: Some(2),
            editions: vec![(3, 1999), (4, 2000), (5, 2001)],
            header_rows: 1,
        }
    }

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|cell| cell.to_string()).collect()
    }

    #[test]
    fn test_parse_rank_strips_thousands_separators() {
        assert_eq!(parse_rank("1.234"), RankValue::Ranked(1234));
        assert_eq!(parse_rank(" 7 "), RankValue::Ranked(7));
    }

    #[test]
    fn test_parse_rank_treats_non_positive_and_text_as_not_listed() {
        assert_eq!(parse_rank(""), RankValue::NotListed);
        assert_eq!(parse_rank("-"), RankValue::NotListed);
        assert_eq!(parse_rank("0"), RankValue::NotListed);
        assert_eq!(parse_rank("nieuw"), RankValue::NotListed);
    }

    #[test]
    fn test_parse_release_year_bounds() {
        assert_eq!(parse_release_year("1975"), 1975);
        assert_eq!(parse_release_year("1899"), 0);
        assert_eq!(parse_release_year("2101"), 0);
        assert_eq!(parse_release_year("75"), 0);
        assert_eq!(parse_release_year("c. 1975"), 0);
    }

    #[test]
    fn test_parse_row_records_ranked_and_not_listed_editions() {
        let cells = row(&[
            "<a href=\"/wiki/Queen\">Queen</a>",
            "Bohemian Rhapsody<sup>[2]</sup>",
            "1975",
            "1",
            "",
            "1.001",
        ]);
        let record = parse_row(&cells, &columns()).expect("row should parse");
        assert_eq!(record.id, "queen-bohemian-rhapsody");
        assert_eq!(record.title, "Bohemian Rhapsody");
        assert_eq!(record.release_year, 1975);
        assert_eq!(record.rank_in(1999), RankValue::Ranked(1));
        assert_eq!(record.rank_in(2000), RankValue::NotListed);
        assert_eq!(record.rank_in(2001), RankValue::Ranked(1001));
    }

    #[test]
    fn test_parse_row_leaves_missing_trailing_cell_unknown() {
        let cells = row(&["Queen", "Bohemian Rhapsody", "1975", "1", "2"]);
        let record = parse_row(&cells, &columns()).expect("row should parse");
        assert_eq!(record.rank_in(2001), RankValue::Unknown);
        assert_eq!(record.editions_listed(), 2);
    }

    #[test]
    fn test_parse_row_skips_short_rows() {
        let cells = row(&["Queen", "Bohemian Rhapsody", "1975", "1"]);
        assert!(parse_row(&cells, &columns()).is_none());
    }

    #[test]
    fn test_parse_row_discards_rows_without_names_or_positions() {
        assert!(parse_row(&row(&["", "Title", "1975", "1", "2", "3"]), &columns()).is_none());
        assert!(parse_row(&row(&["Artist", " ", "1975", "1", "2", "3"]), &columns()).is_none());
        assert!(parse_row(&row(&["Artiest", "Titel", "Jaar", "'99", "'00", "'01"]), &columns())
            .is_none());
    }

    #[test]
    fn test_parse_rows_keeps_document_order() {
        let rows = vec![
            row(&["Artiest", "Titel", "Jaar", "'99", "'00", "'01"]),
            row(&["Queen", "Bohemian Rhapsody", "1975", "1", "1", "2"]),
            row(&["", "", "", "", "", ""]),
            row(&["Eagles", "Hotel California", "1977", "2", "3", "1"]),
        ];
        let records = parse_rows(&rows, &columns());
        let ids: Vec<&str> = records.iter().map(|record| record.id.as_str()).collect();
        assert_eq!(ids, vec!["queen-bohemian-rhapsody", "eagles-hotel-california"]);
    }
}
