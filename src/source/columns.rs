//! Column classification for the ranking grid header.
//!
//! Header text drifts between revisions of the article (footnote markers, soft
//! hyphens, `'99` vs `1999`), so each cell is normalized and then run through an
//! ordered list of independent rules. The first rule that matches wins.

use log::{debug, warn};

use super::markup::clean_cell_text;

/// How many leading rows may carry header cells.
pub const HEADER_SCAN_ROWS: usize = 3;
/// Scanning stops once a row pushes the edition column count past this.
pub const EDITION_COLUMNS_ENOUGH: usize = 5;
pub const FIRST_EDITION_YEAR: u16 = 1999;
pub const LAST_EDITION_YEAR: u16 = 2030;
/// Two-digit years at or above the pivot belong to the 1900s.
pub const TWO_DIGIT_YEAR_PIVOT: u16 = 90;
/// Positional fallback used only when header text does not name the column.
/// This breaks as soon as the article reorders its leading columns.
pub const FALLBACK_ARTIST_INDEX: usize = 0;
pub const FALLBACK_TITLE_INDEX: usize = 1;

const YEAR_QUOTE_MARKS: [char; 5] = ['\'', '\u{2019}', '\u{2018}', '`', '\u{b4}'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    Artist,
    Title,
    ReleaseYear,
    Edition(u16),
}

/// Column index per role for the selected table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    pub artist: Option<usize>,
    pub title: Option<usize>,
    pub release_year: Option<usize>,
    /// `(column index, edition year)` in column order.
    pub editions: Vec<(usize, u16)>,
    /// Leading rows that carried header cells; data starts after them.
    pub header_rows: usize,
}

impl ColumnMap {
    pub fn max_index(&self) -> Option<usize> {
        self.artist
            .into_iter()
            .chain(self.title)
            .chain(self.release_year)
            .chain(self.editions.iter().map(|(index, _)| *index))
            .max()
    }

    fn is_mapped(&self, index: usize) -> bool {
        self.artist == Some(index)
            || self.title == Some(index)
            || self.release_year == Some(index)
            || self.editions.iter().any(|(mapped, _)| *mapped == index)
    }

    /// Returns whether `role` was newly assigned to `index`.
    fn assign(&mut self, index: usize, role: ColumnRole) -> bool {
        if self.is_mapped(index) {
            return false;
        }
        match role {
            ColumnRole::Artist if self.artist.is_none() => self.artist = Some(index),
            ColumnRole::Title if self.title.is_none() => self.title = Some(index),
            ColumnRole::ReleaseYear if self.release_year.is_none() => {
                self.release_year = Some(index)
            }
            ColumnRole::Edition(year) if !self.editions.iter().any(|(_, seen)| *seen == year) => {
                self.editions.push((index, year));
            }
            _ => return false,
        }
        true
    }

    /// First unmapped column at or after `preferred`, within `width`.
    fn free_column_from(&self, preferred: usize, width: usize) -> Option<usize> {
        (preferred..width.max(preferred + 1)).find(|index| !self.is_mapped(*index))
    }
}

pub type HeaderRule = fn(&str) -> Option<ColumnRole>;

/// Evaluated in order against a normalized header; first match wins.
pub const HEADER_RULES: &[HeaderRule] = &[
    artist_rule,
    title_rule,
    release_year_rule,
    edition_year_rule,
];

pub fn artist_rule(header: &str) -> Option<ColumnRole> {
    header.contains("artiest").then_some(ColumnRole::Artist)
}

pub fn title_rule(header: &str) -> Option<ColumnRole> {
    (header.contains("titel") || header == "nummer").then_some(ColumnRole::Title)
}

pub fn release_year_rule(header: &str) -> Option<ColumnRole> {
    let has_token = header
        .split(|ch: char| !ch.is_alphanumeric())
        .any(|token| token == "jaar");
    let has_digits = header.chars().any(|ch| ch.is_ascii_digit());
    (has_token && !has_digits).then_some(ColumnRole::ReleaseYear)
}

pub fn edition_year_rule(header: &str) -> Option<ColumnRole> {
    parse_edition_year(header).map(ColumnRole::Edition)
}

/// Parses `1999`, `99`, `'99` or `’05` into a four-digit edition year.
pub fn parse_edition_year(header: &str) -> Option<u16> {
    let trimmed = header.trim();
    let digits = trimmed
        .strip_prefix(&YEAR_QUOTE_MARKS[..])
        .unwrap_or(trimmed)
        .trim_start();
    if !digits.chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }
    let year = match digits.len() {
        2 => {
            let short = digits.parse::<u16>().ok()?;
            if short >= TWO_DIGIT_YEAR_PIVOT {
                1900 + short
            } else {
                2000 + short
            }
        }
        4 => digits.parse::<u16>().ok()?,
        _ => return None,
    };
    (FIRST_EDITION_YEAR..=LAST_EDITION_YEAR)
        .contains(&year)
        .then_some(year)
}

/// Strips invisible characters, lowercases and trims header text.
pub fn normalize_header(text: &str) -> String {
    text.chars()
        .filter(|ch| {
            !matches!(
                ch,
                '\u{ad}' | '\u{a0}' | '\u{200b}' | '\u{200c}' | '\u{200d}' | '\u{2060}' | '\u{feff}'
            )
        })
        .collect::<String>()
        .to_lowercase()
        .trim()
        .to_string()
}

pub fn classify_header(normalized: &str) -> Option<ColumnRole> {
    if normalized.is_empty() {
        return None;
    }
    HEADER_RULES.iter().find_map(|rule| rule(normalized))
}

/// Builds the column map from the leading rows of the ranking table.
pub fn map_columns(rows: &[Vec<String>]) -> ColumnMap {
    let mut map = ColumnMap::default();
    let mut width = 0;

    for (row_index, row) in rows.iter().take(HEADER_SCAN_ROWS).enumerate() {
        width = width.max(row.len());
        let mut assigned_any = false;
        for (index, raw) in row.iter().enumerate() {
            let header = normalize_header(&clean_cell_text(raw));
            if let Some(role) = classify_header(&header) {
                assigned_any |= map.assign(index, role);
            }
        }
        if assigned_any {
            map.header_rows = row_index + 1;
        }
        if map.editions.len() > EDITION_COLUMNS_ENOUGH {
            debug!(
                "Column mapping: {} edition columns found by header row {}",
                map.editions.len(),
                row_index
            );
            break;
        }
    }

    if map.artist.is_none() {
        map.artist = map.free_column_from(FALLBACK_ARTIST_INDEX, width);
        warn!(
            "Column mapping: no artist header matched; falling back to column {:?}",
            map.artist
        );
    }
    if map.title.is_none() {
        map.title = map.free_column_from(FALLBACK_TITLE_INDEX, width);
        warn!(
            "Column mapping: no title header matched; falling back to column {:?}",
            map.title
        );
    }
    map
}

#[cfg(test)]
mod tests {
    use super::{
        artist_rule, classify_header, edition_year_rule, map_columns, normalize_header,
        parse_edition_year, release_year_rule, title_rule, ColumnRole,
    };

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|cell| cell.to_string()).collect()
    }

    #[test]
    fn test_artist_rule_matches_substring() {
        assert_eq!(artist_rule("artiest(en)"), Some(ColumnRole::Artist));
        assert_eq!(artist_rule("titel"), None);
    }

    #[test]
    fn test_title_rule_matches_titel_or_exact_nummer() {
        assert_eq!(title_rule("titel"), Some(ColumnRole::Title));
        assert_eq!(title_rule("nummer"), Some(ColumnRole::Title));
        assert_eq!(title_rule("nummer 1"), None);
    }

    #[test]
    fn test_release_year_rule_rejects_digits() {
        assert_eq!(release_year_rule("jaar"), Some(ColumnRole::ReleaseYear));
        assert_eq!(release_year_rule("jaar 2024"), None);
        assert_eq!(release_year_rule("jaartal"), None);
    }

    #[test]
    fn test_edition_year_rule_maps_two_digit_years_with_pivot() {
        assert_eq!(edition_year_rule("'99"), Some(ColumnRole::Edition(1999)));
        assert_eq!(edition_year_rule("\u{2019}05"), Some(ColumnRole::Edition(2005)));
        assert_eq!(edition_year_rule("24"), Some(ColumnRole::Edition(2024)));
        assert_eq!(edition_year_rule("2030"), Some(ColumnRole::Edition(2030)));
    }

    #[test]
    fn test_parse_edition_year_rejects_out_of_range_and_noise() {
        assert_eq!(parse_edition_year("95"), None);
        assert_eq!(parse_edition_year("1998"), None);
        assert_eq!(parse_edition_year("2031"), None);
        assert_eq!(parse_edition_year("199"), None);
        assert_eq!(parse_edition_year("'9a"), None);
        assert_eq!(parse_edition_year(""), None);
    }

    #[test]
    fn test_normalize_header_strips_invisible_characters() {
        assert_eq!(normalize_header(" Ar\u{ad}tiest\u{200b} "), "artiest");
        assert_eq!(normalize_header("\u{feff}TITEL"), "titel");
    }

    #[test]
    fn test_classify_header_prefers_earlier_rules() {
        assert_eq!(classify_header("artiest titel"), Some(ColumnRole::Artist));
        assert_eq!(classify_header(""), None);
        assert_eq!(classify_header("positie"), None);
    }

    #[test]
    fn test_map_columns_reads_header_row() {
        let rows = vec![
            row(&[
                "Artiest<sup>[1]</sup>",
                "Titel",
                "Jaar",
                "'99",
                "'00",
                "'01",
                "'02",
                "'03",
                "'04",
            ]),
            row(&["Queen", "Bohemian Rhapsody", "1975", "1", "1", "2", "1", "2", "1"]),
        ];
        let map = map_columns(&rows);
        assert_eq!(map.artist, Some(0));
        assert_eq!(map.title, Some(1));
        assert_eq!(map.release_year, Some(2));
        assert_eq!(map.editions.len(), 6);
        assert_eq!(map.editions[0], (3, 1999));
        assert_eq!(map.editions[5], (8, 2004));
        assert_eq!(map.max_index(), Some(8));
        assert_eq!(map.header_rows, 1);
    }

    #[test]
    fn test_map_columns_scans_following_rows_until_enough_editions() {
        let rows = vec![
            row(&["Nr.", "Artiest", "Nummer", "Jaar", "Noteringen"]),
            row(&["", "", "", "", "1999", "2000", "2001", "2002", "2003", "2004"]),
            row(&["1", "Queen", "Bohemian Rhapsody", "1975", "1", "1", "2", "1", "2", "1"]),
        ];
        let map = map_columns(&rows);
        assert_eq!(map.artist, Some(1));
        assert_eq!(map.title, Some(2));
        assert_eq!(map.release_year, Some(3));
        assert_eq!(map.editions.first(), Some(&(4, 1999)));
        assert_eq!(map.editions.len(), 6);
        assert_eq!(map.header_rows, 2);
    }

    #[test]
    fn test_map_columns_falls_back_to_positions() {
        let rows = vec![row(&["Wie", "Wat", "'99", "'00"])];
        let map = map_columns(&rows);
        assert_eq!(map.artist, Some(0));
        assert_eq!(map.title, Some(1));
        assert_eq!(map.editions, vec![(2, 1999), (3, 2000)]);
    }

    #[test]
    fn test_map_columns_stops_scanning_once_editions_are_found() {
        let rows = vec![
            row(&["Wie", "Wat", "'99", "'00", "'01", "'02", "'03", "'04"]),
            row(&["", "Artiest", "Titel", "", "", "", "", ""]),
            row(&["Queen", "Bohemian Rhapsody", "1", "1", "2", "1", "2", "1"]),
        ];
        let map = map_columns(&rows);
        assert_eq!(map.editions.len(), 6);
        assert_eq!(map.artist, Some(0));
        assert_eq!(map.title, Some(1));
        assert_eq!(map.header_rows, 1);
    }

    #[test]
    fn test_title_fallback_skips_column_taken_by_artist() {
        let rows = vec![row(&["Nr.", "Artiest", "Wat", "'99", "'00"])];
        let map = map_columns(&rows);
        assert_eq!(map.artist, Some(1));
        assert_eq!(map.title, Some(2));
    }

    #[test]
    fn test_fallback_leaves_role_unmapped_when_no_column_is_free() {
        let rows = vec![row(&["Artiest", "'99"])];
        let map = map_columns(&rows);
        assert_eq!(map.artist, Some(0));
        assert_eq!(map.title, None);
    }
}
