//! Tolerant scanning of rendered article markup.
//!
//! Not a DOM parser: it walks tags case-insensitively, tracks `<table>` nesting
//! and slices raw cell content out of the document.
//! Cell text is cleaned separately so callers can decide which cells matter.

/// One `<table>` element with the raw inner markup of each cell, row by row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkupTable {
    pub rows: Vec<Vec<String>>,
}

impl MarkupTable {
    /// Widest row among the first `leading_rows` rows.
    pub fn max_cells_in_leading_rows(&self, leading_rows: usize) -> usize {
        self.rows
            .iter()
            .take(leading_rows)
            .map(Vec::len)
            .max()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Tag<'a> {
    /// Lowercased element name.
    pub name: String,
    pub closing: bool,
    pub self_closing: bool,
    pub attrs: &'a str,
    pub start: usize,
    pub end: usize,
}

/// Iterates over element tags, skipping comments, doctypes and raw-text content.
pub(crate) struct TagScanner<'a> {
    markup: &'a str,
    lower: String,
    pos: usize,
}

impl<'a> TagScanner<'a> {
    pub fn new(markup: &'a str) -> Self {
        Self {
            markup,
            lower: markup.to_ascii_lowercase(),
            pos: 0,
        }
    }

    fn find_tag_end(&self, from: usize) -> Option<usize> {
        let bytes = self.markup.as_bytes();
        let mut quote: Option<u8> = None;
        for (offset, &byte) in bytes[from..].iter().enumerate() {
            match quote {
                Some(open) if byte == open => quote = None,
                Some(_) => {}
                None if byte == b'"' || byte == b'\'' => quote = Some(byte),
                None if byte == b'>' => return Some(from + offset),
                None => {}
            }
        }
        None
    }
}

impl<'a> Iterator for TagScanner<'a> {
    type Item = Tag<'a>;

    fn next(&mut self) -> Option<Tag<'a>> {
        let bytes = self.markup.as_bytes();
        loop {
            let start = self.pos + self.markup[self.pos..].find('<')?;

            if self.lower[start..].starts_with("<!--") {
                self.pos = match self.lower[start + 4..].find("-->") {
                    Some(offset) => start + 4 + offset + 3,
                    None => self.markup.len(),
                };
                continue;
            }

            let mut cursor = start + 1;
            let closing = bytes.get(cursor) == Some(&b'/');
            if closing {
                cursor += 1;
            }
            let name_start = cursor;
            while cursor < bytes.len() && bytes[cursor].is_ascii_alphanumeric() {
                cursor += 1;
            }
            if cursor == name_start {
                // Doctype, processing instruction or a stray '<' in text.
                if matches!(bytes.get(start + 1), Some(b'!') | Some(b'?')) {
                    self.pos = self
                        .find_tag_end(start + 1)
                        .map(|end| end + 1)
                        .unwrap_or(self.markup.len());
                } else {
                    self.pos = start + 1;
                }
                continue;
            }

            let Some(close) = self.find_tag_end(cursor) else {
                self.pos = self.markup.len();
                return None;
            };
            let name = self.lower[name_start..cursor].to_string();
            let raw_attrs = &self.markup[cursor..close];
            let self_closing = raw_attrs.trim_end().ends_with('/');
            let attrs = raw_attrs.trim().trim_end_matches('/').trim_end();
            self.pos = close + 1;

            if !closing && !self_closing && is_raw_text_element(&name) {
                let terminator = format!("</{name}");
                self.pos = match self.lower[self.pos..].find(&terminator) {
                    Some(offset) => self.pos + offset,
                    None => self.markup.len(),
                };
            }

            return Some(Tag {
                name,
                closing,
                self_closing,
                attrs,
                start,
                end: close + 1,
            });
        }
    }
}

fn is_raw_text_element(name: &str) -> bool {
    matches!(name, "script" | "style")
}

fn is_void_element(name: &str) -> bool {
    matches!(
        name,
        "br" | "img" | "hr" | "meta" | "link" | "input" | "col" | "wbr" | "source"
    )
}

#[derive(Debug)]
struct TableBuilder {
    start: usize,
    rows: Vec<Vec<String>>,
    row: Option<Vec<String>>,
    cell_start: Option<usize>,
}

impl TableBuilder {
    fn new(start: usize) -> Self {
        Self {
            start,
            rows: Vec::new(),
            row: None,
            cell_start: None,
        }
    }

    fn close_cell(&mut self, markup: &str, at: usize) {
        if let Some(cell_start) = self.cell_start.take() {
            let content = markup.get(cell_start..at).unwrap_or_default().to_string();
            self.row.get_or_insert_with(Vec::new).push(content);
        }
    }

    fn close_row(&mut self, markup: &str, at: usize) {
        self.close_cell(markup, at);
        if let Some(row) = self.row.take() {
            self.rows.push(row);
        }
    }
}

/// Enumerates every table in document order, nested tables included.
///
/// A nested table's rows belong only to the nested table; its markup stays inside
/// the enclosing cell's raw content.
pub fn find_tables(markup: &str) -> Vec<MarkupTable> {
    let mut open: Vec<TableBuilder> = Vec::new();
    let mut finished: Vec<(usize, MarkupTable)> = Vec::new();

    for tag in TagScanner::new(markup) {
        match (tag.name.as_str(), tag.closing) {
            ("table", false) => open.push(TableBuilder::new(tag.start)),
            ("table", true) => {
                if let Some(mut table) = open.pop() {
                    table.close_row(markup, tag.start);
                    finished.push((table.start, MarkupTable { rows: table.rows }));
                }
            }
            ("tr", false) => {
                if let Some(table) = open.last_mut() {
                    table.close_row(markup, tag.start);
                    table.row = Some(Vec::new());
                }
            }
            ("tr", true) => {
                if let Some(table) = open.last_mut() {
                    table.close_row(markup, tag.start);
                }
            }
            ("td" | "th", false) => {
                if let Some(table) = open.last_mut() {
                    table.close_cell(markup, tag.start);
                    table.row.get_or_insert_with(Vec::new);
                    table.cell_start = Some(tag.end);
                }
            }
            ("td" | "th", true) => {
                if let Some(table) = open.last_mut() {
                    table.close_cell(markup, tag.start);
                }
            }
            _ => {}
        }
    }

    // Unterminated tables still count; upstream markup is not trusted to be balanced.
    while let Some(mut table) = open.pop() {
        table.close_row(markup, markup.len());
        finished.push((table.start, MarkupTable { rows: table.rows }));
    }

    finished.sort_by_key(|(start, _)| *start);
    finished.into_iter().map(|(_, table)| table).collect()
}

/// Drops every element (with its content) whose opening tag matches `should_remove`.
pub(crate) fn remove_elements<F>(html: &str, should_remove: F) -> String
where
    F: Fn(&Tag<'_>) -> bool,
{
    let mut out = String::with_capacity(html.len());
    let mut kept_from = 0usize;
    let mut removing: Option<(String, usize)> = None;

    for tag in TagScanner::new(html) {
        let mut finished_removal = false;
        if let Some((name, depth)) = removing.as_mut() {
            if tag.name == *name {
                if tag.closing {
                    *depth -= 1;
                    finished_removal = *depth == 0;
                } else if !tag.self_closing {
                    *depth += 1;
                }
            }
            if finished_removal {
                kept_from = tag.end;
                removing = None;
            }
            continue;
        }

        if tag.closing || !should_remove(&tag) {
            continue;
        }
        out.push_str(&html[kept_from..tag.start]);
        kept_from = tag.end;
        if !tag.self_closing && !is_void_element(&tag.name) {
            removing = Some((tag.name.clone(), 1));
        }
    }

    if removing.is_none() {
        out.push_str(&html[kept_from..]);
    }
    out
}

fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut kept_from = 0usize;
    for tag in TagScanner::new(html) {
        out.push_str(&html[kept_from..tag.start]);
        if matches!(tag.name.as_str(), "br" | "p" | "div" | "li") {
            out.push(' ');
        }
        kept_from = tag.end;
    }
    out.push_str(&html[kept_from..]);
    out
}

fn is_citation_noise(tag: &Tag<'_>) -> bool {
    match tag.name.as_str() {
        "sup" | "style" | "script" => true,
        "span" => {
            let attrs = tag.attrs.to_ascii_lowercase();
            let compact: String = attrs.chars().filter(|ch| !ch.is_whitespace()).collect();
            attrs.contains("sortkey") || compact.contains("display:none")
        }
        _ => false,
    }
}

/// Decodes the named entities that appear in rendered wiki markup plus numeric forms.
pub fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let candidate = &rest[amp..];
        let decoded = candidate
            .find(';')
            .filter(|semi| *semi <= 12)
            .and_then(|semi| decode_entity(&candidate[1..semi]).map(|ch| (ch, semi)));
        match decoded {
            Some((ch, semi)) => {
                out.push(ch);
                rest = &candidate[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    if let Some(numeric) = entity.strip_prefix('#') {
        let code = match numeric.strip_prefix(|ch: char| ch == 'x' || ch == 'X') {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => numeric.parse::<u32>().ok()?,
        };
        return char::from_u32(code);
    }
    let ch = match entity {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "shy" => '\u{ad}',
        "ndash" => '\u{2013}',
        "mdash" => '\u{2014}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201c}',
        "rdquo" => '\u{201d}',
        "hellip" => '\u{2026}',
        _ => return None,
    };
    Some(ch)
}

/// Collapses all whitespace (including no-break spaces) to single spaces.
pub fn normalize_whitespace(text: &str) -> String {
    text.split(|ch: char| ch.is_whitespace() || ch == '\u{a0}')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Visible text of a cell with citations, sort keys and embedded styles removed.
pub fn clean_cell_text(raw: &str) -> String {
    let without_noise = remove_elements(raw, is_citation_noise);
    normalize_whitespace(&decode_entities(&strip_tags(&without_noise)))
}
