//! Bibliography export parsing into keyed snapshots.
//!
//! Entries are located by their layout in the export: an entry starts on a
//! line beginning with `@type{` and ends at the first later line beginning
//! with `}`. The exact substring between the two is kept as the entry's raw
//! text; field extraction runs on top of that and never fails the entry.

use bibsync_types::{CitationKey, EntryType};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::{FilesystemError, SyncError};

/// What to do with an entry whose boundaries or key cannot be recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseMode {
    /// Abort the whole parse.
    Strict,
    /// Skip the entry and record a warning.
    #[default]
    Lenient,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Malformed entry at line {line} (byte {offset}): {reason}")]
    Malformed {
        line: usize,
        offset: usize,
        reason: String,
    },
}

/// Structural problems found while parsing in lenient mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParseWarning {
    SkippedEntry {
        line: usize,
        reason: String,
    },
    DuplicateKey {
        key: CitationKey,
        line: usize,
        previous_line: usize,
    },
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseWarning::SkippedEntry { line, reason } => {
                write!(f, "skipped malformed entry at line {}: {}", line, reason)
            }
            ParseWarning::DuplicateKey {
                key,
                line,
                previous_line,
            } => write!(
                f,
                "duplicate key '{}' at line {} replaces the entry from line {}",
                key, line, previous_line
            ),
        }
    }
}

/// One bibliography entry as captured from an export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BibEntry {
    key: CitationKey,
    entry_type: EntryType,
    fields: BTreeMap<String, String>,
    opaque: Vec<String>,
    raw: String,
    line: usize,
}

impl BibEntry {
    pub fn key(&self) -> &CitationKey {
        &self.key
    }

    pub fn entry_type(&self) -> &EntryType {
        &self.entry_type
    }

    /// Lookup a field value by name, case-insensitively.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// All parsed fields, keyed by lowercased name.
    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    /// Field segments that did not parse as `name = value`, verbatim.
    pub fn opaque(&self) -> &[String] {
        &self.opaque
    }

    /// The exact text of the entry in the export it was parsed from.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// 1-based line of the entry's `@` marker.
    pub fn line(&self) -> usize {
        self.line
    }
}

/// Point-in-time bibliography state, keyed by citation key.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    entries: HashMap<CitationKey, BibEntry>,
    order: Vec<CitationKey>,
}

impl Snapshot {
    /// Parse export text with the default [`BibtexParser`].
    pub fn parse(input: &str, mode: ParseMode) -> Result<ParseOutcome, ParseError> {
        BibtexParser::new(mode).parse(input)
    }

    /// Read and parse an export file.
    pub fn load(path: &Path, mode: ParseMode) -> Result<ParseOutcome, SyncError> {
        let contents =
            fs::read_to_string(path).map_err(|e| FilesystemError::new("read", path, e))?;
        let outcome = Self::parse(&contents, mode)?;
        debug!(
            path = %path.display(),
            entries = outcome.snapshot.len(),
            warnings = outcome.warnings.len(),
            "loaded bibliography snapshot"
        );
        Ok(outcome)
    }

    /// Lookup an entry by citation key.
    pub fn get(&self, key: &str) -> Option<&BibEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Entries in document order.
    pub fn iter(&self) -> impl Iterator<Item = &BibEntry> {
        self.order.iter().filter_map(|key| self.entries.get(key))
    }

    /// Citation keys in document order.
    pub fn keys(&self) -> impl Iterator<Item = &CitationKey> {
        self.order.iter()
    }

    pub fn key_set(&self) -> BTreeSet<CitationKey> {
        self.order.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Insert an entry, last wins. Returns the replaced entry's line.
    fn insert(&mut self, entry: BibEntry) -> Option<usize> {
        let key = entry.key.clone();
        match self.entries.insert(key.clone(), entry) {
            Some(previous) => Some(previous.line),
            None => {
                self.order.push(key);
                None
            }
        }
    }
}

/// Result of a successful parse.
#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    pub snapshot: Snapshot,
    pub warnings: Vec<ParseWarning>,
}

/// A parser for one bibliography grammar.
pub trait BibParser {
    fn parse(&self, input: &str) -> Result<ParseOutcome, ParseError>;
}

/// Layout-driven BibTeX/BibLaTeX parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct BibtexParser {
    mode: ParseMode,
}

impl BibtexParser {
    pub fn new(mode: ParseMode) -> Self {
        Self { mode }
    }

    fn reject(
        &self,
        warnings: &mut Vec<ParseWarning>,
        line: usize,
        offset: usize,
        reason: impl Into<String>,
    ) -> Result<(), ParseError> {
        let reason = reason.into();
        match self.mode {
            ParseMode::Strict => Err(ParseError::Malformed {
                line,
                offset,
                reason,
            }),
            ParseMode::Lenient => {
                warn!(line, %reason, "skipping malformed bibliography entry");
                warnings.push(ParseWarning::SkippedEntry { line, reason });
                Ok(())
            }
        }
    }
}

struct Line<'a> {
    offset: usize,
    number: usize,
    text: &'a str,
}

impl BibParser for BibtexParser {
    fn parse(&self, input: &str) -> Result<ParseOutcome, ParseError> {
        let lines = split_lines(input);
        let mut snapshot = Snapshot::default();
        let mut warnings = Vec::new();

        let mut i = 0;
        while i < lines.len() {
            let line = &lines[i];
            if !line.text.starts_with('@') {
                i += 1;
                continue;
            }

            let Some(header) = HEADER_RE.captures(line.text) else {
                self.reject(
                    &mut warnings,
                    line.number,
                    line.offset,
                    "expected `@type{` at the start of an entry",
                )?;
                i += 1;
                continue;
            };

            let kind = header.get(1).map(|m| m.as_str()).unwrap_or_default();
            if is_special_block(kind) {
                let open = line.offset + header.get(0).map(|m| m.end()).unwrap_or(1) - 1;
                debug!(line = line.number, kind, "skipping non-entry block");
                i = match matching_brace(input, open) {
                    Some(close) => lines
                        .iter()
                        .position(|l| l.offset + l.text.len() > close)
                        .map(|pos| pos + 1)
                        .unwrap_or(lines.len()),
                    None => i + 1,
                };
                continue;
            }

            let mut close = None;
            let mut j = i + 1;
            while j < lines.len() {
                if lines[j].text.starts_with('}') {
                    close = Some(j);
                    break;
                }
                if lines[j].text.starts_with('@') {
                    break;
                }
                j += 1;
            }

            let Some(end) = close else {
                self.reject(
                    &mut warnings,
                    line.number,
                    line.offset,
                    "entry is not closed by a `}` at the start of a line",
                )?;
                i = j;
                continue;
            };

            let raw = &input[line.offset..=lines[end].offset];
            match build_entry(raw, line.number) {
                Ok(entry) => {
                    let key = entry.key.clone();
                    if let Some(previous_line) = snapshot.insert(entry) {
                        warn!(%key, line = line.number, previous_line, "duplicate citation key");
                        warnings.push(ParseWarning::DuplicateKey {
                            key,
                            line: line.number,
                            previous_line,
                        });
                    }
                }
                Err(reason) => self.reject(&mut warnings, line.number, line.offset, reason)?,
            }
            i = end + 1;
        }

        Ok(ParseOutcome { snapshot, warnings })
    }
}

fn split_lines(input: &str) -> Vec<Line<'_>> {
    let mut offset = 0;
    input
        .split_inclusive('\n')
        .enumerate()
        .map(|(idx, text)| {
            let line = Line {
                offset,
                number: idx + 1,
                text,
            };
            offset += text.len();
            line
        })
        .collect()
}

fn is_special_block(kind: &str) -> bool {
    matches!(
        kind.to_ascii_lowercase().as_str(),
        "comment" | "preamble" | "string"
    )
}

/// Byte index of the brace closing the one at `open`.
fn matching_brace(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, byte) in text.bytes().enumerate().skip(open) {
        match byte {
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

fn build_entry(raw: &str, line: usize) -> Result<BibEntry, String> {
    let header = HEADER_RE
        .captures(raw)
        .ok_or_else(|| "expected `@type{` at the start of an entry".to_string())?;
    let kind = header.get(1).map(|m| m.as_str()).unwrap_or_default();
    let header_end = header.get(0).map(|m| m.end()).unwrap_or_default();

    // Drop the closing brace; the caller guarantees `raw` ends with it.
    let body = &raw[header_end..raw.len() - 1];
    let key_end = body.find(',').unwrap_or(body.len());
    let key = body[..key_end].trim();

    if key.is_empty() {
        return Err("empty citation key".to_string());
    }
    if key.contains(|c: char| c.is_whitespace() || c == '{' || c == '}') {
        return Err(format!("invalid citation key `{}`", key));
    }

    let rest = body.get(key_end + 1..).unwrap_or_default();
    let (fields, opaque) = parse_fields(rest);

    Ok(BibEntry {
        key: CitationKey::new(key),
        entry_type: EntryType::parse(kind),
        fields,
        opaque,
        raw: raw.to_string(),
        line,
    })
}

fn parse_fields(text: &str) -> (BTreeMap<String, String>, Vec<String>) {
    let mut fields = BTreeMap::new();
    let mut opaque = Vec::new();

    for segment in split_top_level(text) {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        match segment.split_once('=') {
            Some((name, value)) if FIELD_NAME_RE.is_match(name.trim()) => {
                fields.insert(
                    name.trim().to_ascii_lowercase(),
                    strip_delimiters(value.trim()).to_string(),
                );
            }
            _ => opaque.push(segment.to_string()),
        }
    }

    (fields, opaque)
}

/// Split on commas outside braces and quotes.
fn split_top_level(text: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut start = 0;

    for (idx, ch) in text.char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            '"' if depth == 0 => in_quotes = !in_quotes,
            ',' if depth == 0 && !in_quotes => {
                segments.push(&text[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    segments.push(&text[start..]);
    segments
}

fn strip_delimiters(value: &str) -> &str {
    if value.starts_with('{') && matching_brace(value, 0) == Some(value.len() - 1) {
        &value[1..value.len() - 1]
    } else if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

static HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^@\s*(\w+)\s*\{").expect("valid entry header regex"));

static FIELD_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_\-:.+]*$").expect("valid field name regex"));

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = "@article{smith2020,\n  title = {Deep {Learning} for Cats.},\n  author = {Smith, John and Doe, Jane},\n  year = 2020,\n  journal = \"Cat Review\"\n}\n\n@book{knuth1984,\n  title = {The {TeXbook}},\n  publisher = {Addison-Wesley}\n}\n";

    fn lenient(input: &str) -> ParseOutcome {
        Snapshot::parse(input, ParseMode::Lenient).unwrap()
    }

    #[test]
    fn test_entries_keep_exact_raw_text() {
        let outcome = lenient(EXPORT);
        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.snapshot.len(), 2);

        let smith = outcome.snapshot.get("smith2020").unwrap();
        assert!(smith.raw().starts_with("@article{smith2020,"));
        assert!(smith.raw().ends_with("\"Cat Review\"\n}"));
        assert!(EXPORT.contains(smith.raw()));
        assert_eq!(smith.line(), 1);
        assert_eq!(outcome.snapshot.get("knuth1984").unwrap().line(), 8);
    }

    #[test]
    fn test_raw_text_round_trips() {
        let outcome = lenient(EXPORT);
        for entry in outcome.snapshot.iter() {
            let reparsed = lenient(entry.raw());
            let again = reparsed.snapshot.get(entry.key().as_str()).unwrap();
            assert_eq!(again.raw().as_bytes(), entry.raw().as_bytes());
        }
    }

    #[test]
    fn test_field_extraction() {
        let outcome = lenient(EXPORT);
        let smith = outcome.snapshot.get("smith2020").unwrap();
        assert_eq!(smith.entry_type(), &EntryType::Article);
        assert_eq!(smith.field("title"), Some("Deep {Learning} for Cats."));
        assert_eq!(smith.field("TITLE"), Some("Deep {Learning} for Cats."));
        assert_eq!(smith.field("author"), Some("Smith, John and Doe, Jane"));
        assert_eq!(smith.field("year"), Some("2020"));
        assert_eq!(smith.field("journal"), Some("Cat Review"));
        assert!(!smith.has_field("doi"));
    }

    #[test]
    fn test_document_order_is_preserved() {
        let input = "@misc{zeta,\n title={Z}\n}\n@misc{alpha,\n title={A}\n}\n";
        let outcome = lenient(input);
        let keys: Vec<&str> = outcome.snapshot.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_duplicate_keys_last_wins_and_are_flagged() {
        let input = "@misc{dup,\n title={First}\n}\n@misc{dup,\n title={Second}\n}\n";
        let outcome = lenient(input);
        assert_eq!(outcome.snapshot.len(), 1);
        assert_eq!(
            outcome.snapshot.get("dup").unwrap().field("title"),
            Some("Second")
        );
        assert_eq!(
            outcome.warnings,
            vec![ParseWarning::DuplicateKey {
                key: CitationKey::new("dup"),
                line: 4,
                previous_line: 1,
            }]
        );
    }

    #[test]
    fn test_strict_mode_names_position() {
        let input = "@misc{ok,\n title={Fine}\n}\n@misc{,\n title={No key}\n}\n";
        let err = Snapshot::parse(input, ParseMode::Strict).unwrap_err();
        match err {
            ParseError::Malformed { line, offset, .. } => {
                assert_eq!(line, 4);
                assert_eq!(offset, input.find("@misc{,").unwrap());
            }
        }
    }

    #[test]
    fn test_lenient_mode_skips_malformed_entries() {
        let input = "@misc{open,\n title={Never closed}\n@misc{next,\n title={Fine}\n}\n";
        let outcome = lenient(input);
        assert_eq!(outcome.snapshot.len(), 1);
        assert!(outcome.snapshot.contains("next"));
        assert!(matches!(
            outcome.warnings.as_slice(),
            [ParseWarning::SkippedEntry { line: 1, .. }]
        ));
    }

    #[test]
    fn test_malformed_fields_are_kept_opaque() {
        let input = "@misc{odd,\n title = {Fine},\n this is not a field,\n note = {A} # {B}\n}\n";
        let outcome = lenient(input);
        let entry = outcome.snapshot.get("odd").unwrap();
        assert_eq!(entry.field("title"), Some("Fine"));
        assert_eq!(entry.field("note"), Some("{A} # {B}"));
        assert_eq!(entry.opaque(), &["this is not a field".to_string()]);
    }

    #[test]
    fn test_special_blocks_are_not_entries() {
        let input = "@comment{jabref-meta: databaseType:bibtex;}\n@string{jn = {Journal}}\n@misc{real,\n title={Kept}\n}\n";
        let outcome = lenient(input);
        assert!(outcome.warnings.is_empty());
        let keys: Vec<&str> = outcome.snapshot.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["real"]);
    }

    #[test]
    fn test_crlf_exports() {
        let input = "@misc{win,\r\n title={Windows}\r\n}\r\n";
        let outcome = lenient(input);
        let entry = outcome.snapshot.get("win").unwrap();
        assert_eq!(entry.raw(), "@misc{win,\r\n title={Windows}\r\n}");
        assert_eq!(entry.field("title"), Some("Windows"));
    }

    #[test]
    fn test_load_missing_file_is_filesystem_error() {
        let err = Snapshot::load(Path::new("/nonexistent/refs.bib"), ParseMode::Lenient)
            .unwrap_err();
        assert!(matches!(err, SyncError::Filesystem(_)));
    }
}
