//! Frontmatter extraction for markdown sub-notes.
//!
//! # Responsibility
//! - Detect a `---` delimited block anchored at the very start of the text.
//! - Parse the block body with the flat grammar `line := key ":" value`.
//! - Coerce recognized keys onto the owning note's typed columns and store
//!   the full mapping under the `frontmatter` metadata key.
//!
//! # Invariants
//! - Parsing or coercion failure never touches typed columns; the raw block
//!   is stored under `frontmatter_raw` instead.
//! - Only recognized keys present in the block are written; absent keys leave
//!   their column untouched, empty values clear it.
//! - The sub-note text itself is never rewritten.

use crate::index::IndexResult;
use crate::model::note::{
    NoteFrontmatterPatch, NoteId, METADATA_FRONTMATTER_KEY, METADATA_FRONTMATTER_RAW_KEY,
};
use crate::repo::note_repo::{NoteRepository, SqliteNoteRepository};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use log::{debug, warn};
use rusqlite::Connection;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

const MARKER: &str = "---";
const DATE_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Frontmatter keys projected onto typed note columns.
pub const RECOGNIZED_KEYS: [&str; 8] = [
    "status",
    "priority",
    "due_date",
    "author",
    "category",
    "template",
    "type",
    "last_reviewed_at",
];

/// Flat key/value mapping parsed from a block body.
pub type FrontmatterMap = BTreeMap<String, String>;

/// Parse and coercion failures. Never surfaced to content writers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrontmatterError {
    /// Body line is not `key: value` (lists, nesting, bare words).
    MalformedLine { line: usize, text: String },
    /// Key is empty or contains characters outside `[A-Za-z0-9_-]`.
    InvalidKey { line: usize, key: String },
    InvalidInteger { key: String, value: String },
    InvalidDate { key: String, value: String },
    InvalidTimestamp { key: String, value: String },
}

impl FrontmatterError {
    /// Stable code used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedLine { .. } => "malformed_line",
            Self::InvalidKey { .. } => "invalid_key",
            Self::InvalidInteger { .. } => "invalid_integer",
            Self::InvalidDate { .. } => "invalid_date",
            Self::InvalidTimestamp { .. } => "invalid_timestamp",
        }
    }
}

impl Display for FrontmatterError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedLine { line, text } => {
                write!(f, "line {line}: expected `key: value`, got `{text}`")
            }
            Self::InvalidKey { line, key } => write!(f, "line {line}: invalid key `{key}`"),
            Self::InvalidInteger { key, value } => {
                write!(f, "`{key}` must be an integer, got `{value}`")
            }
            Self::InvalidDate { key, value } => {
                write!(f, "`{key}` must be a YYYY-MM-DD date, got `{value}`")
            }
            Self::InvalidTimestamp { key, value } => {
                write!(f, "`{key}` must be a timestamp, got `{value}`")
            }
        }
    }
}

impl Error for FrontmatterError {}

/// Located frontmatter block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrontmatterBlock<'a> {
    /// Opening marker through closing marker, without the final newline.
    pub raw: &'a str,
    /// Lines between the markers.
    pub body: &'a str,
    /// Text following the closing marker line.
    pub rest: &'a str,
}

/// Result of running the extractor over one text payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrontmatterOutcome {
    /// No block at the start of the text.
    Absent,
    /// Block parsed and coerced.
    Parsed {
        mapping: FrontmatterMap,
        patch: NoteFrontmatterPatch,
    },
    /// Block found but rejected; `raw` is stored instead.
    Degraded {
        raw: String,
        error: FrontmatterError,
    },
}

/// Finds a block whose opening marker sits at offset zero.
pub fn detect_block(text: &str) -> Option<FrontmatterBlock<'_>> {
    let body_start = if text.starts_with("---\n") {
        4
    } else if text.starts_with("---\r\n") {
        5
    } else {
        return None;
    };

    let mut offset = body_start;
    loop {
        let line_end = text[offset..].find('\n').map(|index| offset + index);
        let line = &text[offset..line_end.unwrap_or(text.len())];
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line == MARKER {
            return Some(FrontmatterBlock {
                raw: &text[..offset + line.len()],
                body: &text[body_start..offset],
                rest: line_end.map_or("", |end| &text[end + 1..]),
            });
        }
        match line_end {
            Some(end) => offset = end + 1,
            None => return None,
        }
    }
}

/// Parses a block body into a flat mapping.
///
/// Blank lines and `#` comments are skipped; a later duplicate key wins.
pub fn parse_body(body: &str) -> Result<FrontmatterMap, FrontmatterError> {
    let mut mapping = FrontmatterMap::new();
    for (index, raw_line) in body.lines().enumerate() {
        let line_no = index + 1;
        if raw_line.trim().is_empty() || raw_line.trim_start().starts_with('#') {
            continue;
        }
        if raw_line.starts_with([' ', '\t']) {
            return Err(FrontmatterError::MalformedLine {
                line: line_no,
                text: raw_line.to_string(),
            });
        }

        let Some((key, value)) = raw_line.split_once(':') else {
            return Err(FrontmatterError::MalformedLine {
                line: line_no,
                text: raw_line.to_string(),
            });
        };

        let key = key.trim();
        if key.is_empty()
            || !key
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
        {
            return Err(FrontmatterError::InvalidKey {
                line: line_no,
                key: key.to_string(),
            });
        }

        mapping.insert(key.to_string(), unquote(value.trim()).to_string());
    }
    Ok(mapping)
}

/// Coerces recognized keys into a typed column patch.
pub fn coerce(mapping: &FrontmatterMap) -> Result<NoteFrontmatterPatch, FrontmatterError> {
    let mut patch = NoteFrontmatterPatch::default();
    for (key, value) in mapping {
        match key.as_str() {
            "status" => patch.status = Some(non_empty(value)),
            "author" => patch.author = Some(non_empty(value)),
            "category" => patch.category = Some(non_empty(value)),
            "template" => patch.template = Some(non_empty(value)),
            "type" => patch.note_type = Some(non_empty(value)),
            "priority" => patch.priority = Some(parse_integer(key, value)?),
            "due_date" => patch.due_date = Some(parse_date(key, value)?),
            "last_reviewed_at" => patch.last_reviewed_at = Some(parse_timestamp(key, value)?),
            _ => {}
        }
    }
    Ok(patch)
}

/// Runs detection, parsing and coercion without touching storage.
pub fn extract(text: &str) -> FrontmatterOutcome {
    let Some(block) = detect_block(text) else {
        return FrontmatterOutcome::Absent;
    };

    let parsed = parse_body(block.body).and_then(|mapping| {
        let patch = coerce(&mapping)?;
        Ok((mapping, patch))
    });

    match parsed {
        Ok((mapping, patch)) => FrontmatterOutcome::Parsed { mapping, patch },
        Err(error) => FrontmatterOutcome::Degraded {
            raw: block.raw.to_string(),
            error,
        },
    }
}

/// Extracts frontmatter from `text` and writes it back onto the owning note.
///
/// # Side effects
/// - `Parsed`: typed column patch, `frontmatter` mapping set,
///   `frontmatter_raw` cleared.
/// - `Degraded`: only `frontmatter_raw` is set.
pub fn apply_to_note(
    conn: &Connection,
    note_id: NoteId,
    text: &str,
) -> IndexResult<FrontmatterOutcome> {
    let outcome = extract(text);
    let repo = SqliteNoteRepository::new(conn);

    match &outcome {
        FrontmatterOutcome::Absent => {}
        FrontmatterOutcome::Parsed { mapping, patch } => {
            repo.apply_frontmatter_patch(note_id, patch)?;
            repo.merge_metadata(
                note_id,
                METADATA_FRONTMATTER_KEY,
                Some(&mapping_to_json(mapping)),
            )?;
            repo.merge_metadata(note_id, METADATA_FRONTMATTER_RAW_KEY, None)?;
            debug!(
                "event=frontmatter_extract module=index status=ok note_id={} keys={}",
                note_id,
                mapping.len()
            );
        }
        FrontmatterOutcome::Degraded { raw, error } => {
            repo.merge_metadata(
                note_id,
                METADATA_FRONTMATTER_RAW_KEY,
                Some(&Value::String(raw.clone())),
            )?;
            warn!(
                "event=frontmatter_extract module=index status=degraded note_id={} error_code={}",
                note_id,
                error.code()
            );
        }
    }

    Ok(outcome)
}

/// Converts a parsed mapping into the JSON object stored in metadata.
pub fn mapping_to_json(mapping: &FrontmatterMap) -> Value {
    let object = mapping
        .iter()
        .map(|(key, value)| (key.clone(), Value::String(value.clone())))
        .collect::<Map<String, Value>>();
    Value::Object(object)
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_integer(key: &str, value: &str) -> Result<Option<i64>, FrontmatterError> {
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse::<i64>()
        .map(Some)
        .map_err(|_| FrontmatterError::InvalidInteger {
            key: key.to_string(),
            value: value.to_string(),
        })
}

fn parse_date(key: &str, value: &str) -> Result<Option<NaiveDate>, FrontmatterError> {
    if value.is_empty() {
        return Ok(None);
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, DATE_FORMAT) {
        return Ok(Some(date));
    }
    timestamp_millis(value)
        .and_then(DateTime::from_timestamp_millis)
        .map(|moment| Some(moment.date_naive()))
        .ok_or_else(|| FrontmatterError::InvalidDate {
            key: key.to_string(),
            value: value.to_string(),
        })
}

fn parse_timestamp(key: &str, value: &str) -> Result<Option<i64>, FrontmatterError> {
    if value.is_empty() {
        return Ok(None);
    }
    timestamp_millis(value)
        .map(Some)
        .ok_or_else(|| FrontmatterError::InvalidTimestamp {
            key: key.to_string(),
            value: value.to_string(),
        })
}

/// Accepts RFC 3339, naive `date time` forms (UTC) or a bare date.
fn timestamp_millis(value: &str) -> Option<i64> {
    if let Ok(moment) = DateTime::parse_from_rfc3339(value) {
        return Some(moment.timestamp_millis());
    }
    for format in TIMESTAMP_FORMATS {
        if let Ok(moment) = NaiveDateTime::parse_from_str(value, format) {
            return Some(moment.and_utc().timestamp_millis());
        }
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|moment| moment.and_utc().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::{coerce, detect_block, extract, parse_body, FrontmatterError, FrontmatterOutcome};
    use chrono::NaiveDate;

    #[test]
    fn block_must_start_at_offset_zero() {
        assert!(detect_block("---\nstatus: draft\n---\nbody").is_some());
        assert!(detect_block("\n---\nstatus: draft\n---\nbody").is_none());
        assert!(detect_block(" ---\nstatus: draft\n---").is_none());
        assert!(detect_block("---\nstatus: draft\nno closing").is_none());
    }

    #[test]
    fn block_splits_raw_body_and_rest() {
        let block = detect_block("---\r\nstatus: draft\r\n---\r\nbody text").unwrap();
        assert_eq!(block.raw, "---\r\nstatus: draft\r\n---");
        assert_eq!(block.body, "status: draft\r\n");
        assert_eq!(block.rest, "body text");

        let empty = detect_block("---\n---").unwrap();
        assert_eq!(empty.body, "");
        assert_eq!(empty.rest, "");
    }

    #[test]
    fn body_grammar_accepts_flat_pairs_only() {
        let mapping = parse_body("status: draft\n\n# comment\ntitle: \"A: B\"\n").unwrap();
        assert_eq!(mapping.get("status").map(String::as_str), Some("draft"));
        assert_eq!(mapping.get("title").map(String::as_str), Some("A: B"));

        let err = parse_body("tags:\n  - one\n").unwrap_err();
        assert_eq!(
            err,
            FrontmatterError::MalformedLine {
                line: 2,
                text: "  - one".to_string()
            }
        );
        assert!(matches!(
            parse_body("bad key: x").unwrap_err(),
            FrontmatterError::InvalidKey { line: 1, .. }
        ));
    }

    #[test]
    fn coercion_types_known_columns() {
        let mapping = parse_body(
            "priority: 3\ndue_date: 2024-05-01\nlast_reviewed_at: 2024-05-02T10:00:00Z\nauthor:\nmood: calm",
        )
        .unwrap();
        let patch = coerce(&mapping).unwrap();
        assert_eq!(patch.priority, Some(Some(3)));
        assert_eq!(
            patch.due_date,
            Some(Some(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()))
        );
        assert_eq!(patch.last_reviewed_at, Some(Some(1_714_644_000_000)));
        assert_eq!(patch.author, Some(None));
        assert_eq!(patch.status, None);
    }

    #[test]
    fn coercion_failure_degrades_to_raw_block() {
        let outcome = extract("---\npriority: high\n---\nbody");
        match outcome {
            FrontmatterOutcome::Degraded { raw, error } => {
                assert_eq!(raw, "---\npriority: high\n---");
                assert_eq!(error.code(), "invalid_integer");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn text_without_block_is_absent() {
        assert_eq!(extract("plain body"), FrontmatterOutcome::Absent);
    }
}
