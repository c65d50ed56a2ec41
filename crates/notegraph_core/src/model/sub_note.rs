//! Sub-note domain model.
//!
//! # Responsibility
//! - Define the ordered, typed content block owned by exactly one note.
//! - Provide sparse-position helpers for sibling insertion.
//!
//! # Invariants
//! - `position` is finite; siblings are ordered by
//!   `position ASC, created_at ASC, uuid ASC`.
//! - `content` is a JSON object whose meaningful keys depend on `kind`
//!   (`text` for text/markdown, `code`/`language`/`filename` for code,
//!   `caption` for media and files).

use super::note::NoteId;
use super::ModelValidationError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

pub type SubNoteId = Uuid;

/// Declared content type of a sub-note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubNoteKind {
    Text,
    Markdown,
    Code,
    Image,
    Audio,
    Video,
    File,
}

impl SubNoteKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Markdown => "markdown",
            Self::Code => "code",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::File => "file",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(Self::Text),
            "markdown" => Some(Self::Markdown),
            "code" => Some(Self::Code),
            "image" => Some(Self::Image),
            "audio" => Some(Self::Audio),
            "video" => Some(Self::Video),
            "file" => Some(Self::File),
            _ => None,
        }
    }

    /// Whether the payload carries free text scanned for `[[links]]`.
    pub fn is_textual(self) -> bool {
        matches!(self, Self::Text | Self::Markdown)
    }
}

/// Display state declared in sub-note frontmatter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Visible,
    Collapsed,
    Hidden,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Visible => "visible",
            Self::Collapsed => "collapsed",
            Self::Hidden => "hidden",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "visible" => Some(Self::Visible),
            "collapsed" => Some(Self::Collapsed),
            "hidden" => Some(Self::Hidden),
            _ => None,
        }
    }
}

/// Optional presentation frontmatter attached to one sub-note.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubNoteFrontmatter {
    pub title: Option<String>,
    pub visibility: Visibility,
    pub style: Map<String, Value>,
}

/// Canonical sub-note record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubNote {
    pub uuid: SubNoteId,
    pub note_id: NoteId,
    #[serde(rename = "type")]
    pub kind: SubNoteKind,
    pub position: f64,
    pub content: Map<String, Value>,
    pub frontmatter: SubNoteFrontmatter,
    pub search_vector: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SubNote {
    /// Creates a sub-note with an empty payload.
    pub fn new(note_id: NoteId, kind: SubNoteKind, position: f64) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            note_id,
            kind,
            position,
            content: Map::new(),
            frontmatter: SubNoteFrontmatter::default(),
            search_vector: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    /// Creates a text or markdown sub-note carrying `text`.
    pub fn with_text(
        note_id: NoteId,
        kind: SubNoteKind,
        position: f64,
        text: impl Into<String>,
    ) -> Self {
        let mut sub_note = Self::new(note_id, kind, position);
        sub_note.set_text(text);
        sub_note
    }

    /// Replaces the `text` payload field.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.content
            .insert("text".to_string(), Value::String(text.into()));
    }

    /// Sets one string payload field.
    pub fn set_field(&mut self, key: &str, value: impl Into<String>) {
        self.content
            .insert(key.to_string(), Value::String(value.into()));
    }

    /// Returns a string payload field.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.content.get(key).and_then(Value::as_str)
    }

    /// Returns the free text of text/markdown sub-notes.
    pub fn text(&self) -> Option<&str> {
        if self.kind.is_textual() {
            self.field("text")
        } else {
            None
        }
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        if !self.position.is_finite() {
            return Err(ModelValidationError::NonFinitePosition(self.position));
        }
        Ok(())
    }
}

/// Computes a sparse position between two siblings.
///
/// `None` on either side means "no sibling there"; inserting into an empty
/// list yields `1.0`.
pub fn position_between(before: Option<f64>, after: Option<f64>) -> f64 {
    match (before, after) {
        (Some(low), Some(high)) => low + (high - low) / 2.0,
        (Some(low), None) => low + 1.0,
        (None, Some(high)) => high - 1.0,
        (None, None) => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::{position_between, SubNote, SubNoteKind};
    use uuid::Uuid;

    #[test]
    fn position_between_bisects_and_extends() {
        assert_eq!(position_between(None, None), 1.0);
        assert_eq!(position_between(Some(1.0), Some(2.0)), 1.5);
        assert_eq!(position_between(Some(3.0), None), 4.0);
        assert_eq!(position_between(None, Some(1.0)), 0.0);
    }

    #[test]
    fn text_is_exposed_only_for_textual_kinds() {
        let note_id = Uuid::new_v4();
        let markdown = SubNote::with_text(note_id, SubNoteKind::Markdown, 1.0, "body");
        assert_eq!(markdown.text(), Some("body"));

        let mut code = SubNote::new(note_id, SubNoteKind::Code, 2.0);
        code.set_field("text", "not scanned");
        assert_eq!(code.text(), None);
    }

    #[test]
    fn non_finite_position_is_rejected() {
        let sub_note = SubNote::new(Uuid::new_v4(), SubNoteKind::Text, f64::NAN);
        assert!(sub_note.validate().is_err());
    }
}
