//! Note domain model.
//!
//! # Responsibility
//! - Define the owning record for sub-notes and the endpoint of link edges.
//! - Carry typed frontmatter columns next to free-form metadata.
//!
//! # Invariants
//! - `slug` is unique within `owner_id` (enforced by storage).
//! - `slug` is usable as a `[[target]]` link target verbatim.
//! - `metadata` keys listed in [`RESERVED_METADATA_KEYS`] are written by the
//!   frontmatter extractor only.

use super::ModelValidationError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

pub type NoteId = Uuid;
pub type OwnerId = Uuid;

/// Metadata key holding the last successfully parsed frontmatter mapping.
pub const METADATA_FRONTMATTER_KEY: &str = "frontmatter";
/// Metadata key holding the raw block text when parsing or coercion failed.
pub const METADATA_FRONTMATTER_RAW_KEY: &str = "frontmatter_raw";
pub const RESERVED_METADATA_KEYS: [&str; 2] =
    [METADATA_FRONTMATTER_KEY, METADATA_FRONTMATTER_RAW_KEY];

/// Typed frontmatter columns projected onto a note.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteFrontmatter {
    pub status: Option<String>,
    pub priority: Option<i64>,
    pub due_date: Option<NaiveDate>,
    pub author: Option<String>,
    pub category: Option<String>,
    pub template: Option<String>,
    /// Serialized as `type` to match the frontmatter key.
    #[serde(rename = "type")]
    pub note_type: Option<String>,
    /// Unix epoch milliseconds.
    pub last_reviewed_at: Option<i64>,
}

/// Partial update of typed frontmatter columns.
///
/// Outer `None` leaves a column untouched; `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteFrontmatterPatch {
    pub status: Option<Option<String>>,
    pub priority: Option<Option<i64>>,
    pub due_date: Option<Option<NaiveDate>>,
    pub author: Option<Option<String>>,
    pub category: Option<Option<String>>,
    pub template: Option<Option<String>>,
    pub note_type: Option<Option<String>>,
    pub last_reviewed_at: Option<Option<i64>>,
}

impl NoteFrontmatterPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Applies the patch to an in-memory frontmatter value.
    pub fn apply_to(&self, target: &mut NoteFrontmatter) {
        fn set<T: Clone>(slot: &mut Option<T>, patch: &Option<Option<T>>) {
            if let Some(value) = patch {
                *slot = value.clone();
            }
        }
        set(&mut target.status, &self.status);
        set(&mut target.priority, &self.priority);
        set(&mut target.due_date, &self.due_date);
        set(&mut target.author, &self.author);
        set(&mut target.category, &self.category);
        set(&mut target.template, &self.template);
        set(&mut target.note_type, &self.note_type);
        set(&mut target.last_reviewed_at, &self.last_reviewed_at);
    }
}

/// Canonical note record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub uuid: NoteId,
    pub owner_id: OwnerId,
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    pub frontmatter: NoteFrontmatter,
    pub metadata: Map<String, Value>,
    /// Derived weighted search representation; `None` until first indexed.
    pub search_vector: Option<String>,
    /// Epoch milliseconds, populated on read.
    pub created_at: i64,
    /// Epoch milliseconds, populated on read.
    pub updated_at: i64,
}

impl Note {
    /// Creates a note with a generated id and empty frontmatter/metadata.
    pub fn new(owner_id: OwnerId, slug: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            owner_id,
            slug: slug.into(),
            title: title.into(),
            description: None,
            frontmatter: NoteFrontmatter::default(),
            metadata: Map::new(),
            search_vector: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    /// Checks record-local invariants.
    pub fn validate(&self) -> Result<(), ModelValidationError> {
        validate_slug(&self.slug)?;
        if self.title.trim().is_empty() {
            return Err(ModelValidationError::EmptyTitle);
        }
        Ok(())
    }

    /// Returns a string-valued metadata entry.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

/// Validates a slug against link-target syntax.
///
/// Slugs must be non-empty, carry no surrounding whitespace and contain none
/// of `[`, `]`, `|` or control characters.
pub fn validate_slug(slug: &str) -> Result<(), ModelValidationError> {
    if slug.trim().is_empty() {
        return Err(ModelValidationError::EmptySlug);
    }
    let padded = slug.trim() != slug;
    let reserved = slug
        .chars()
        .any(|ch| matches!(ch, '[' | ']' | '|') || ch.is_control());
    if padded || reserved {
        return Err(ModelValidationError::InvalidSlug(slug.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{validate_slug, Note};
    use crate::model::ModelValidationError;
    use uuid::Uuid;

    #[test]
    fn slug_rejects_link_syntax_characters() {
        assert!(validate_slug("project-plan").is_ok());
        assert!(validate_slug("with space inside").is_ok());
        assert_eq!(validate_slug("  "), Err(ModelValidationError::EmptySlug));
        assert!(matches!(
            validate_slug("a|b"),
            Err(ModelValidationError::InvalidSlug(_))
        ));
        assert!(matches!(
            validate_slug(" padded"),
            Err(ModelValidationError::InvalidSlug(_))
        ));
    }

    #[test]
    fn note_requires_title() {
        let note = Note::new(Uuid::new_v4(), "slug", "   ");
        assert_eq!(note.validate(), Err(ModelValidationError::EmptyTitle));
    }
}
