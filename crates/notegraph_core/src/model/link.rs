//! Link edge model.
//!
//! # Invariants
//! - Edges are directed from a source note (optionally a specific source
//!   sub-note) to a target note.
//! - `(source_note_id, target_note_id, source_sub_note_id, label)` is unique.

use super::note::NoteId;
use super::sub_note::SubNoteId;
use serde::{Deserialize, Serialize};

pub type LinkId = i64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    #[default]
    Reference,
    Embed,
    Transclusion,
}

impl LinkType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reference => "reference",
            Self::Embed => "embed",
            Self::Transclusion => "transclusion",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "reference" => Some(Self::Reference),
            "embed" => Some(Self::Embed),
            "transclusion" => Some(Self::Transclusion),
            _ => None,
        }
    }
}

/// Edge payload before persistence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NewLink {
    pub source_note_id: NoteId,
    pub target_note_id: NoteId,
    pub source_sub_note_id: Option<SubNoteId>,
    pub label: String,
    pub link_type: LinkType,
}

/// Persisted edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    pub source_note_id: NoteId,
    pub target_note_id: NoteId,
    pub source_sub_note_id: Option<SubNoteId>,
    pub label: String,
    pub link_type: LinkType,
    pub created_at: i64,
}

/// Edge viewed from its target, joined with the referencing note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backlink {
    pub link_id: LinkId,
    pub source_note_id: NoteId,
    pub source_sub_note_id: Option<SubNoteId>,
    pub source_title: String,
    pub source_slug: String,
    pub label: String,
    pub link_type: LinkType,
    pub created_at: i64,
}
