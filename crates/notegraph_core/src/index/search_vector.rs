//! Weighted search representation builder.
//!
//! # Responsibility
//! - Build a stemmed, weighted lexeme vector for a note or a sub-note from
//!   that record's own fields.
//! - Persist the rendered vector back onto the record.
//!
//! # Invariants
//! - Vectors are always rebuilt wholesale, never patched.
//! - Rendering is deterministic: lexemes sorted, positions ascending.
//!
//! The rendered text follows the `tsvector` literal layout:
//! `'lexeme':1A,4B 'other':2`, where weight `D` is implicit.

use crate::index::stemmer::lexemes;
use crate::index::IndexResult;
use crate::model::note::Note;
use crate::model::sub_note::{SubNote, SubNoteKind};
use crate::repo::note_repo::{NoteRepository, SqliteNoteRepository};
use crate::repo::sub_note_repo::{SqliteSubNoteRepository, SubNoteRepository};
use rusqlite::Connection;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

const MAX_POSITION: u32 = 16_383;
const MAX_POSITIONS_PER_LEXEME: usize = 256;
const NOTE_METADATA_FIELDS: [&str; 3] = ["title", "summary", "keywords"];

/// Lexeme weight class, `A` ranks highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Weight {
    A,
    B,
    C,
    D,
}

impl Weight {
    fn suffix(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "",
        }
    }
}

/// Built search representation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchVector {
    lexemes: BTreeMap<String, Vec<(u32, Weight)>>,
}

impl SearchVector {
    pub fn is_empty(&self) -> bool {
        self.lexemes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lexemes.len()
    }

    pub fn contains(&self, lexeme: &str) -> bool {
        self.lexemes.contains_key(lexeme)
    }

    /// Highest weight recorded for a lexeme.
    pub fn weight_of(&self, lexeme: &str) -> Option<Weight> {
        self.lexemes
            .get(lexeme)
            .and_then(|positions| positions.iter().map(|(_, weight)| *weight).min())
    }

    pub fn positions(&self, lexeme: &str) -> Vec<u32> {
        self.lexemes
            .get(lexeme)
            .map(|positions| positions.iter().map(|(pos, _)| *pos).collect())
            .unwrap_or_default()
    }
}

impl Display for SearchVector {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (index, (lexeme, positions)) in self.lexemes.iter().enumerate() {
            if index > 0 {
                f.write_str(" ")?;
            }
            write!(f, "'{}':", lexeme.replace('\'', "''"))?;
            for (slot, (position, weight)) in positions.iter().enumerate() {
                if slot > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{position}{}", weight.suffix())?;
            }
        }
        Ok(())
    }
}

/// Accumulates weighted text segments into one vector.
#[derive(Debug, Default)]
pub struct SearchVectorBuilder {
    next_position: u32,
    vector: SearchVector,
}

impl SearchVectorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the lexemes of `text` at `weight`; positions continue from
    /// the previous segment.
    pub fn push_text(&mut self, text: &str, weight: Weight) -> &mut Self {
        for lexeme in lexemes(text) {
            self.next_position = (self.next_position + 1).min(MAX_POSITION);
            let position = self.next_position;
            let positions = self.vector.lexemes.entry(lexeme).or_default();
            // Past the cap every token lands on MAX_POSITION; keep one entry.
            if positions.last().is_some_and(|(last, _)| *last == position) {
                continue;
            }
            if positions.len() < MAX_POSITIONS_PER_LEXEME {
                positions.push((position, weight));
            }
        }
        self
    }

    pub fn push_optional(&mut self, text: Option<&str>, weight: Weight) -> &mut Self {
        if let Some(text) = text {
            self.push_text(text, weight);
        }
        self
    }

    pub fn build(self) -> SearchVector {
        self.vector
    }
}

/// Builds the note representation: title (A), description (B), frontmatter
/// text columns (C), then metadata `title`/`summary`/`keywords` (D).
pub fn note_search_vector(note: &Note) -> SearchVector {
    let mut builder = SearchVectorBuilder::new();
    builder
        .push_text(&note.title, Weight::A)
        .push_optional(note.description.as_deref(), Weight::B);

    let frontmatter = &note.frontmatter;
    for field in [
        &frontmatter.status,
        &frontmatter.author,
        &frontmatter.category,
        &frontmatter.note_type,
    ] {
        builder.push_optional(field.as_deref(), Weight::C);
    }

    for key in NOTE_METADATA_FIELDS {
        if let Some(value) = note.metadata.get(key) {
            builder.push_optional(metadata_text(value).as_deref(), Weight::D);
        }
    }

    builder.build()
}

/// Builds the sub-note representation according to its declared kind.
pub fn sub_note_search_vector(sub_note: &SubNote) -> SearchVector {
    let mut builder = SearchVectorBuilder::new();
    match sub_note.kind {
        SubNoteKind::Text | SubNoteKind::Markdown => {
            builder.push_optional(sub_note.field("text"), Weight::D);
        }
        SubNoteKind::Code => {
            for key in ["code", "language", "filename"] {
                builder.push_optional(sub_note.field(key), Weight::D);
            }
        }
        SubNoteKind::Image
        | SubNoteKind::Audio
        | SubNoteKind::Video
        | SubNoteKind::File => {
            builder.push_optional(sub_note.field("caption"), Weight::D);
        }
    }
    builder.push_optional(sub_note.frontmatter.title.as_deref(), Weight::D);
    builder.build()
}

/// Rebuilds and stores the search vector of a note.
pub fn reindex_note(conn: &Connection, note: &Note) -> IndexResult<SearchVector> {
    let vector = note_search_vector(note);
    SqliteNoteRepository::new(conn).set_search_vector(note.uuid, &vector.to_string())?;
    Ok(vector)
}

/// Rebuilds and stores the search vector of a sub-note.
pub fn reindex_sub_note(conn: &Connection, sub_note: &SubNote) -> IndexResult<SearchVector> {
    let vector = sub_note_search_vector(sub_note);
    SqliteSubNoteRepository::new(conn).set_search_vector(sub_note.uuid, &vector.to_string())?;
    Ok(vector)
}

fn metadata_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Array(items) => {
            let joined = items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(" ");
            if joined.is_empty() {
                None
            } else {
                Some(joined)
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        note_search_vector, sub_note_search_vector, SearchVectorBuilder, Weight, MAX_POSITION,
    };
    use crate::model::note::Note;
    use crate::model::sub_note::{SubNote, SubNoteKind};
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn rendering_matches_tsvector_layout() {
        let mut builder = SearchVectorBuilder::new();
        builder
            .push_text("plans", Weight::A)
            .push_text("meeting plan", Weight::B)
            .push_text("notes", Weight::D);
        let vector = builder.build();
        assert_eq!(vector.to_string(), "'meet':2B 'note':4 'plan':1A,3B");
    }

    #[test]
    fn positions_past_the_cap_are_not_repeated() {
        let filler = (0..MAX_POSITION)
            .map(|i| format!("w{i}"))
            .collect::<Vec<_>>()
            .join(" ");
        let mut builder = SearchVectorBuilder::new();
        builder
            .push_text(&filler, Weight::D)
            .push_text("overflow overflow overflow", Weight::D);
        let vector = builder.build();

        assert_eq!(vector.positions("overflow"), vec![MAX_POSITION]);
        assert!(vector.to_string().contains("'overflow':16383 "));
    }

    #[test]
    fn note_fields_are_weighted_in_descending_order() {
        let mut note = Note::new(Uuid::new_v4(), "roadmap", "Roadmap");
        note.description = Some("quarterly goals".to_string());
        note.frontmatter.author = Some("alice".to_string());
        note.metadata
            .insert("keywords".to_string(), json!(["launch", "budget"]));
        note.metadata.insert("ignored".to_string(), json!("secret"));

        let vector = note_search_vector(&note);
        assert_eq!(vector.weight_of("roadmap"), Some(Weight::A));
        assert_eq!(vector.weight_of("quarter"), Some(Weight::B));
        assert_eq!(vector.weight_of("alic"), Some(Weight::C));
        assert_eq!(vector.weight_of("alice"), None);
        assert_eq!(vector.weight_of("launch"), Some(Weight::D));
        assert!(!vector.contains("secret"));
    }

    #[test]
    fn code_sub_note_indexes_body_language_and_filename() {
        let mut sub_note = SubNote::new(Uuid::new_v4(), SubNoteKind::Code, 1.0);
        sub_note.set_field("code", "fn parse_config()");
        sub_note.set_field("language", "rust");
        sub_note.set_field("filename", "config.rs");
        sub_note.set_field("caption", "unused caption");

        let vector = sub_note_search_vector(&sub_note);
        assert!(vector.contains("rust"));
        assert!(vector.contains("pars"));
        assert!(vector.contains("config"));
        assert!(vector.contains("rs"));
        assert!(!vector.contains("unus"));
        assert!(!vector.contains("caption"));
    }

    #[test]
    fn media_sub_note_indexes_caption_and_frontmatter_title() {
        let mut sub_note = SubNote::new(Uuid::new_v4(), SubNoteKind::Image, 1.0);
        sub_note.set_field("caption", "sunset");
        sub_note.set_field("text", "ignored body");
        sub_note.frontmatter.title = Some("Harbor".to_string());

        let vector = sub_note_search_vector(&sub_note);
        assert_eq!(vector.weight_of("sunset"), Some(Weight::D));
        assert_eq!(vector.weight_of("harbor"), Some(Weight::D));
        assert!(!vector.contains("ignor"));
    }
}
