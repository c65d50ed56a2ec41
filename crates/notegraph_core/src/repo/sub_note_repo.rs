//! Sub-note repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist ordered, typed content blocks of a note.
//! - Accept the derived sub-note search vector write-back.
//!
//! # Invariants
//! - Sibling listing is deterministic: `position ASC, created_at ASC, uuid ASC`.
//! - Deleting a note cascades to its sub-notes at the storage level; callers
//!   that need edge cleanup run it before the cascade.

use crate::model::note::NoteId;
use crate::model::sub_note::{SubNote, SubNoteFrontmatter, SubNoteId, SubNoteKind, Visibility};
use crate::repo::{json_object_text, parse_json_object, parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, Row};
use serde_json::Map;

const SUB_NOTE_SELECT_SQL: &str = "SELECT
    uuid,
    note_uuid,
    kind,
    position,
    content,
    fm_title,
    fm_visibility,
    fm_style,
    search_vector,
    created_at,
    updated_at
FROM sub_notes";

/// Repository interface for sub-note records.
pub trait SubNoteRepository {
    fn create_sub_note(&self, sub_note: &SubNote) -> RepoResult<SubNoteId>;
    /// Replaces kind, position, payload and frontmatter.
    fn update_sub_note(&self, sub_note: &SubNote) -> RepoResult<()>;
    fn get_sub_note(&self, id: SubNoteId) -> RepoResult<Option<SubNote>>;
    fn list_sub_notes(&self, note_id: NoteId) -> RepoResult<Vec<SubNote>>;
    fn delete_sub_note(&self, id: SubNoteId) -> RepoResult<()>;
    fn set_search_vector(&self, id: SubNoteId, vector: &str) -> RepoResult<()>;
}

/// SQLite-backed sub-note repository.
pub struct SqliteSubNoteRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSubNoteRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl SubNoteRepository for SqliteSubNoteRepository<'_> {
    fn create_sub_note(&self, sub_note: &SubNote) -> RepoResult<SubNoteId> {
        sub_note.validate()?;

        let note_exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM notes WHERE uuid = ?1);",
            [sub_note.note_id.to_string()],
            |row| row.get(0),
        )?;
        if note_exists != 1 {
            return Err(RepoError::NotFound {
                entity: "note",
                id: sub_note.note_id,
            });
        }

        self.conn.execute(
            "INSERT INTO sub_notes (
                uuid,
                note_uuid,
                kind,
                position,
                content,
                fm_title,
                fm_visibility,
                fm_style
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                sub_note.uuid.to_string(),
                sub_note.note_id.to_string(),
                sub_note.kind.as_str(),
                sub_note.position,
                json_object_text(&sub_note.content),
                sub_note.frontmatter.title.as_deref(),
                sub_note.frontmatter.visibility.as_str(),
                style_text(&sub_note.frontmatter),
            ],
        )?;

        Ok(sub_note.uuid)
    }

    fn update_sub_note(&self, sub_note: &SubNote) -> RepoResult<()> {
        sub_note.validate()?;

        let changed = self.conn.execute(
            "UPDATE sub_notes
             SET
                kind = ?2,
                position = ?3,
                content = ?4,
                fm_title = ?5,
                fm_visibility = ?6,
                fm_style = ?7,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1;",
            params![
                sub_note.uuid.to_string(),
                sub_note.kind.as_str(),
                sub_note.position,
                json_object_text(&sub_note.content),
                sub_note.frontmatter.title.as_deref(),
                sub_note.frontmatter.visibility.as_str(),
                style_text(&sub_note.frontmatter),
            ],
        )?;

        if changed == 0 {
            return Err(not_found(sub_note.uuid));
        }
        Ok(())
    }

    fn get_sub_note(&self, id: SubNoteId) -> RepoResult<Option<SubNote>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SUB_NOTE_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_sub_note_row(row)?));
        }
        Ok(None)
    }

    fn list_sub_notes(&self, note_id: NoteId) -> RepoResult<Vec<SubNote>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SUB_NOTE_SELECT_SQL}
             WHERE note_uuid = ?1
             ORDER BY position ASC, created_at ASC, uuid ASC;"
        ))?;
        let mut rows = stmt.query([note_id.to_string()])?;
        let mut sub_notes = Vec::new();
        while let Some(row) = rows.next()? {
            sub_notes.push(parse_sub_note_row(row)?);
        }
        Ok(sub_notes)
    }

    fn delete_sub_note(&self, id: SubNoteId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM sub_notes WHERE uuid = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    fn set_search_vector(&self, id: SubNoteId, vector: &str) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE sub_notes SET search_vector = ?2 WHERE uuid = ?1;",
            params![id.to_string(), vector],
        )?;
        if changed == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }
}

fn style_text(frontmatter: &SubNoteFrontmatter) -> Option<String> {
    if frontmatter.style.is_empty() {
        None
    } else {
        Some(json_object_text(&frontmatter.style))
    }
}

fn parse_sub_note_row(row: &Row<'_>) -> RepoResult<SubNote> {
    let uuid_text: String = row.get("uuid")?;
    let note_text: String = row.get("note_uuid")?;

    let kind_text: String = row.get("kind")?;
    let kind = SubNoteKind::parse(&kind_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid sub-note kind `{kind_text}` in sub_notes.kind"))
    })?;

    let visibility_text: String = row.get("fm_visibility")?;
    let visibility = Visibility::parse(&visibility_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid visibility `{visibility_text}` in sub_notes.fm_visibility"
        ))
    })?;

    let content_text: String = row.get("content")?;
    let style = match row.get::<_, Option<String>>("fm_style")? {
        Some(text) => parse_json_object(&text, "sub_notes.fm_style")?,
        None => Map::new(),
    };

    Ok(SubNote {
        uuid: parse_uuid(&uuid_text, "sub_notes.uuid")?,
        note_id: parse_uuid(&note_text, "sub_notes.note_uuid")?,
        kind,
        position: row.get("position")?,
        content: parse_json_object(&content_text, "sub_notes.content")?,
        frontmatter: SubNoteFrontmatter {
            title: row.get("fm_title")?,
            visibility,
            style,
        },
        search_vector: row.get("search_vector")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn not_found(id: SubNoteId) -> RepoError {
    RepoError::NotFound {
        entity: "sub-note",
        id,
    }
}
