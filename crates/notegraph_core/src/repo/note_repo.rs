//! Note repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist note records of the Content Store.
//! - Resolve `(owner, slug)` pairs for link targets.
//! - Accept derived-field write-backs: typed frontmatter columns, reserved
//!   metadata keys and the note search vector.
//!
//! # Invariants
//! - `slug` is unique within `owner_id`; violations surface as `Conflict`.
//! - Metadata merges are applied in SQL (`json_set`/`json_remove`) so a
//!   write-back never overwrites unrelated keys read earlier.
//! - Note list is always sorted by `updated_at DESC, uuid ASC`.

use crate::model::note::{Note, NoteFrontmatter, NoteFrontmatterPatch, NoteId, OwnerId};
use crate::repo::{
    json_object_text, map_unique_violation, parse_json_object, parse_uuid, RepoError, RepoResult,
};
use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

const NOTES_DEFAULT_LIMIT: u32 = 20;
const NOTES_LIMIT_MAX: u32 = 200;
const DATE_FORMAT: &str = "%Y-%m-%d";

const NOTE_SELECT_SQL: &str = "SELECT
    uuid,
    owner_id,
    slug,
    title,
    description,
    status,
    priority,
    due_date,
    author,
    category,
    template,
    type,
    last_reviewed_at,
    metadata,
    search_vector,
    created_at,
    updated_at
FROM notes";

/// Repository interface for note records.
pub trait NoteRepository {
    fn create_note(&self, note: &Note) -> RepoResult<NoteId>;
    /// Replaces slug, title, description, frontmatter columns and metadata.
    fn update_note(&self, note: &Note) -> RepoResult<()>;
    fn get_note(&self, id: NoteId) -> RepoResult<Option<Note>>;
    /// Exact slug lookup scoped to one owner.
    fn resolve_slug(&self, owner_id: OwnerId, slug: &str) -> RepoResult<Option<NoteId>>;
    fn list_notes(&self, owner_id: OwnerId, limit: Option<u32>, offset: u32)
        -> RepoResult<Vec<Note>>;
    fn delete_note(&self, id: NoteId) -> RepoResult<()>;
    /// Writes only the columns present in `patch`.
    fn apply_frontmatter_patch(&self, id: NoteId, patch: &NoteFrontmatterPatch) -> RepoResult<()>;
    /// Sets (`Some`) or removes (`None`) one top-level metadata key.
    fn merge_metadata(&self, id: NoteId, key: &str, value: Option<&serde_json::Value>)
        -> RepoResult<()>;
    fn set_search_vector(&self, id: NoteId, vector: &str) -> RepoResult<()>;
}

/// SQLite-backed note repository.
pub struct SqliteNoteRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteNoteRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl NoteRepository for SqliteNoteRepository<'_> {
    fn create_note(&self, note: &Note) -> RepoResult<NoteId> {
        note.validate()?;

        self.conn
            .execute(
                "INSERT INTO notes (
                    uuid,
                    owner_id,
                    slug,
                    title,
                    description,
                    status,
                    priority,
                    due_date,
                    author,
                    category,
                    template,
                    type,
                    last_reviewed_at,
                    metadata
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14);",
                params![
                    note.uuid.to_string(),
                    note.owner_id.to_string(),
                    note.slug.as_str(),
                    note.title.as_str(),
                    note.description.as_deref(),
                    note.frontmatter.status.as_deref(),
                    note.frontmatter.priority,
                    note.frontmatter.due_date.map(format_date),
                    note.frontmatter.author.as_deref(),
                    note.frontmatter.category.as_deref(),
                    note.frontmatter.template.as_deref(),
                    note.frontmatter.note_type.as_deref(),
                    note.frontmatter.last_reviewed_at,
                    json_object_text(&note.metadata),
                ],
            )
            .map_err(|err| slug_conflict(err, note))?;

        Ok(note.uuid)
    }

    fn update_note(&self, note: &Note) -> RepoResult<()> {
        note.validate()?;

        let changed = self
            .conn
            .execute(
                "UPDATE notes
                 SET
                    slug = ?2,
                    title = ?3,
                    description = ?4,
                    status = ?5,
                    priority = ?6,
                    due_date = ?7,
                    author = ?8,
                    category = ?9,
                    template = ?10,
                    type = ?11,
                    last_reviewed_at = ?12,
                    metadata = ?13,
                    updated_at = (strftime('%s', 'now') * 1000)
                 WHERE uuid = ?1;",
                params![
                    note.uuid.to_string(),
                    note.slug.as_str(),
                    note.title.as_str(),
                    note.description.as_deref(),
                    note.frontmatter.status.as_deref(),
                    note.frontmatter.priority,
                    note.frontmatter.due_date.map(format_date),
                    note.frontmatter.author.as_deref(),
                    note.frontmatter.category.as_deref(),
                    note.frontmatter.template.as_deref(),
                    note.frontmatter.note_type.as_deref(),
                    note.frontmatter.last_reviewed_at,
                    json_object_text(&note.metadata),
                ],
            )
            .map_err(|err| slug_conflict(err, note))?;

        if changed == 0 {
            return Err(not_found(note.uuid));
        }
        Ok(())
    }

    fn get_note(&self, id: NoteId) -> RepoResult<Option<Note>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{NOTE_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_note_row(row)?));
        }
        Ok(None)
    }

    fn resolve_slug(&self, owner_id: OwnerId, slug: &str) -> RepoResult<Option<NoteId>> {
        let found: Option<String> = self
            .conn
            .query_row(
                "SELECT uuid FROM notes WHERE owner_id = ?1 AND slug = ?2;",
                params![owner_id.to_string(), slug],
                |row| row.get(0),
            )
            .optional()?;
        found
            .map(|value| parse_uuid(&value, "notes.uuid"))
            .transpose()
    }

    fn list_notes(
        &self,
        owner_id: OwnerId,
        limit: Option<u32>,
        offset: u32,
    ) -> RepoResult<Vec<Note>> {
        let mut sql = format!("{NOTE_SELECT_SQL} WHERE owner_id = ?");
        let mut bind_values: Vec<Value> = vec![Value::Text(owner_id.to_string())];

        sql.push_str(" ORDER BY updated_at DESC, uuid ASC LIMIT ?");
        bind_values.push(Value::Integer(i64::from(normalize_note_limit(limit))));
        if offset > 0 {
            sql.push_str(" OFFSET ?");
            bind_values.push(Value::Integer(i64::from(offset)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut notes = Vec::new();
        while let Some(row) = rows.next()? {
            notes.push(parse_note_row(row)?);
        }
        Ok(notes)
    }

    fn delete_note(&self, id: NoteId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM notes WHERE uuid = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    fn apply_frontmatter_patch(&self, id: NoteId, patch: &NoteFrontmatterPatch) -> RepoResult<()> {
        if patch.is_empty() {
            return Ok(());
        }

        let mut assignments: Vec<&'static str> = Vec::new();
        let mut bind_values: Vec<Value> = Vec::new();
        push_text(&mut assignments, &mut bind_values, "status", &patch.status);
        push_integer(&mut assignments, &mut bind_values, "priority", &patch.priority);
        if let Some(due_date) = &patch.due_date {
            assignments.push("due_date");
            bind_values.push(match due_date {
                Some(date) => Value::Text(format_date(*date)),
                None => Value::Null,
            });
        }
        push_text(&mut assignments, &mut bind_values, "author", &patch.author);
        push_text(&mut assignments, &mut bind_values, "category", &patch.category);
        push_text(&mut assignments, &mut bind_values, "template", &patch.template);
        push_text(&mut assignments, &mut bind_values, "type", &patch.note_type);
        push_integer(
            &mut assignments,
            &mut bind_values,
            "last_reviewed_at",
            &patch.last_reviewed_at,
        );

        let set_clause = assignments
            .iter()
            .map(|column| format!("{column} = ?"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE notes SET {set_clause}, updated_at = (strftime('%s', 'now') * 1000) WHERE uuid = ?;"
        );
        bind_values.push(Value::Text(id.to_string()));

        let changed = self.conn.execute(&sql, params_from_iter(bind_values))?;
        if changed == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    fn merge_metadata(
        &self,
        id: NoteId,
        key: &str,
        value: Option<&serde_json::Value>,
    ) -> RepoResult<()> {
        let path = format!("$.\"{}\"", key.replace('"', "\\\""));
        let changed = match value {
            Some(value) => self.conn.execute(
                "UPDATE notes
                 SET metadata = json_set(metadata, ?2, json(?3))
                 WHERE uuid = ?1;",
                params![id.to_string(), path, value.to_string()],
            )?,
            None => self.conn.execute(
                "UPDATE notes
                 SET metadata = json_remove(metadata, ?2)
                 WHERE uuid = ?1;",
                params![id.to_string(), path],
            )?,
        };
        if changed == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    fn set_search_vector(&self, id: NoteId, vector: &str) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE notes SET search_vector = ?2 WHERE uuid = ?1;",
            params![id.to_string(), vector],
        )?;
        if changed == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }
}

/// Normalizes list limit: `0`/`None` use the default, large values clamp.
pub fn normalize_note_limit(limit: Option<u32>) -> u32 {
    match limit {
        Some(0) | None => NOTES_DEFAULT_LIMIT,
        Some(value) => value.min(NOTES_LIMIT_MAX),
    }
}

/// Formats a date the way it is stored in `notes.due_date`.
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn push_text(
    assignments: &mut Vec<&'static str>,
    bind_values: &mut Vec<Value>,
    column: &'static str,
    patch: &Option<Option<String>>,
) {
    if let Some(value) = patch {
        assignments.push(column);
        bind_values.push(value.clone().map_or(Value::Null, Value::Text));
    }
}

fn push_integer(
    assignments: &mut Vec<&'static str>,
    bind_values: &mut Vec<Value>,
    column: &'static str,
    patch: &Option<Option<i64>>,
) {
    if let Some(value) = patch {
        assignments.push(column);
        bind_values.push(value.map_or(Value::Null, Value::Integer));
    }
}

fn parse_note_row(row: &Row<'_>) -> RepoResult<Note> {
    let uuid_text: String = row.get("uuid")?;
    let owner_text: String = row.get("owner_id")?;
    let metadata_text: String = row.get("metadata")?;

    let due_date = match row.get::<_, Option<String>>("due_date")? {
        Some(value) => Some(NaiveDate::parse_from_str(&value, DATE_FORMAT).map_err(|_| {
            RepoError::InvalidData(format!("invalid date `{value}` in notes.due_date"))
        })?),
        None => None,
    };

    Ok(Note {
        uuid: parse_uuid(&uuid_text, "notes.uuid")?,
        owner_id: parse_uuid(&owner_text, "notes.owner_id")?,
        slug: row.get("slug")?,
        title: row.get("title")?,
        description: row.get("description")?,
        frontmatter: NoteFrontmatter {
            status: row.get("status")?,
            priority: row.get("priority")?,
            due_date,
            author: row.get("author")?,
            category: row.get("category")?,
            template: row.get("template")?,
            note_type: row.get("type")?,
            last_reviewed_at: row.get("last_reviewed_at")?,
        },
        metadata: parse_json_object(&metadata_text, "notes.metadata")?,
        search_vector: row.get("search_vector")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn slug_conflict(err: rusqlite::Error, note: &Note) -> RepoError {
    map_unique_violation(err, || {
        format!(
            "slug `{}` already exists for owner {}",
            note.slug, note.owner_id
        )
    })
}

fn not_found(id: NoteId) -> RepoError {
    RepoError::NotFound { entity: "note", id }
}
