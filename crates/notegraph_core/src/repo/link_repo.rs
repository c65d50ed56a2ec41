//! Link edge repository.
//!
//! # Responsibility
//! - Upsert and delete directed edges keyed by
//!   `(source note, target note, source sub-note, label)`.
//! - Serve the read-only backlinks projection.
//!
//! # Invariants
//! - Re-inserting an existing key with the same link type is a no-op and
//!   reports `Existing`; a different link type is written in place.
//! - The edge table is authoritative; graph cache rows are derived from it.

use crate::model::link::{Backlink, Link, LinkId, LinkType, NewLink};
use crate::model::note::NoteId;
use crate::model::sub_note::SubNoteId;
use crate::repo::{parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};

const LINK_SELECT_SQL: &str = "SELECT
    id,
    source_note_uuid,
    target_note_uuid,
    source_sub_note_uuid,
    label,
    link_type,
    created_at
FROM links";

/// Outcome of an edge upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkUpsert {
    /// A new row was written.
    Inserted(Link),
    /// The key already existed and only its link type changed.
    Retyped(Link),
    /// An identical edge already existed; nothing changed.
    Existing,
}

/// Repository interface for link edges.
pub trait LinkRepository {
    fn upsert_link(&self, link: &NewLink) -> RepoResult<LinkUpsert>;
    /// Deletes one edge, returning it when it existed.
    fn delete_link(&self, id: LinkId) -> RepoResult<Option<Link>>;
    fn links_from_sub_note(&self, sub_note_id: SubNoteId) -> RepoResult<Vec<Link>>;
    fn links_targeting(&self, note_id: NoteId) -> RepoResult<Vec<Link>>;
    /// All edges in insertion (`id`) order.
    fn all_links(&self) -> RepoResult<Vec<Link>>;
    fn backlinks(&self, note_id: NoteId) -> RepoResult<Vec<Backlink>>;
}

/// SQLite-backed link repository.
pub struct SqliteLinkRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteLinkRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn query_links(&self, sql: &str, bind: Option<String>) -> RepoResult<Vec<Link>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = match bind {
            Some(value) => stmt.query([value])?,
            None => stmt.query([])?,
        };
        let mut links = Vec::new();
        while let Some(row) = rows.next()? {
            links.push(parse_link_row(row)?);
        }
        Ok(links)
    }
}

impl LinkRepository for SqliteLinkRepository<'_> {
    fn upsert_link(&self, link: &NewLink) -> RepoResult<LinkUpsert> {
        let inserted = self
            .conn
            .query_row(
                "INSERT INTO links (
                    source_note_uuid,
                    target_note_uuid,
                    source_sub_note_uuid,
                    label,
                    link_type
                ) VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT DO NOTHING
                RETURNING id, source_note_uuid, target_note_uuid, source_sub_note_uuid,
                          label, link_type, created_at;",
                params![
                    link.source_note_id.to_string(),
                    link.target_note_id.to_string(),
                    link.source_sub_note_id.map(|id| id.to_string()),
                    link.label.as_str(),
                    link.link_type.as_str(),
                ],
                |row| Ok(parse_link_row(row)),
            )
            .optional()?;

        if let Some(link) = inserted {
            return Ok(LinkUpsert::Inserted(link?));
        }

        let retyped = self
            .conn
            .query_row(
                "UPDATE links
                 SET link_type = ?5
                 WHERE source_note_uuid = ?1
                   AND target_note_uuid = ?2
                   AND IFNULL(source_sub_note_uuid, '') = IFNULL(?3, '')
                   AND label = ?4
                   AND link_type <> ?5
                 RETURNING id, source_note_uuid, target_note_uuid, source_sub_note_uuid,
                           label, link_type, created_at;",
                params![
                    link.source_note_id.to_string(),
                    link.target_note_id.to_string(),
                    link.source_sub_note_id.map(|id| id.to_string()),
                    link.label.as_str(),
                    link.link_type.as_str(),
                ],
                |row| Ok(parse_link_row(row)),
            )
            .optional()?;

        match retyped {
            Some(link) => Ok(LinkUpsert::Retyped(link?)),
            None => Ok(LinkUpsert::Existing),
        }
    }

    fn delete_link(&self, id: LinkId) -> RepoResult<Option<Link>> {
        let deleted = self
            .conn
            .query_row(
                "DELETE FROM links
                 WHERE id = ?1
                 RETURNING id, source_note_uuid, target_note_uuid, source_sub_note_uuid,
                           label, link_type, created_at;",
                [id],
                |row| Ok(parse_link_row(row)),
            )
            .optional()?;
        deleted.transpose()
    }

    fn links_from_sub_note(&self, sub_note_id: SubNoteId) -> RepoResult<Vec<Link>> {
        self.query_links(
            &format!("{LINK_SELECT_SQL} WHERE source_sub_note_uuid = ?1 ORDER BY id ASC;"),
            Some(sub_note_id.to_string()),
        )
    }

    fn links_targeting(&self, note_id: NoteId) -> RepoResult<Vec<Link>> {
        self.query_links(
            &format!("{LINK_SELECT_SQL} WHERE target_note_uuid = ?1 ORDER BY id ASC;"),
            Some(note_id.to_string()),
        )
    }

    fn all_links(&self) -> RepoResult<Vec<Link>> {
        self.query_links(&format!("{LINK_SELECT_SQL} ORDER BY id ASC;"), None)
    }

    fn backlinks(&self, note_id: NoteId) -> RepoResult<Vec<Backlink>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                l.id,
                l.source_note_uuid,
                l.source_sub_note_uuid,
                l.label,
                l.link_type,
                l.created_at,
                n.title,
                n.slug
             FROM links l
             INNER JOIN notes n ON n.uuid = l.source_note_uuid
             WHERE l.target_note_uuid = ?1
             ORDER BY l.created_at ASC, l.id ASC;",
        )?;
        let mut rows = stmt.query([note_id.to_string()])?;
        let mut backlinks = Vec::new();
        while let Some(row) = rows.next()? {
            let source_text: String = row.get("source_note_uuid")?;
            backlinks.push(Backlink {
                link_id: row.get("id")?,
                source_note_id: parse_uuid(&source_text, "links.source_note_uuid")?,
                source_sub_note_id: parse_optional_uuid(row, "source_sub_note_uuid")?,
                source_title: row.get("title")?,
                source_slug: row.get("slug")?,
                label: row.get("label")?,
                link_type: parse_link_type(row)?,
                created_at: row.get("created_at")?,
            });
        }
        Ok(backlinks)
    }
}

fn parse_link_row(row: &Row<'_>) -> RepoResult<Link> {
    let source_text: String = row.get("source_note_uuid")?;
    let target_text: String = row.get("target_note_uuid")?;
    Ok(Link {
        id: row.get("id")?,
        source_note_id: parse_uuid(&source_text, "links.source_note_uuid")?,
        target_note_id: parse_uuid(&target_text, "links.target_note_uuid")?,
        source_sub_note_id: parse_optional_uuid(row, "source_sub_note_uuid")?,
        label: row.get("label")?,
        link_type: parse_link_type(row)?,
        created_at: row.get("created_at")?,
    })
}

fn parse_optional_uuid(row: &Row<'_>, column: &str) -> RepoResult<Option<SubNoteId>> {
    row.get::<_, Option<String>>(column)?
        .map(|value| parse_uuid(&value, column))
        .transpose()
}

fn parse_link_type(row: &Row<'_>) -> RepoResult<LinkType> {
    let value: String = row.get("link_type")?;
    LinkType::parse(&value)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid link type `{value}` in links.link_type")))
}
