//! Note and sub-note use-case service.
//!
//! # Responsibility
//! - Run each content write and its derived-data dispatch as one unit of
//!   work: IMMEDIATE transaction, authoritative write, dispatch, commit.
//! - Expose read APIs (notes, sub-notes, backlinks, graph cache) and graph
//!   cache maintenance.
//!
//! # Invariants
//! - A content write commits even when a derived step fails; the failure is
//!   returned in the [`DispatchReport`].
//! - Reserved metadata keys are owned by the frontmatter extractor; note
//!   updates keep the stored values.
//! - Deletion cleanup is dispatched before the row is removed.

use crate::config::IndexConfig;
use crate::db::migrations::current_user_version;
use crate::index::dispatcher::{DispatchReport, IndexDispatcher};
use crate::index::graph_cache::{self, GraphCacheDrift, GraphCacheEntry, RebuildReport};
use crate::index::IndexError;
use crate::model::link::Backlink;
use crate::model::note::{Note, NoteId, OwnerId, RESERVED_METADATA_KEYS};
use crate::model::sub_note::{SubNote, SubNoteId};
use crate::repo::link_repo::{LinkRepository, SqliteLinkRepository};
use crate::repo::note_repo::{normalize_note_limit, NoteRepository, SqliteNoteRepository};
use crate::repo::sub_note_repo::{SqliteSubNoteRepository, SubNoteRepository};
use crate::repo::RepoError;
use log::info;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Service error for content and graph use-cases.
#[derive(Debug)]
pub enum ServiceError {
    NoteNotFound(NoteId),
    SubNoteNotFound(SubNoteId),
    Repo(RepoError),
    /// Graph maintenance failure outside a dispatched step.
    Index(IndexError),
    /// Write succeeded but read-back did not find the record.
    InconsistentState(&'static str),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoteNotFound(id) => write!(f, "note not found: {id}"),
            Self::SubNoteNotFound(id) => write!(f, "sub-note not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Index(err) => write!(f, "{err}"),
            Self::InconsistentState(details) => write!(f, "inconsistent state: {details}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Index(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound { entity: "note", id } => Self::NoteNotFound(id),
            RepoError::NotFound {
                entity: "sub-note",
                id,
            } => Self::SubNoteNotFound(id),
            other => Self::Repo(other),
        }
    }
}

impl From<IndexError> for ServiceError {
    fn from(value: IndexError) -> Self {
        match value {
            IndexError::Repo(err) => Self::from(err),
            other => Self::Index(other),
        }
    }
}

impl From<rusqlite::Error> for ServiceError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(RepoError::from(value))
    }
}

/// A committed record together with its derived-step outcomes.
#[derive(Debug, Clone, PartialEq)]
pub struct Written<T> {
    pub record: T,
    pub index: DispatchReport,
}

/// One page of notes.
#[derive(Debug, Clone, PartialEq)]
pub struct NotesPage {
    /// Sorted by `updated_at DESC, uuid ASC`.
    pub items: Vec<Note>,
    pub applied_limit: u32,
}

/// Row counts and schema version of one database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageStats {
    pub schema_version: u32,
    pub notes: i64,
    pub sub_notes: i64,
    pub links: i64,
    pub graph_cache_entries: i64,
}

/// Content service bound to one connection.
pub struct NoteService<'conn> {
    conn: &'conn mut Connection,
    dispatcher: IndexDispatcher,
}

impl<'conn> NoteService<'conn> {
    pub fn new(conn: &'conn mut Connection, config: IndexConfig) -> Self {
        Self {
            conn,
            dispatcher: IndexDispatcher::new(config),
        }
    }

    fn begin(&mut self) -> ServiceResult<Transaction<'_>> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }

    pub fn create_note(&mut self, note: &Note) -> ServiceResult<Written<Note>> {
        let dispatcher = self.dispatcher;
        let mut tx = self.begin()?;
        let note_id = SqliteNoteRepository::new(&tx).create_note(note)?;
        let index = dispatcher.on_note_written(&mut tx, note_id);
        let record = read_note(&tx, note_id, "created note not found in read-back")?;
        tx.commit()?;

        info!(
            "event=note_create module=service status=ok note_id={} index_clean={}",
            note_id,
            index.is_clean()
        );
        Ok(Written { record, index })
    }

    /// Replaces the note's editable fields. Reserved metadata keys keep the
    /// values last written by frontmatter extraction.
    pub fn update_note(&mut self, note: &Note) -> ServiceResult<Written<Note>> {
        let dispatcher = self.dispatcher;
        let mut tx = self.begin()?;
        {
            let repo = SqliteNoteRepository::new(&tx);
            let stored = repo.get_note(note.uuid)?.ok_or(ServiceError::NoteNotFound(note.uuid))?;
            let mut next = note.clone();
            for key in RESERVED_METADATA_KEYS {
                match stored.metadata.get(key) {
                    Some(value) => next.metadata.insert(key.to_string(), value.clone()),
                    None => next.metadata.remove(key),
                };
            }
            repo.update_note(&next)?;
        }
        let index = dispatcher.on_note_written(&mut tx, note.uuid);
        let record = read_note(&tx, note.uuid, "updated note not found in read-back")?;
        tx.commit()?;

        info!(
            "event=note_update module=service status=ok note_id={} index_clean={}",
            note.uuid,
            index.is_clean()
        );
        Ok(Written { record, index })
    }

    /// Deletes a note, its sub-notes, every edge it originated and every edge
    /// pointing at it.
    pub fn delete_note(&mut self, note_id: NoteId) -> ServiceResult<DispatchReport> {
        let dispatcher = self.dispatcher;
        let mut tx = self.begin()?;
        if SqliteNoteRepository::new(&tx).get_note(note_id)?.is_none() {
            return Err(ServiceError::NoteNotFound(note_id));
        }
        let index = dispatcher.on_note_deleting(&mut tx, note_id);
        SqliteNoteRepository::new(&tx).delete_note(note_id)?;
        tx.commit()?;

        info!(
            "event=note_delete module=service status=ok note_id={} index_clean={}",
            note_id,
            index.is_clean()
        );
        Ok(index)
    }

    pub fn get_note(&self, note_id: NoteId) -> ServiceResult<Option<Note>> {
        Ok(SqliteNoteRepository::new(&*self.conn).get_note(note_id)?)
    }

    pub fn get_note_by_slug(&self, owner_id: OwnerId, slug: &str) -> ServiceResult<Option<Note>> {
        let repo = SqliteNoteRepository::new(&*self.conn);
        match repo.resolve_slug(owner_id, slug)? {
            Some(note_id) => Ok(repo.get_note(note_id)?),
            None => Ok(None),
        }
    }

    pub fn list_notes(
        &self,
        owner_id: OwnerId,
        limit: Option<u32>,
        offset: u32,
    ) -> ServiceResult<NotesPage> {
        let applied_limit = normalize_note_limit(limit);
        let items = SqliteNoteRepository::new(&*self.conn).list_notes(
            owner_id,
            Some(applied_limit),
            offset,
        )?;
        Ok(NotesPage {
            items,
            applied_limit,
        })
    }

    pub fn create_sub_note(&mut self, sub_note: &SubNote) -> ServiceResult<Written<SubNote>> {
        let dispatcher = self.dispatcher;
        let mut tx = self.begin()?;
        let sub_note_id = SqliteSubNoteRepository::new(&tx).create_sub_note(sub_note)?;
        let stored = read_sub_note(&tx, sub_note_id, "created sub-note not found in read-back")?;
        let index = dispatcher.on_sub_note_written(&mut tx, &stored);
        let record = read_sub_note(&tx, sub_note_id, "created sub-note not found in read-back")?;
        tx.commit()?;

        info!(
            "event=sub_note_create module=service status=ok sub_note_id={} note_id={} index_clean={}",
            sub_note_id,
            record.note_id,
            index.is_clean()
        );
        Ok(Written { record, index })
    }

    pub fn update_sub_note(&mut self, sub_note: &SubNote) -> ServiceResult<Written<SubNote>> {
        let dispatcher = self.dispatcher;
        let mut tx = self.begin()?;
        SqliteSubNoteRepository::new(&tx).update_sub_note(sub_note)?;
        let stored = read_sub_note(&tx, sub_note.uuid, "updated sub-note not found in read-back")?;
        let index = dispatcher.on_sub_note_written(&mut tx, &stored);
        let record = read_sub_note(&tx, sub_note.uuid, "updated sub-note not found in read-back")?;
        tx.commit()?;

        info!(
            "event=sub_note_update module=service status=ok sub_note_id={} note_id={} index_clean={}",
            sub_note.uuid,
            record.note_id,
            index.is_clean()
        );
        Ok(Written { record, index })
    }

    /// Deletes a sub-note and every edge it originated.
    pub fn delete_sub_note(&mut self, sub_note_id: SubNoteId) -> ServiceResult<DispatchReport> {
        let dispatcher = self.dispatcher;
        let mut tx = self.begin()?;
        if SqliteSubNoteRepository::new(&tx)
            .get_sub_note(sub_note_id)?
            .is_none()
        {
            return Err(ServiceError::SubNoteNotFound(sub_note_id));
        }
        let index = dispatcher.on_sub_note_deleting(&mut tx, sub_note_id);
        SqliteSubNoteRepository::new(&tx).delete_sub_note(sub_note_id)?;
        tx.commit()?;

        info!(
            "event=sub_note_delete module=service status=ok sub_note_id={} index_clean={}",
            sub_note_id,
            index.is_clean()
        );
        Ok(index)
    }

    pub fn get_sub_note(&self, sub_note_id: SubNoteId) -> ServiceResult<Option<SubNote>> {
        Ok(SqliteSubNoteRepository::new(&*self.conn).get_sub_note(sub_note_id)?)
    }

    /// Sub-notes of a note in sibling order.
    pub fn list_sub_notes(&self, note_id: NoteId) -> ServiceResult<Vec<SubNote>> {
        Ok(SqliteSubNoteRepository::new(&*self.conn).list_sub_notes(note_id)?)
    }

    /// Edges pointing at `note_id`, oldest first. Unknown notes have none.
    pub fn backlinks(&self, note_id: NoteId) -> ServiceResult<Vec<Backlink>> {
        Ok(SqliteLinkRepository::new(&*self.conn).backlinks(note_id)?)
    }

    pub fn graph_entry(&self, note_id: NoteId) -> ServiceResult<Option<GraphCacheEntry>> {
        Ok(graph_cache::entry(&*self.conn, note_id)?)
    }

    /// Discards the graph cache and replays all edges into it.
    pub fn rebuild_graph_cache(&mut self) -> ServiceResult<RebuildReport> {
        let tx = self.begin()?;
        let report = graph_cache::rebuild_from_edges(&tx)?;
        tx.commit()?;
        Ok(report)
    }

    pub fn stats(&self) -> ServiceResult<StorageStats> {
        let conn: &Connection = &*self.conn;
        let count = |table: &str| -> ServiceResult<i64> {
            Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| row.get(0))?)
        };
        Ok(StorageStats {
            schema_version: current_user_version(conn).map_err(RepoError::from)?,
            notes: count("notes")?,
            sub_notes: count("sub_notes")?,
            links: count("links")?,
            graph_cache_entries: count("graph_cache")?,
        })
    }

    /// Notes whose cached entry differs from a replay of the edge table.
    pub fn verify_graph_cache(&self) -> ServiceResult<Vec<GraphCacheDrift>> {
        Ok(graph_cache::verify_against_edges(&*self.conn)?)
    }
}

fn read_note(conn: &Connection, note_id: NoteId, context: &'static str) -> ServiceResult<Note> {
    SqliteNoteRepository::new(conn)
        .get_note(note_id)?
        .ok_or(ServiceError::InconsistentState(context))
}

fn read_sub_note(
    conn: &Connection,
    sub_note_id: SubNoteId,
    context: &'static str,
) -> ServiceResult<SubNote> {
    SqliteSubNoteRepository::new(conn)
        .get_sub_note(sub_note_id)?
        .ok_or(ServiceError::InconsistentState(context))
}
