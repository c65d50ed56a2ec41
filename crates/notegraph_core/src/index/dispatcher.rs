//! Content event dispatcher.
//!
//! # Responsibility
//! - Map each content event to its ordered derived steps.
//! - Contain step failures: every step runs in its own savepoint, a failing
//!   step is rolled back and reported, later steps still run.
//!
//! # Invariants
//! - The dispatcher never fails the content write that triggered it; all
//!   outcomes land in the returned [`DispatchReport`].
//! - Sub-note writes run search vector, then frontmatter, then links.
//! - Deletion cleanup runs before the content row is removed so every edge
//!   it drops is seen by the graph cache.

use crate::config::{IndexConfig, LinkSyncMode};
use crate::index::frontmatter::{apply_to_note, FrontmatterOutcome};
use crate::index::links::{extract_links, remove_incoming_links, remove_sub_note_links};
use crate::index::search_vector::{reindex_note, reindex_sub_note};
use crate::index::{IndexError, IndexResult};
use crate::model::note::NoteId;
use crate::model::sub_note::{SubNote, SubNoteId, SubNoteKind};
use crate::repo::note_repo::{NoteRepository, SqliteNoteRepository};
use crate::repo::sub_note_repo::{SqliteSubNoteRepository, SubNoteRepository};
use log::{info, warn};
use rusqlite::{Connection, Transaction};
use std::time::Instant;
use uuid::Uuid;

/// Derived step identifiers, as they appear in reports and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexStep {
    NoteSearchVector,
    SubNoteSearchVector,
    Frontmatter,
    Links,
    OutgoingEdgeCleanup,
    IncomingEdgeCleanup,
}

impl IndexStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoteSearchVector => "note_search_vector",
            Self::SubNoteSearchVector => "sub_note_search_vector",
            Self::Frontmatter => "frontmatter",
            Self::Links => "links",
            Self::OutgoingEdgeCleanup => "outgoing_edge_cleanup",
            Self::IncomingEdgeCleanup => "incoming_edge_cleanup",
        }
    }
}

/// Result of one derived step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Applied,
    /// Not applicable to this record (wrong kind, no frontmatter block).
    Skipped,
    /// Completed with a recorded fallback; carries a stable error code.
    Degraded(&'static str),
    /// Rolled back; the message is the error display text.
    Failed(String),
}

/// Outcome of every step run for one content event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub trigger: &'static str,
    pub record_id: Uuid,
    pub steps: Vec<(IndexStep, StepOutcome)>,
}

impl DispatchReport {
    fn new(trigger: &'static str, record_id: Uuid) -> Self {
        Self {
            trigger,
            record_id,
            steps: Vec::new(),
        }
    }

    pub fn outcome(&self, step: IndexStep) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .find(|(candidate, _)| *candidate == step)
            .map(|(_, outcome)| outcome)
    }

    pub fn failures(&self) -> impl Iterator<Item = (IndexStep, &str)> {
        self.steps.iter().filter_map(|(step, outcome)| match outcome {
            StepOutcome::Failed(message) => Some((*step, message.as_str())),
            _ => None,
        })
    }

    /// `true` when no step failed; degraded steps still count as clean.
    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }

    fn status(&self) -> &'static str {
        if !self.is_clean() {
            "error"
        } else if self
            .steps
            .iter()
            .any(|(_, outcome)| matches!(outcome, StepOutcome::Degraded(_)))
        {
            "degraded"
        } else {
            "ok"
        }
    }
}

/// Routes content events to derived steps.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexDispatcher {
    config: IndexConfig,
}

impl IndexDispatcher {
    pub fn new(config: IndexConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> IndexConfig {
        self.config
    }

    /// Note created or updated: rebuild its search vector.
    pub fn on_note_written(&self, tx: &mut Transaction<'_>, note_id: NoteId) -> DispatchReport {
        let started = Instant::now();
        let mut report = DispatchReport::new("note_written", note_id);
        run_step(tx, &mut report, IndexStep::NoteSearchVector, |conn| {
            reindex_note_by_id(conn, note_id)
        });
        log_dispatch(&report, started);
        report
    }

    /// Sub-note created or updated.
    pub fn on_sub_note_written(
        &self,
        tx: &mut Transaction<'_>,
        sub_note: &SubNote,
    ) -> DispatchReport {
        let started = Instant::now();
        let mut report = DispatchReport::new("sub_note_written", sub_note.uuid);

        run_step(tx, &mut report, IndexStep::SubNoteSearchVector, |conn| {
            reindex_sub_note(conn, sub_note)?;
            Ok(StepOutcome::Applied)
        });

        run_step(tx, &mut report, IndexStep::Frontmatter, |conn| {
            let Some(text) = sub_note.text().filter(|_| sub_note.kind == SubNoteKind::Markdown)
            else {
                return Ok(StepOutcome::Skipped);
            };
            match apply_to_note(conn, sub_note.note_id, text)? {
                FrontmatterOutcome::Absent => Ok(StepOutcome::Skipped),
                FrontmatterOutcome::Parsed { .. } => reindex_note_by_id(conn, sub_note.note_id),
                FrontmatterOutcome::Degraded { error, .. } => Ok(StepOutcome::Degraded(error.code())),
            }
        });

        let link_sync = self.config.link_sync;
        run_step(tx, &mut report, IndexStep::Links, |conn| {
            if !sub_note.kind.is_textual() && link_sync == LinkSyncMode::AppendOnly {
                return Ok(StepOutcome::Skipped);
            }
            extract_links(conn, sub_note, link_sync)?;
            Ok(StepOutcome::Applied)
        });

        log_dispatch(&report, started);
        report
    }

    /// Sub-note about to be deleted: drop the edges it originated.
    pub fn on_sub_note_deleting(
        &self,
        tx: &mut Transaction<'_>,
        sub_note_id: SubNoteId,
    ) -> DispatchReport {
        let started = Instant::now();
        let mut report = DispatchReport::new("sub_note_deleting", sub_note_id);
        run_step(tx, &mut report, IndexStep::OutgoingEdgeCleanup, |conn| {
            remove_sub_note_links(conn, sub_note_id)?;
            Ok(StepOutcome::Applied)
        });
        log_dispatch(&report, started);
        report
    }

    /// Note about to be deleted: drop edges from each of its sub-notes and
    /// every edge pointing at it.
    pub fn on_note_deleting(&self, tx: &mut Transaction<'_>, note_id: NoteId) -> DispatchReport {
        let started = Instant::now();
        let mut report = DispatchReport::new("note_deleting", note_id);
        run_step(tx, &mut report, IndexStep::OutgoingEdgeCleanup, |conn| {
            for sub_note in SqliteSubNoteRepository::new(conn).list_sub_notes(note_id)? {
                remove_sub_note_links(conn, sub_note.uuid)?;
            }
            Ok(StepOutcome::Applied)
        });
        run_step(tx, &mut report, IndexStep::IncomingEdgeCleanup, |conn| {
            remove_incoming_links(conn, note_id)?;
            Ok(StepOutcome::Applied)
        });
        log_dispatch(&report, started);
        report
    }
}

fn reindex_note_by_id(conn: &Connection, note_id: NoteId) -> IndexResult<StepOutcome> {
    let note = SqliteNoteRepository::new(conn)
        .get_note(note_id)?
        .ok_or(IndexError::MissingRecord {
            entity: "note",
            id: note_id,
        })?;
    reindex_note(conn, &note)?;
    Ok(StepOutcome::Applied)
}

fn run_step<F>(tx: &mut Transaction<'_>, report: &mut DispatchReport, step: IndexStep, body: F)
where
    F: FnOnce(&Connection) -> IndexResult<StepOutcome>,
{
    let outcome = match tx.savepoint() {
        Ok(savepoint) => match body(&*savepoint) {
            Ok(outcome) => match savepoint.commit() {
                Ok(()) => outcome,
                Err(err) => StepOutcome::Failed(err.to_string()),
            },
            // Dropping the savepoint rolls the step back.
            Err(err) => StepOutcome::Failed(err.to_string()),
        },
        Err(err) => StepOutcome::Failed(err.to_string()),
    };

    if let StepOutcome::Failed(message) = &outcome {
        warn!(
            "event=index_step module=index status=error trigger={} record_id={} step={} error={}",
            report.trigger,
            report.record_id,
            step.as_str(),
            message
        );
    }
    report.steps.push((step, outcome));
}

fn log_dispatch(report: &DispatchReport, started: Instant) {
    info!(
        "event=index_dispatch module=index status={} trigger={} record_id={} steps={} duration_ms={}",
        report.status(),
        report.trigger,
        report.record_id,
        report.steps.len(),
        started.elapsed().as_millis()
    );
}
