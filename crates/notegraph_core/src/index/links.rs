//! Wiki-link extractor.
//!
//! # Responsibility
//! - Scan sub-note text for `[[target]]`, `[[target|alias]]` and
//!   `![[target]]` references.
//! - Resolve targets by exact slug within the source note's owner and upsert
//!   one edge per distinct `(target, label)` pair.
//! - Hand every newly written or removed edge to the graph cache.
//!
//! # Invariants
//! - Unresolvable targets are skipped, never errors.
//! - Re-extracting unchanged text writes nothing and leaves the cache as is.
//! - A mention whose `!` prefix changed updates the edge's link type in
//!   place; the cache is untouched since strength ignores link type.
//! - In append-only mode edges are never removed here.

use crate::config::LinkSyncMode;
use crate::index::{graph_cache, IndexError, IndexResult};
use crate::model::link::{Link, LinkType, NewLink};
use crate::model::note::NoteId;
use crate::model::sub_note::{SubNote, SubNoteId};
use crate::repo::link_repo::{LinkRepository, LinkUpsert, SqliteLinkRepository};
use crate::repo::note_repo::{NoteRepository, SqliteNoteRepository};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Connection;
use std::collections::BTreeSet;

static WIKI_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(!?)\[\[(.+?)\]\]").expect("wiki link regex must compile"));

/// One reference found in text, before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkCandidate {
    pub target: String,
    pub label: String,
    pub link_type: LinkType,
}

/// What one extraction pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkExtraction {
    pub inserted: Vec<Link>,
    pub retyped: Vec<Link>,
    pub unchanged: usize,
    pub unresolved: usize,
    pub removed: Vec<Link>,
}

/// Finds link candidates in `text`, in order of appearance.
pub fn scan_links(text: &str) -> Vec<LinkCandidate> {
    WIKI_LINK_RE
        .captures_iter(text)
        .filter_map(|captures| {
            let inner = captures.get(2)?.as_str();
            let (target, alias) = match inner.split_once('|') {
                Some((target, alias)) => (target, Some(alias)),
                None => (inner, None),
            };
            let label = alias.filter(|alias| !alias.is_empty()).unwrap_or(target);
            let link_type = if captures.get(1).is_some_and(|bang| !bang.is_empty()) {
                LinkType::Embed
            } else {
                LinkType::Reference
            };
            Some(LinkCandidate {
                target: target.to_string(),
                label: label.to_string(),
                link_type,
            })
        })
        .collect()
}

/// Keeps one candidate per `(target, label)` in first-seen order; the last
/// mention decides the link type.
fn collapse_mentions(candidates: Vec<LinkCandidate>) -> Vec<LinkCandidate> {
    let mut collapsed: Vec<LinkCandidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match collapsed
            .iter_mut()
            .find(|seen| seen.target == candidate.target && seen.label == candidate.label)
        {
            Some(seen) => seen.link_type = candidate.link_type,
            None => collapsed.push(candidate),
        }
    }
    collapsed
}

/// Re-extracts edges originated by `sub_note`.
///
/// Every edge this call inserts or deletes is passed to the graph cache in
/// the same transaction.
pub fn extract_links(
    conn: &Connection,
    sub_note: &SubNote,
    mode: LinkSyncMode,
) -> IndexResult<LinkExtraction> {
    let notes = SqliteNoteRepository::new(conn);
    let links = SqliteLinkRepository::new(conn);
    let source = notes
        .get_note(sub_note.note_id)?
        .ok_or(IndexError::MissingRecord {
            entity: "note",
            id: sub_note.note_id,
        })?;

    let mut extraction = LinkExtraction::default();
    let mut mentioned = BTreeSet::new();
    let candidates = sub_note
        .text()
        .map(|text| collapse_mentions(scan_links(text)))
        .unwrap_or_default();

    for candidate in candidates {
        let Some(target_id) = notes.resolve_slug(source.owner_id, &candidate.target)? else {
            extraction.unresolved += 1;
            continue;
        };
        mentioned.insert((target_id, candidate.label.clone()));

        let new_link = NewLink {
            source_note_id: source.uuid,
            target_note_id: target_id,
            source_sub_note_id: Some(sub_note.uuid),
            label: candidate.label,
            link_type: candidate.link_type,
        };
        match links.upsert_link(&new_link)? {
            LinkUpsert::Inserted(link) => {
                graph_cache::on_link_created(conn, &link)?;
                extraction.inserted.push(link);
            }
            LinkUpsert::Retyped(link) => extraction.retyped.push(link),
            LinkUpsert::Existing => extraction.unchanged += 1,
        }
    }

    if mode == LinkSyncMode::Reconcile {
        for stale in links.links_from_sub_note(sub_note.uuid)? {
            if mentioned.contains(&(stale.target_note_id, stale.label.clone())) {
                continue;
            }
            if let Some(removed) = links.delete_link(stale.id)? {
                graph_cache::on_link_deleted(conn, &removed)?;
                extraction.removed.push(removed);
            }
        }
    }

    debug!(
        "event=links_extract module=index status=ok sub_note_id={} mode={} inserted={} retyped={} unchanged={} unresolved={} removed={}",
        sub_note.uuid,
        mode.as_str(),
        extraction.inserted.len(),
        extraction.retyped.len(),
        extraction.unchanged,
        extraction.unresolved,
        extraction.removed.len()
    );
    Ok(extraction)
}

/// Deletes every edge originated by a sub-note, decrementing the cache for
/// each. Returns the removed edges.
pub fn remove_sub_note_links(conn: &Connection, sub_note_id: SubNoteId) -> IndexResult<Vec<Link>> {
    let links = SqliteLinkRepository::new(conn);
    let mut removed = Vec::new();
    for link in links.links_from_sub_note(sub_note_id)? {
        if let Some(link) = links.delete_link(link.id)? {
            graph_cache::on_link_deleted(conn, &link)?;
            removed.push(link);
        }
    }
    Ok(removed)
}

/// Deletes every edge pointing at a note, decrementing the cache for each.
pub fn remove_incoming_links(conn: &Connection, note_id: NoteId) -> IndexResult<Vec<Link>> {
    let links = SqliteLinkRepository::new(conn);
    let mut removed = Vec::new();
    for link in links.links_targeting(note_id)? {
        if let Some(link) = links.delete_link(link.id)? {
            graph_cache::on_link_deleted(conn, &link)?;
            removed.push(link);
        }
    }
    Ok(removed)
}
