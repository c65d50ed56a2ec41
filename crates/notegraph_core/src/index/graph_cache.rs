//! Graph cache maintainer.
//!
//! # Responsibility
//! - Keep a per-note adjacency summary (connected note ids + strength) in
//!   step with edge creation and deletion.
//! - Rebuild the cache from the edge table and report drift against it.
//!
//! # Invariants
//! - Every mutation is an SQL upsert/increment executed inside the caller's
//!   write transaction; no caller reads an entry, modifies it in memory and
//!   writes it back.
//! - Edge creation is symmetric: the target gains the source as neighbour
//!   too, giving an undirected backlink view over directed edges.
//! - Entries are created lazily and pruned once they return to strength 0
//!   with no neighbours.
//! - The cache is never authoritative. Deletion removes the counterpart and
//!   decrements strength unconditionally, so duplicate edges between one pair
//!   make strength drift away from the edge table. Replaying edges into an
//!   empty cache is the only source of truth for membership.

use crate::index::IndexResult;
use crate::model::link::Link;
use crate::model::note::NoteId;
use crate::repo::link_repo::{LinkRepository, SqliteLinkRepository};
use crate::repo::parse_uuid;
use log::{debug, info};
use rusqlite::{params, Connection};
use std::collections::{BTreeMap, BTreeSet};

/// Adjacency summary of one note.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphCacheEntry {
    pub note_id: NoteId,
    pub connected: BTreeSet<NoteId>,
    pub strength: i64,
}

/// One note whose stored entry differs from an edge replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphCacheDrift {
    pub note_id: NoteId,
    pub stored: Option<GraphCacheEntry>,
    pub replayed: Option<GraphCacheEntry>,
}

/// Summary of a full rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildReport {
    pub edges_replayed: usize,
    pub entries: usize,
}

/// Applies the cache reaction to a newly written edge.
pub fn apply_edge_created(conn: &Connection, source: NoteId, target: NoteId) -> IndexResult<()> {
    connect_side(conn, source, target)?;
    if source != target {
        connect_side(conn, target, source)?;
    }
    Ok(())
}

/// Applies the cache reaction to a deleted edge.
///
/// A missing entry on either side is treated as already clean.
pub fn apply_edge_deleted(conn: &Connection, source: NoteId, target: NoteId) -> IndexResult<()> {
    disconnect_side(conn, source, target)?;
    if source != target {
        disconnect_side(conn, target, source)?;
    }
    Ok(())
}

pub fn on_link_created(conn: &Connection, link: &Link) -> IndexResult<()> {
    debug!(
        "event=graph_cache_update module=index status=start op=create link_id={}",
        link.id
    );
    apply_edge_created(conn, link.source_note_id, link.target_note_id)
}

pub fn on_link_deleted(conn: &Connection, link: &Link) -> IndexResult<()> {
    debug!(
        "event=graph_cache_update module=index status=start op=delete link_id={}",
        link.id
    );
    apply_edge_deleted(conn, link.source_note_id, link.target_note_id)
}

fn connect_side(conn: &Connection, note: NoteId, neighbor: NoteId) -> IndexResult<()> {
    let note_text = note.to_string();
    conn.execute(
        "INSERT INTO graph_cache (note_uuid, strength)
         VALUES (?1, 0)
         ON CONFLICT(note_uuid) DO NOTHING;",
        [note_text.as_str()],
    )?;
    let added = conn.execute(
        "INSERT INTO graph_cache_neighbors (note_uuid, neighbor_uuid)
         VALUES (?1, ?2)
         ON CONFLICT(note_uuid, neighbor_uuid) DO NOTHING;",
        params![note_text.as_str(), neighbor.to_string()],
    )?;
    if added == 1 {
        conn.execute(
            "UPDATE graph_cache
             SET
                strength = strength + 1,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE note_uuid = ?1;",
            [note_text.as_str()],
        )?;
    }
    Ok(())
}

fn disconnect_side(conn: &Connection, note: NoteId, neighbor: NoteId) -> IndexResult<()> {
    let note_text = note.to_string();
    conn.execute(
        "DELETE FROM graph_cache_neighbors WHERE note_uuid = ?1 AND neighbor_uuid = ?2;",
        params![note_text.as_str(), neighbor.to_string()],
    )?;
    conn.execute(
        "UPDATE graph_cache
         SET
            strength = strength - 1,
            updated_at = (strftime('%s', 'now') * 1000)
         WHERE note_uuid = ?1;",
        [note_text.as_str()],
    )?;
    conn.execute(
        "DELETE FROM graph_cache
         WHERE note_uuid = ?1
           AND strength = 0
           AND NOT EXISTS (
               SELECT 1 FROM graph_cache_neighbors WHERE note_uuid = ?1
           );",
        [note_text.as_str()],
    )?;
    Ok(())
}

/// Reads one entry; `None` means the note has no cached connections.
pub fn entry(conn: &Connection, note_id: NoteId) -> IndexResult<Option<GraphCacheEntry>> {
    Ok(load_entries(conn, Some(note_id))?.remove(&note_id))
}

/// Reads every stored entry keyed by note id.
pub fn snapshot(conn: &Connection) -> IndexResult<BTreeMap<NoteId, GraphCacheEntry>> {
    load_entries(conn, None)
}

fn load_entries(
    conn: &Connection,
    only: Option<NoteId>,
) -> IndexResult<BTreeMap<NoteId, GraphCacheEntry>> {
    let filter = only.map(|id| id.to_string());
    let mut entries = BTreeMap::new();

    let mut stmt = conn.prepare(
        "SELECT note_uuid, strength
         FROM graph_cache
         WHERE ?1 IS NULL OR note_uuid = ?1
         ORDER BY note_uuid ASC;",
    )?;
    let mut rows = stmt.query([filter.as_deref()])?;
    while let Some(row) = rows.next()? {
        let note_text: String = row.get("note_uuid")?;
        let note_id = parse_uuid(&note_text, "graph_cache.note_uuid")?;
        entries.insert(
            note_id,
            GraphCacheEntry {
                note_id,
                connected: BTreeSet::new(),
                strength: row.get("strength")?,
            },
        );
    }

    let mut stmt = conn.prepare(
        "SELECT note_uuid, neighbor_uuid
         FROM graph_cache_neighbors
         WHERE ?1 IS NULL OR note_uuid = ?1;",
    )?;
    let mut rows = stmt.query([filter.as_deref()])?;
    while let Some(row) = rows.next()? {
        let note_text: String = row.get("note_uuid")?;
        let neighbor_text: String = row.get("neighbor_uuid")?;
        let note_id = parse_uuid(&note_text, "graph_cache_neighbors.note_uuid")?;
        let neighbor = parse_uuid(&neighbor_text, "graph_cache_neighbors.neighbor_uuid")?;
        if let Some(entry) = entries.get_mut(&note_id) {
            entry.connected.insert(neighbor);
        }
    }

    Ok(entries)
}

/// Clears the cache and replays every current edge in insertion order.
pub fn rebuild_from_edges(conn: &Connection) -> IndexResult<RebuildReport> {
    let links = SqliteLinkRepository::new(conn).all_links()?;
    conn.execute_batch(
        "DELETE FROM graph_cache_neighbors;
         DELETE FROM graph_cache;",
    )?;
    for link in &links {
        apply_edge_created(conn, link.source_note_id, link.target_note_id)?;
    }
    let entries: i64 = conn.query_row("SELECT COUNT(*) FROM graph_cache;", [], |row| row.get(0))?;

    let report = RebuildReport {
        edges_replayed: links.len(),
        entries: usize::try_from(entries).unwrap_or_default(),
    };
    info!(
        "event=graph_cache_rebuild module=index status=ok edges={} entries={}",
        report.edges_replayed, report.entries
    );
    Ok(report)
}

/// Computes, in memory, the cache an empty state reaches after replaying
/// `edges` through the creation rule.
pub fn replay_edges<I>(edges: I) -> BTreeMap<NoteId, GraphCacheEntry>
where
    I: IntoIterator<Item = (NoteId, NoteId)>,
{
    let mut entries: BTreeMap<NoteId, GraphCacheEntry> = BTreeMap::new();
    let mut connect = |note: NoteId, neighbor: NoteId| {
        let entry = entries.entry(note).or_insert_with(|| GraphCacheEntry {
            note_id: note,
            ..GraphCacheEntry::default()
        });
        if entry.connected.insert(neighbor) {
            entry.strength += 1;
        }
    };
    for (source, target) in edges {
        connect(source, target);
        if source != target {
            connect(target, source);
        }
    }
    entries
}

/// Compares the stored cache with a replay of the current edge table.
pub fn verify_against_edges(conn: &Connection) -> IndexResult<Vec<GraphCacheDrift>> {
    let links = SqliteLinkRepository::new(conn).all_links()?;
    let mut replayed = replay_edges(
        links
            .iter()
            .map(|link| (link.source_note_id, link.target_note_id)),
    );
    let mut stored = snapshot(conn)?;

    let note_ids = stored
        .keys()
        .chain(replayed.keys())
        .copied()
        .collect::<BTreeSet<_>>();
    let mut drift = Vec::new();
    for note_id in note_ids {
        let stored_entry = stored.remove(&note_id);
        let replayed_entry = replayed.remove(&note_id);
        if stored_entry != replayed_entry {
            drift.push(GraphCacheDrift {
                note_id,
                stored: stored_entry,
                replayed: replayed_entry,
            });
        }
    }
    Ok(drift)
}
