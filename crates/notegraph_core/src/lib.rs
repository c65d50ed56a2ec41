//! Incremental indexing core for a note graph.
//!
//! Notes and their typed sub-notes live in SQLite. Every content write is
//! followed, in the same transaction, by derived-data maintenance: search
//! vectors, typed frontmatter, `[[wiki link]]` edges and a per-note graph
//! cache.

pub mod config;
pub mod db;
pub mod index;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, CoreConfig, IndexConfig, LinkSyncMode};
pub use db::{open_db, open_db_in_memory, DbError};
pub use index::dispatcher::{DispatchReport, IndexDispatcher, IndexStep, StepOutcome};
pub use index::graph_cache::{GraphCacheDrift, GraphCacheEntry, RebuildReport};
pub use index::{IndexError, IndexResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::link::{Backlink, Link, LinkId, LinkType};
pub use model::note::{Note, NoteFrontmatter, NoteId, OwnerId};
pub use model::sub_note::{SubNote, SubNoteId, SubNoteKind, Visibility};
pub use model::ModelValidationError;
pub use repo::{RepoError, RepoResult};
pub use service::note_service::{
    NoteService, NotesPage, ServiceError, ServiceResult, StorageStats, Written,
};

/// Liveness probe for embedders and the CLI.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
