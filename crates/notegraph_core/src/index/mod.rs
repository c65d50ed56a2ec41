//! Incremental derived-data pipeline.
//!
//! # Responsibility
//! - Recompute search vectors, typed frontmatter and link edges after a
//!   content write, and keep the graph cache in step with the edge table.
//! - Route every content event to the ordered set of derived steps.
//!
//! # Invariants
//! - Derived data is only ever written from the record's own content; no
//!   step reads derived data of another record to compute its own.
//! - Every step runs on the connection (transaction) of the content write
//!   that triggered it.

use crate::db::DbError;
use crate::repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod dispatcher;
pub mod frontmatter;
pub mod graph_cache;
pub mod links;
pub mod search_vector;
pub mod stemmer;

pub type IndexResult<T> = Result<T, IndexError>;

/// Error raised by a derived step.
#[derive(Debug)]
pub enum IndexError {
    Repo(RepoError),
    /// The record that triggered the step no longer exists.
    MissingRecord { entity: &'static str, id: Uuid },
}

impl Display for IndexError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "{err}"),
            Self::MissingRecord { entity, id } => write!(f, "{entity} vanished before indexing: {id}"),
        }
    }
}

impl Error for IndexError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::MissingRecord { .. } => None,
        }
    }
}

impl From<RepoError> for IndexError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<rusqlite::Error> for IndexError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(RepoError::Db(DbError::Sqlite(value)))
    }
}
