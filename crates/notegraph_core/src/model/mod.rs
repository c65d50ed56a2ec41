//! Domain model for notes, their ordered sub-notes and the link edges
//! derived from sub-note content.
//!
//! # Responsibility
//! - Define canonical records shared by repositories and index builders.
//! - Validate record-local invariants before persistence.
//!
//! # Invariants
//! - Every record is identified by a stable UUID.
//! - Derived fields (`search_vector`, typed frontmatter columns) are never
//!   authoritative; they are rebuilt from the record's own content.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod link;
pub mod note;
pub mod sub_note;

/// Record-local validation failures raised before any SQL mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelValidationError {
    /// Slug is empty after trimming.
    EmptySlug,
    /// Slug carries whitespace padding or characters reserved by link syntax.
    InvalidSlug(String),
    /// Note title is empty after trimming.
    EmptyTitle,
    /// Sub-note position is NaN or infinite.
    NonFinitePosition(f64),
}

impl Display for ModelValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptySlug => write!(f, "slug must not be empty"),
            Self::InvalidSlug(slug) => write!(f, "invalid slug `{slug}`"),
            Self::EmptyTitle => write!(f, "title must not be empty"),
            Self::NonFinitePosition(value) => {
                write!(f, "sub-note position must be finite, got {value}")
            }
        }
    }
}

impl Error for ModelValidationError {}
