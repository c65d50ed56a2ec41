//! Use-case services.
//!
//! # Responsibility
//! - Wrap repository writes and index dispatch into transactional units.
//! - Keep callers (CLI, embedders) decoupled from SQL and savepoints.

pub mod note_service;
