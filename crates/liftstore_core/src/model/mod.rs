//! Lexical entry model with change tracking.
//!
//! # Responsibility
//! - Define the in-memory record persisted by the repository.
//! - Route every mutation through setters that report whether anything
//!   changed, marking the entry dirty and stamping its modification time.
//!
//! # Invariants
//! - Reads never touch dirty/timestamp state.
//! - Assigning an identical value is a no-op.
//! - `date_modified >= date_created` and never decreases.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod entry;
pub mod multitext;

/// Errors raised by entry mutators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// No sense with this id on the entry.
    SenseNotFound(String),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SenseNotFound(id) => write!(f, "sense not found: {id}"),
        }
    }
}

impl Error for ModelError {}
