//! Repository layer over the persisted LIFT document.
//!
//! # Responsibility
//! - Define the entry repository contract and its typed errors.
//! - Keep document layout and file replacement details inside this boundary.
//!
//! # Invariants
//! - Reads are pure; they never alter dirty flags or timestamps.
//! - A failed save leaves both the on-disk file and in-memory state as they
//!   were before the call.
//! - Missing ids are reported as `NotFound`, never as a default value.

use crate::model::entry::LexEntry;
use crate::model::ModelError;
use crate::xml::XmlError;
use chrono::{DateTime, Utc};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub mod lift_format;
pub mod lift_repo;
mod storage;

pub type RepoResult<T> = Result<T, RepoError>;

/// Errors from loading, querying and persisting entries.
#[derive(Debug)]
pub enum RepoError {
    /// Source is not a well-formed LIFT document.
    Unreadable { path: PathBuf, message: String },
    /// An entry carries a malformed required value.
    Corrupt { entry: String, message: String },
    /// No entry with this id.
    NotFound(String),
    /// Saved record shares an id with a stored entry of another identity.
    Conflict { entry: String, message: String },
    /// Tree edit was given an unresolvable or malformed path.
    Path(XmlError),
    Model(ModelError),
    /// Flushing to storage failed; the previous file is intact.
    Io(std::io::Error),
    /// Repository was disposed.
    Disposed,
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unreadable { path, message } => {
                write!(f, "cannot read `{}`: {message}", path.display())
            }
            Self::Corrupt { entry, message } => write!(f, "corrupt entry `{entry}`: {message}"),
            Self::NotFound(id) => write!(f, "entry not found: {id}"),
            Self::Conflict { entry, message } => {
                write!(f, "conflicting entry `{entry}`: {message}")
            }
            Self::Path(err) => write!(f, "{err}"),
            Self::Model(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "storage error: {err}"),
            Self::Disposed => write!(f, "repository has been disposed"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Path(err) => Some(err),
            Self::Model(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::Unreadable { .. }
            | Self::Corrupt { .. }
            | Self::NotFound(_)
            | Self::Conflict { .. }
            | Self::Disposed => None,
        }
    }
}

impl From<XmlError> for RepoError {
    fn from(value: XmlError) -> Self {
        Self::Path(value)
    }
}

impl From<ModelError> for RepoError {
    fn from(value: ModelError) -> Self {
        Self::Model(value)
    }
}

impl From<std::io::Error> for RepoError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Repository interface for lexical entries.
pub trait EntryRepository {
    fn get(&self, id: &str) -> RepoResult<LexEntry>;
    fn get_all(&self) -> RepoResult<Vec<LexEntry>>;
    /// Persists one entry and clears its dirty flag.
    ///
    /// A record whose guid differs from the stored entry with the same id is
    /// rejected with `Conflict`.
    fn save_item(&self, entry: &mut LexEntry) -> RepoResult<()>;
    /// Persists all entries with a single flush.
    fn save_items(&self, entries: &mut [LexEntry]) -> RepoResult<()>;
    fn delete(&self, id: &str) -> RepoResult<()>;
    /// Newest `date_modified` across all entries.
    fn last_modified(&self) -> RepoResult<DateTime<Utc>>;
}
