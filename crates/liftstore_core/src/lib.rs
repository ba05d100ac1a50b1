//! Order-preserving LIFT entry store.
//! Loads a LIFT document, tracks edits on entries and writes them back with
//! minimal, canonically ordered tree changes.

pub mod config;
pub mod logging;
pub mod model;
pub mod repo;
pub mod xml;

pub use config::{LoggingConfig, RepositoryOptions};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::entry::{LexEntry, Sense, Trait};
pub use model::multitext::MultiText;
pub use model::ModelError;
pub use repo::lift_repo::LiftEntryRepository;
pub use repo::{EntryRepository, RepoError, RepoResult};
pub use xml::{NameOrder, SiblingOrder, XmlDocument, XmlError, XmlPath, XmlResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
