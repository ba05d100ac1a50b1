//! Caller-facing configuration.
//!
//! # Responsibility
//! - Describe how a repository opens its backing file and how logging starts.
//! - Provide defaults so hosts only override what they need.
//!
//! Both structs deserialize with `serde`, so hosts can nest them inside
//! their own configuration files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Format version written into newly created documents.
pub const DEFAULT_LIFT_VERSION: &str = "0.13";

/// Options for opening a `LiftEntryRepository`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryOptions {
    /// Start from an empty document when the file does not exist yet.
    pub create_if_missing: bool,
    /// `producer` attribute of newly created documents.
    pub producer: String,
    /// `version` attribute of newly created documents.
    pub lift_version: String,
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self {
            create_if_missing: false,
            producer: format!("liftstore {}", env!("CARGO_PKG_VERSION")),
            lift_version: DEFAULT_LIFT_VERSION.to_string(),
        }
    }
}

/// Logging bootstrap settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of `trace|debug|info|warn|error` (case-insensitive).
    pub level: String,
    /// Absolute directory for rolling log files.
    pub log_dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: crate::logging::default_log_level().to_string(),
            log_dir: std::env::temp_dir().join("liftstore-logs"),
        }
    }
}
