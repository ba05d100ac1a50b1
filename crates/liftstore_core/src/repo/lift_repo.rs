//! File-backed LIFT entry repository.
//!
//! # Responsibility
//! - Load a LIFT document into `LexEntry` records.
//! - Persist saves and deletes through order-preserving tree edits and one
//!   atomic file replacement per call.
//!
//! # Invariants
//! - Tree edits run on a copy of the document; in-memory state is replaced
//!   only after the flush succeeded.
//! - `last_modified` equals the greatest `date_modified` of all entries, or
//!   the Unix epoch when there are none.
//! - Saving never lowers the stored `date_modified` of an entry and never
//!   replaces its `date_created`.
//! - A byte order mark present on load is written back on every flush.

use super::lift_format::{read_entry, write_entry, EntryNodes, ENTRY, LIFT};
use super::storage::write_atomic;
use super::{EntryRepository, RepoError, RepoResult};
use crate::config::RepositoryOptions;
use crate::model::entry::LexEntry;
use crate::xml::{set_attribute, NodeId, NodeKind, XmlDocument};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use log::{debug, error, info};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Repository over one LIFT file.
///
/// Reads share a read lock. Saves and deletes hold the write lock across the
/// tree edit and the flush.
pub struct LiftEntryRepository {
    path: PathBuf,
    state: RwLock<Option<RepoState>>,
    flushes: AtomicU64,
}

struct RepoState {
    document: XmlDocument,
    lift: NodeId,
    entries: IndexMap<String, LexEntry>,
    nodes: HashMap<String, EntryNodes>,
    last_modified: DateTime<Utc>,
    bom: bool,
}

impl LiftEntryRepository {
    /// Loads `path` with default options.
    pub fn load(path: impl AsRef<Path>) -> RepoResult<Self> {
        Self::load_with(path, RepositoryOptions::default())
    }

    /// Loads `path`.
    ///
    /// # Errors
    /// - `Io` when the file cannot be read (or is missing and
    ///   `create_if_missing` is off).
    /// - `Unreadable` for malformed XML, invalid UTF-8 or a root other than
    ///   `lift`.
    /// - `Corrupt` for entries with bad identity, timestamps or duplicates.
    ///
    /// # Side effects
    /// - Emits `repo_load` logging events with duration and status.
    pub fn load_with(path: impl AsRef<Path>, options: RepositoryOptions) -> RepoResult<Self> {
        let path = path.as_ref().to_path_buf();
        let started_at = Instant::now();
        info!("event=repo_load module=repo status=start path={}", path.display());

        match load_state(&path, &options) {
            Ok(state) => {
                info!(
                    "event=repo_load module=repo status=ok entries={} last_modified={} duration_ms={}",
                    state.entries.len(),
                    state.last_modified.to_rfc3339(),
                    started_at.elapsed().as_millis()
                );
                Ok(Self {
                    path,
                    state: RwLock::new(Some(state)),
                    flushes: AtomicU64::new(0),
                })
            }
            Err(err) => {
                error!(
                    "event=repo_load module=repo status=error duration_ms={} error_code={} error={}",
                    started_at.elapsed().as_millis(),
                    error_code(&err),
                    err
                );
                Err(err)
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of successful writes to the backing file.
    pub fn flush_count(&self) -> u64 {
        self.flushes.load(Ordering::SeqCst)
    }

    /// New clean entry that is not stored until it is saved.
    pub fn create_item(&self) -> RepoResult<LexEntry> {
        self.read(|_| Ok(LexEntry::new()))
    }

    pub fn count(&self) -> RepoResult<usize> {
        self.read(|state| Ok(state.entries.len()))
    }

    /// Entries matching `predicate`, in document order.
    pub fn find(&self, predicate: impl Fn(&LexEntry) -> bool) -> RepoResult<Vec<LexEntry>> {
        self.read(|state| {
            Ok(state
                .entries
                .values()
                .filter(|entry| predicate(*entry))
                .cloned()
                .collect())
        })
    }

    /// Releases the in-memory document. Safe to call more than once.
    pub fn dispose(&self) {
        if self.state.write().take().is_some() {
            info!(
                "event=repo_dispose module=repo status=ok path={}",
                self.path.display()
            );
        }
    }

    fn read<T>(&self, op: impl FnOnce(&RepoState) -> RepoResult<T>) -> RepoResult<T> {
        let guard = self.state.read();
        let state = guard.as_ref().ok_or(RepoError::Disposed)?;
        op(state)
    }

    fn save_batch(&self, op: &'static str, entries: &mut [LexEntry]) -> RepoResult<()> {
        if entries.is_empty() {
            debug!("event=repo_save module=repo status=skipped op={op} entries=0");
            return Ok(());
        }

        let started_at = Instant::now();
        let mut guard = self.state.write();
        let state = guard.as_mut().ok_or(RepoError::Disposed)?;

        match self.apply_batch(state, entries) {
            Ok(()) => {
                info!(
                    "event=repo_save module=repo status=ok op={} entries={} last_modified={} duration_ms={}",
                    op,
                    entries.len(),
                    state.last_modified.to_rfc3339(),
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=repo_save module=repo status=error op={} entries={} duration_ms={} error_code={} error={}",
                    op,
                    entries.len(),
                    started_at.elapsed().as_millis(),
                    error_code(&err),
                    err
                );
                Err(err)
            }
        }
    }

    fn apply_batch(&self, state: &mut RepoState, entries: &mut [LexEntry]) -> RepoResult<()> {
        let mut document = state.document.clone();
        let mut nodes = state.nodes.clone();
        let mut staged = Vec::with_capacity(entries.len());

        for entry in entries.iter() {
            let mut entry = entry.clone();
            let stored = staged
                .iter()
                .rev()
                .find(|saved: &&LexEntry| saved.id() == entry.id())
                .or_else(|| state.entries.get(entry.id()));
            if let Some(stored) = stored {
                if stored.guid() != entry.guid() {
                    return Err(RepoError::Conflict {
                        entry: entry.id().to_string(),
                        message: format!(
                            "guid `{}` does not match stored guid `{}`",
                            entry.guid(),
                            stored.guid()
                        ),
                    });
                }
                entry.align_with_stored(stored);
            }
            let written = write_entry(&mut document, state.lift, &entry, nodes.get(entry.id()))?;
            nodes.insert(entry.id().to_string(), written);
            entry.mark_clean();
            staged.push(entry);
        }

        self.flush(&document, state.bom)?;

        state.document = document;
        state.nodes = nodes;
        for (saved, caller) in staged.into_iter().zip(entries.iter_mut()) {
            state.entries.insert(saved.id().to_string(), saved.clone());
            *caller = saved;
        }
        state.last_modified = latest_modified(state.entries.values());
        Ok(())
    }

    fn remove(&self, state: &mut RepoState, id: &str) -> RepoResult<()> {
        let node = state
            .nodes
            .get(id)
            .map(|known| known.entry)
            .ok_or_else(|| RepoError::NotFound(id.to_string()))?;

        let mut document = state.document.clone();
        if let Some(indent) = leading_whitespace(&document, state.lift, node) {
            document.detach(indent);
        }
        document.detach(node);
        self.flush(&document, state.bom)?;

        state.document = document;
        state.nodes.remove(id);
        state.entries.shift_remove(id);
        state.last_modified = latest_modified(state.entries.values());
        Ok(())
    }

    fn flush(&self, document: &XmlDocument, bom: bool) -> io::Result<()> {
        let started_at = Instant::now();
        let mut contents = String::new();
        if bom {
            contents.push(BOM);
        }
        contents.push_str(&document.to_xml_string());
        match write_atomic(&self.path, contents.as_bytes()) {
            Ok(()) => {
                self.flushes.fetch_add(1, Ordering::SeqCst);
                debug!(
                    "event=repo_flush module=repo status=ok bytes={} duration_ms={}",
                    contents.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=repo_flush module=repo status=error path={} duration_ms={} error={}",
                    self.path.display(),
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }
}

impl EntryRepository for LiftEntryRepository {
    fn get(&self, id: &str) -> RepoResult<LexEntry> {
        self.read(|state| {
            state
                .entries
                .get(id)
                .cloned()
                .ok_or_else(|| RepoError::NotFound(id.to_string()))
        })
    }

    fn get_all(&self) -> RepoResult<Vec<LexEntry>> {
        self.read(|state| Ok(state.entries.values().cloned().collect()))
    }

    fn save_item(&self, entry: &mut LexEntry) -> RepoResult<()> {
        self.save_batch("save_item", std::slice::from_mut(entry))
    }

    fn save_items(&self, entries: &mut [LexEntry]) -> RepoResult<()> {
        self.save_batch("save_items", entries)
    }

    fn delete(&self, id: &str) -> RepoResult<()> {
        let started_at = Instant::now();
        let mut guard = self.state.write();
        let state = guard.as_mut().ok_or(RepoError::Disposed)?;

        match self.remove(state, id) {
            Ok(()) => {
                info!(
                    "event=repo_delete module=repo status=ok entry_id={} duration_ms={}",
                    id,
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=repo_delete module=repo status=error entry_id={} duration_ms={} error_code={} error={}",
                    id,
                    started_at.elapsed().as_millis(),
                    error_code(&err),
                    err
                );
                Err(err)
            }
        }
    }

    fn last_modified(&self) -> RepoResult<DateTime<Utc>> {
        self.read(|state| Ok(state.last_modified))
    }
}

fn load_state(path: &Path, options: &RepositoryOptions) -> RepoResult<RepoState> {
    let mut bom = false;
    let document = match std::fs::read(path) {
        Ok(bytes) => {
            let text = String::from_utf8(bytes)
                .map_err(|err| unreadable(path, format!("invalid utf-8: {err}")))?;
            let body = match text.strip_prefix(BOM) {
                Some(rest) => {
                    bom = true;
                    rest
                }
                None => text.as_str(),
            };
            XmlDocument::parse(body).map_err(|err| unreadable(path, err.to_string()))?
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound && options.create_if_missing => {
            info!(
                "event=repo_load module=repo status=creating path={}",
                path.display()
            );
            new_document(options)?
        }
        Err(err) => return Err(err.into()),
    };

    let lift = match document.document_element() {
        Some(node) if document.name(node) == Some(LIFT) => node,
        Some(node) => {
            return Err(unreadable(
                path,
                format!(
                    "root element is `{}`, expected `{LIFT}`",
                    document.name(node).unwrap_or_default()
                ),
            ))
        }
        None => return Err(unreadable(path, "document has no root element".to_string())),
    };

    let mut entries = IndexMap::new();
    let mut nodes = HashMap::new();
    for (position, node) in document.child_elements_named(lift, ENTRY).enumerate() {
        let (entry, entry_nodes) = read_entry(&document, node, position)?;
        if entries.contains_key(entry.id()) {
            return Err(RepoError::Corrupt {
                entry: entry.id().to_string(),
                message: "duplicate entry id".to_string(),
            });
        }
        nodes.insert(entry.id().to_string(), entry_nodes);
        entries.insert(entry.id().to_string(), entry);
    }

    Ok(RepoState {
        last_modified: latest_modified(entries.values()),
        document,
        lift,
        entries,
        nodes,
        bom,
    })
}

const BOM: char = '\u{feff}';

fn new_document(options: &RepositoryOptions) -> RepoResult<XmlDocument> {
    let mut document = XmlDocument::with_root_element(LIFT);
    if let Some(lift) = document.document_element() {
        set_attribute(&mut document, lift, "version", &options.lift_version, None)?;
        set_attribute(&mut document, lift, "producer", &options.producer, None)?;
    }
    Ok(document)
}

fn latest_modified<'a>(entries: impl Iterator<Item = &'a LexEntry>) -> DateTime<Utc> {
    entries
        .map(LexEntry::date_modified)
        .max()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Whitespace-only text node directly before `node`, if any.
fn leading_whitespace(document: &XmlDocument, parent: NodeId, node: NodeId) -> Option<NodeId> {
    let siblings = document.children(parent);
    let index = siblings.iter().position(|child| *child == node)?;
    let previous = *siblings.get(index.checked_sub(1)?)?;
    match document.kind(previous) {
        NodeKind::Text(text) if text.trim().is_empty() => Some(previous),
        _ => None,
    }
}

fn unreadable(path: &Path, message: String) -> RepoError {
    RepoError::Unreadable {
        path: path.to_path_buf(),
        message,
    }
}

fn error_code(err: &RepoError) -> &'static str {
    match err {
        RepoError::Unreadable { .. } => "unreadable",
        RepoError::Corrupt { .. } => "corrupt",
        RepoError::NotFound(_) => "not_found",
        RepoError::Conflict { .. } => "conflict",
        RepoError::Path(_) => "path",
        RepoError::Model(_) => "model",
        RepoError::Io(_) => "io",
        RepoError::Disposed => "disposed",
    }
}
