//! Ordered-tree editing over XML documents.
//!
//! # Responsibility
//! - Parse XML into a node arena that keeps every node (whitespace, comments,
//!   declaration) so untouched regions re-serialize unchanged.
//! - Provide path-based find-or-create, attribute upsert and removal, with an
//!   optional sibling order that decides where new nodes land.
//!
//! # Invariants
//! - Edits only touch the subtree of the node passed in.
//! - `NodeId`s are never reused; removal detaches a node from its parent.
//! - Missing intermediate path segments fail with `PathNotFound`; they are
//!   never created implicitly.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod document;
mod editor;
mod order;
mod path;

pub use document::{Attribute, Element, NodeId, NodeKind, XmlDocument};
pub use editor::{
    boolean_attribute, find_or_create_child, insert_using_order, optional_attribute,
    remove_node, set_attribute,
};
pub use order::{NameOrder, Sibling, SiblingOrder};
pub use path::{quote_literal, NodeTest, Predicate, Step, XmlPath};

pub type XmlResult<T> = Result<T, XmlError>;

/// Errors raised by parsing and tree editing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlError {
    /// Input is not a well-formed document.
    Malformed(String),
    /// Path expression could not be parsed.
    InvalidPath { path: String, reason: String },
    /// Path parsed but selects nothing.
    PathNotFound(String),
    /// Operation needs an element node.
    NotAnElement(NodeId),
}

impl Display for XmlError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(message) => write!(f, "malformed xml: {message}"),
            Self::InvalidPath { path, reason } => write!(f, "invalid path `{path}`: {reason}"),
            Self::PathNotFound(path) => write!(f, "the path `{path}` could not be found"),
            Self::NotAnElement(id) => write!(f, "node {} is not an element", id.index()),
        }
    }
}

impl Error for XmlError {}
