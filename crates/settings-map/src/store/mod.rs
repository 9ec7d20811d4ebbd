//! Persistence adapters for the settings map.
//!
//! The map never touches the file system directly.  Every mutation is
//! forwarded to a [`VariableStore`], which owns the document tree and knows
//! how to flush it.  Keeping storage behind this trait lets the map be tested
//! without a real file and keeps the XML details in one place.
//!
//! # Call order
//!
//! For each mutating map operation the store sees exactly one tree mutation
//! (`upsert`, `remove` or `clear`) followed by at most one `save`.  Tree
//! mutations are infallible; only `save` performs I/O.

use serde::{Deserialize, Serialize};

use crate::error::{SchemaError, WriteError};

pub mod document;
pub mod xml;

pub use document::{Document, ParseError};
pub use xml::XmlVariableStore;

/// One name/value pair as stored in the document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Entry {
    pub name: String,
    pub value: String,
}

impl Entry {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Capability interface between the map and its backing document.
#[cfg_attr(test, mockall::automock)]
pub trait VariableStore {
    /// Returns every variable node currently in the document, in document order.
    ///
    /// Duplicate names are returned as-is; rejecting them is the map's job.
    fn load(&self) -> Result<Vec<Entry>, SchemaError>;

    /// Sets the value of the node called `name`, appending a new node if none exists.
    fn upsert(&mut self, name: &str, value: &str);

    /// Detaches the node called `name`.  Returns `false` if there was none.
    fn remove(&mut self, name: &str) -> bool;

    /// Detaches every variable node and returns how many were removed.
    fn clear(&mut self) -> usize;

    /// Serializes the whole document over the backing file.
    fn save(&self) -> Result<(), WriteError>;
}

/// Formatting for the parts of a file the store writes itself.
///
/// Existing content is never reformatted.  These options only shape new
/// variable nodes, a newly created file, and a missing XML declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreOptions {
    /// Put new variable nodes on their own line.  They copy the indentation
    /// of sibling nodes; a document without any indentation stays compact.
    #[serde(default = "default_true")]
    pub indent: bool,
    /// One level of indentation, used where no sibling shows the layout.
    #[serde(default = "default_indent_string")]
    pub indent_string: String,
    /// Add `<?xml version="1.0" encoding="UTF-8"?>` to a document that has no
    /// declaration.  An existing declaration is always kept.
    #[serde(default = "default_true")]
    pub write_declaration: bool,
}

fn default_true() -> bool {
    true
}

fn default_indent_string() -> String {
    "  ".to_string()
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            indent: default_true(),
            indent_string: default_indent_string(),
            write_declaration: default_true(),
        }
    }
}
