//! Error taxonomy for the persistent settings map.
//!
//! Errors are split by the layer that produces them:
//!
//! - [`LoadError`] – the file could not be read or parsed at construction.
//! - [`SchemaError`] – the document parsed, but does not have the expected
//!   `Variables` / `StringVariable` shape.
//! - [`WriteError`] – a flush to disk failed.
//!
//! [`SettingsError`] wraps all three and adds the map-level failures
//! (missing key, duplicate key, divergence between memory and document).
//! It is the only error type returned by [`crate::PersistentMap`].

use std::path::PathBuf;

use thiserror::Error;

/// Failure to obtain a document from the file system.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The file does not exist or could not be read.
    #[error("I/O error reading settings at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not well-formed XML.
    #[error("settings at {path} are not well-formed XML: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: crate::store::ParseError,
    },

    /// A new settings file was requested with a root name that is not an XML name.
    #[error("`{name}` is not a valid XML element name")]
    InvalidName { name: String },

    /// A new settings file was requested at a path that already exists.
    #[error("refusing to create settings at {path}: file already exists")]
    AlreadyExists { path: PathBuf },
}

/// The document does not match the `Variables` / `StringVariable` schema.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// No `Variables` element exists below the root.
    #[error("document has no `Variables` element")]
    MissingVariables,

    /// More than one `Variables` element exists, so the insertion point is ambiguous.
    #[error("document has {0} `Variables` elements, expected exactly one")]
    MultipleVariables(usize),

    /// A `StringVariable` element lacks a required attribute.
    ///
    /// `index` is the 0-based position of the element in document order.
    #[error("`StringVariable` #{index} is missing the `{attribute}` attribute")]
    MissingAttribute {
        index: usize,
        attribute: &'static str,
    },

    /// A `StringVariable` element contains child elements.
    ///
    /// Detaching it would take any nested variable node with it.
    #[error("`StringVariable` #{index} contains child elements")]
    NestedElement { index: usize },

    /// Two `StringVariable` elements carry the same `name`.
    #[error("duplicate variable name `{0}`")]
    DuplicateName(String),
}

/// Failure while flushing the document to disk.
#[derive(Debug, Error)]
pub enum WriteError {
    /// The serialized document could not be written to the file.
    #[error("I/O error writing settings at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Error returned by every [`crate::PersistentMap`] operation.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("invalid settings document: {0}")]
    Schema(#[from] SchemaError),

    /// The failing accessor was asked for a key that is not present.
    #[error("no variable named `{0}`")]
    KeyNotFound(String),

    /// A strict insert was attempted on a key that already exists.
    #[error("variable `{0}` already exists")]
    DuplicateKey(String),

    /// The mutation was applied in memory and in the document tree, but the
    /// flush to disk failed.
    #[error("change applied but not persisted: {0}")]
    Write(#[from] WriteError),

    /// The key exists in memory but no document node carries it.
    #[error("variable `{0}` is present in memory but missing from the document")]
    Diverged(String),
}

impl SettingsError {
    /// Returns `true` when the operation mutated state but could not save it.
    ///
    /// For every other variant the operation left the map untouched.
    pub fn is_persistence_failure(&self) -> bool {
        matches!(self, SettingsError::Write(_))
    }
}
