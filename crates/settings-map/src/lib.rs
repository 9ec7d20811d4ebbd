//! # settings-map
//!
//! A `String → String` map that mirrors itself into an XML settings file.
//!
//! Callers use [`PersistentMap`] like an ordinary associative container.
//! Every mutation (`set`, `add`, `remove`, `clear`) rewrites the whole file
//! before it returns, so the file on disk always matches what the map holds.
//!
//! # Layout
//!
//! - **`map`** – [`PersistentMap`]: the in-memory `HashMap` plus the rules for
//!   when and in which order the store is updated.
//! - **`store`** – the [`VariableStore`] trait the map talks to, and the
//!   XML implementation [`XmlVariableStore`] that owns a lossless
//!   [`Document`] tree.
//! - **`error`** – the error types returned by both.
//!
//! # File format
//!
//! ```xml
//! <Root>
//!   <Variables>
//!     <StringVariable name="Theme" value="Dark" />
//!   </Variables>
//! </Root>
//! ```
//!
//! Anything else in the document, including comments and processing
//! instructions around the root element, is kept byte for byte across saves.
//!
//! # Concurrency
//!
//! None.  One map instance per file, used from one thread at a time.  Changes
//! made to the file by another writer after it was opened are overwritten by
//! the next mutation.

pub mod error;
pub mod map;
pub mod store;

pub use error::{LoadError, SchemaError, SettingsError, WriteError};
pub use map::{Iter, PersistentMap};
pub use store::{Document, Entry, ParseError, StoreOptions, VariableStore, XmlVariableStore};
