//! The persistent string map.
//!
//! [`PersistentMap`] is an in-memory `HashMap<String, String>` paired with a
//! [`VariableStore`].  Reads are answered from the `HashMap` alone.  Every
//! mutation is applied to the `HashMap`, then to the store's document tree,
//! and finally flushed: the whole document is rewritten to disk before the
//! call returns.
//!
//! # Failure semantics
//!
//! Validation failures ([`SettingsError::DuplicateKey`],
//! [`SettingsError::Diverged`]) are detected before anything changes.  A
//! flush failure ([`SettingsError::Write`]) is reported *after* both layers
//! have been updated: memory and document still agree with each other, only
//! the file on disk is stale.  The next successful flush brings it up to date.
//!
//! # Batching
//!
//! [`PersistentMap::batch`] runs several mutations with a single flush at the
//! end, for hosts that apply many changes at once.

use std::collections::{hash_map, HashMap};
use std::path::Path;

use tracing::debug;

use crate::error::{SchemaError, SettingsError};
use crate::store::{Entry, StoreOptions, VariableStore, XmlVariableStore};

/// A string-to-string map whose every change is written to a backing store.
///
/// # Examples
///
/// ```rust,no_run
/// use settings_map::PersistentMap;
///
/// let mut settings = PersistentMap::open("settings.xml")?;
/// settings.set("Theme", "Light")?;
/// assert_eq!(settings.get("Theme")?, "Light");
/// # Ok::<(), settings_map::SettingsError>(())
/// ```
#[derive(Debug)]
pub struct PersistentMap<S: VariableStore = XmlVariableStore> {
    entries: HashMap<String, String>,
    store: S,
    /// Set while inside [`PersistentMap::batch`]; flushes are postponed.
    deferred: bool,
    /// A flush was postponed and is still owed.
    dirty: bool,
}

impl PersistentMap<XmlVariableStore> {
    /// Loads the settings file at `path`.
    ///
    /// # Errors
    ///
    /// [`SettingsError::Load`] if the file is missing or not XML, and
    /// [`SettingsError::Schema`] if the document shape is wrong or two
    /// variables share a name.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        Self::with_store(XmlVariableStore::open(path)?)
    }

    /// Like [`PersistentMap::open`], with explicit output formatting.
    pub fn open_with_options(
        path: impl AsRef<Path>,
        options: StoreOptions,
    ) -> Result<Self, SettingsError> {
        Self::with_store(XmlVariableStore::open_with_options(path, options)?)
    }

    /// Creates a new, empty settings file and opens it.
    ///
    /// # Errors
    ///
    /// See [`XmlVariableStore::create`].
    pub fn create(
        path: impl AsRef<Path>,
        root_name: &str,
        options: StoreOptions,
    ) -> Result<Self, SettingsError> {
        Self::with_store(XmlVariableStore::create(path, root_name, options)?)
    }
}

impl<S: VariableStore> PersistentMap<S> {
    /// Builds the map from the entries currently held by `store`.
    ///
    /// # Errors
    ///
    /// Propagates the store's [`SchemaError`], and returns
    /// [`SchemaError::DuplicateName`] if a name occurs twice.
    pub fn with_store(store: S) -> Result<Self, SettingsError> {
        let loaded = store.load()?;

        let mut entries = HashMap::with_capacity(loaded.len());
        for Entry { name, value } in loaded {
            match entries.entry(name) {
                hash_map::Entry::Occupied(slot) => {
                    return Err(SchemaError::DuplicateName(slot.key().clone()).into());
                }
                hash_map::Entry::Vacant(slot) => {
                    slot.insert(value);
                }
            }
        }

        debug!(count = entries.len(), "settings map loaded");
        Ok(Self {
            entries,
            store,
            deferred: false,
            dirty: false,
        })
    }

    // ── Reads ─────────────────────────────────────────────────────────────────

    /// Returns the value for `key`.
    ///
    /// # Errors
    ///
    /// [`SettingsError::KeyNotFound`] if the key is absent.
    pub fn get(&self, key: &str) -> Result<&str, SettingsError> {
        self.try_get(key)
            .ok_or_else(|| SettingsError::KeyNotFound(key.to_string()))
    }

    /// Returns the value for `key`, or `None` if it is absent.
    pub fn try_get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns `true` if `key` is present *and* currently maps to `value`.
    pub fn contains(&self, key: &str, value: &str) -> bool {
        self.try_get(key) == Some(value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(key, value)` pairs in arbitrary order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            inner: self.entries.iter(),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.keys().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.values().map(String::as_str)
    }

    /// Read-only view of the in-memory entries.
    pub fn as_map(&self) -> &HashMap<String, String> {
        &self.entries
    }

    /// The backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    // ── Mutations ─────────────────────────────────────────────────────────────

    /// Inserts or updates `key`, then flushes.  Returns the previous value.
    ///
    /// # Errors
    ///
    /// [`SettingsError::Write`] if the flush fails; the new value is already
    /// visible in the map at that point.
    pub fn set(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Option<String>, SettingsError> {
        let key = key.into();
        let value = value.into();

        self.store.upsert(&key, &value);
        let previous = self.entries.insert(key, value);
        self.flush()?;
        Ok(previous)
    }

    /// Inserts `key` only if it is not already present, then flushes.
    ///
    /// # Errors
    ///
    /// [`SettingsError::DuplicateKey`] if the key exists (nothing is changed
    /// or written), or [`SettingsError::Write`] if the flush fails.
    pub fn add(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), SettingsError> {
        let key = key.into();
        if self.entries.contains_key(&key) {
            return Err(SettingsError::DuplicateKey(key));
        }
        self.set(key, value).map(|_| ())
    }

    /// Removes `key` and flushes.  Returns the removed value.
    ///
    /// Removing an absent key returns `Ok(None)` and writes nothing.
    ///
    /// # Errors
    ///
    /// [`SettingsError::Diverged`] if the key is in memory but has no node in
    /// the document (nothing is changed), or [`SettingsError::Write`] if the
    /// flush fails.
    pub fn remove(&mut self, key: &str) -> Result<Option<String>, SettingsError> {
        if !self.store.remove(key) {
            if self.entries.contains_key(key) {
                return Err(SettingsError::Diverged(key.to_string()));
            }
            return Ok(None);
        }

        let previous = self.entries.remove(key);
        self.flush()?;
        Ok(previous)
    }

    /// Removes `key` only if it currently maps to `value`.
    ///
    /// Returns `Ok(false)` without touching the store when the pair does not
    /// match exactly.
    ///
    /// # Errors
    ///
    /// Same as [`PersistentMap::remove`].
    pub fn remove_entry(&mut self, key: &str, value: &str) -> Result<bool, SettingsError> {
        if !self.contains(key, value) {
            return Ok(false);
        }
        self.remove(key).map(|previous| previous.is_some())
    }

    /// Removes every entry and flushes once.
    ///
    /// # Errors
    ///
    /// [`SettingsError::Write`] if the flush fails; the map is already empty
    /// at that point.
    pub fn clear(&mut self) -> Result<(), SettingsError> {
        self.store.clear();
        self.entries.clear();
        self.flush()
    }

    /// Runs `f` with flushing postponed, then flushes at most once.
    ///
    /// The final flush happens whether or not `f` succeeds, so the file
    /// always reflects every mutation that was applied.  If `f` fails its
    /// error is returned in preference to a flush error.  A `batch` inside a
    /// `batch` joins the outer one.
    ///
    /// ```rust,no_run
    /// # use settings_map::PersistentMap;
    /// let mut settings = PersistentMap::open("settings.xml")?;
    /// settings.batch(|s| {
    ///     s.set("Theme", "Light")?;
    ///     s.set("Font", "Mono")?;
    ///     s.remove("Legacy")?;
    ///     Ok(())
    /// })?;
    /// # Ok::<(), settings_map::SettingsError>(())
    /// ```
    pub fn batch<T, F>(&mut self, f: F) -> Result<T, SettingsError>
    where
        F: FnOnce(&mut Self) -> Result<T, SettingsError>,
    {
        if self.deferred {
            return f(self);
        }

        self.deferred = true;
        let outcome = f(self);
        self.deferred = false;

        let flushed = if std::mem::take(&mut self.dirty) {
            self.store.save().map_err(SettingsError::from)
        } else {
            Ok(())
        };

        let value = outcome?;
        flushed?;
        Ok(value)
    }

    fn flush(&mut self) -> Result<(), SettingsError> {
        if self.deferred {
            self.dirty = true;
            return Ok(());
        }
        self.store.save()?;
        Ok(())
    }
}

/// Iterator over the entries of a [`PersistentMap`].
#[derive(Debug, Clone)]
pub struct Iter<'a> {
    inner: hash_map::Iter<'a, String, String>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a str, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl<'a, S: VariableStore> IntoIterator for &'a PersistentMap<S> {
    type Item = (&'a str, &'a str);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
