//! The store abstraction shared by all four (scope, format) pairs

use crate::error::StoreError;
use async_trait::async_trait;
use modekit_model::{Diagnostic, ModeConfig, Slug, StoreId};
use std::fmt;
use std::path::{Path, PathBuf};

/// Result of listing and decoding one store
///
/// Enumeration never fails; unreadable files and invalid records become
/// diagnostics and the store contributes whatever survived.
#[derive(Debug, Clone)]
pub struct Enumeration {
    /// Store that produced the records
    pub store: StoreId,
    /// Valid records, each tagged with `store`
    pub modes: Vec<ModeConfig>,
    /// Everything that was dropped or could not be read
    pub diagnostics: Vec<Diagnostic>,
}

impl Enumeration {
    /// Empty enumeration for `store`
    #[inline]
    #[must_use]
    pub fn empty(store: StoreId) -> Self {
        Self {
            store,
            modes: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Record with `slug`, if present
    #[must_use]
    pub fn find(&self, slug: &Slug) -> Option<&ModeConfig> {
        self.modes.iter().find(|m| &m.slug == slug)
    }

    /// Attach the store id to every diagnostic
    #[must_use]
    pub(crate) fn tagged(mut self) -> Self {
        let store = self.store;
        self.diagnostics = self
            .diagnostics
            .into_iter()
            .map(|d| d.in_store(store))
            .collect();
        self
    }
}

/// A filesystem location a watcher should observe for one store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WatchTarget {
    /// Directory or file to observe
    pub path: PathBuf,
    /// Whether nested directories matter
    pub recursive: bool,
}

/// What a changed path means to the store that owns it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathClaim {
    /// A single record file; carries the slug derived from the file name
    Record(String),
    /// The aggregate file holding every record of the store
    Aggregate,
    /// The store's root directory itself
    Root,
}

/// One (scope, format) store
///
/// Mutating operations assume the caller serializes them; the registry
/// routes every write through its write queue.
#[async_trait]
pub trait ModeStore: Send + Sync + fmt::Debug {
    /// Which (scope, format) pair this store serves
    fn id(&self) -> StoreId;

    /// List, read and decode every record
    async fn enumerate(&self) -> Enumeration;

    /// Read a single record
    async fn read_one(&self, slug: &Slug) -> Option<ModeConfig> {
        self.enumerate()
            .await
            .modes
            .into_iter()
            .find(|m| &m.slug == slug)
    }

    /// Persist `mode`, returning the file written
    ///
    /// # Errors
    /// Fails when the record belongs to another store, when the target
    /// cannot be accessed, or when an existing aggregate file is malformed.
    async fn write(&self, mode: &ModeConfig) -> Result<PathBuf, StoreError>;

    /// Remove the record for `slug`; returns whether anything was removed
    ///
    /// # Errors
    /// Fails on access errors or a malformed aggregate file. A missing
    /// record is not an error.
    async fn delete(&self, slug: &Slug) -> Result<bool, StoreError>;

    /// Remove every record; returns how many were removed
    ///
    /// # Errors
    /// Fails on access errors or a malformed aggregate file.
    async fn clear(&self) -> Result<usize, StoreError>;

    /// File a write of `slug` would touch
    async fn location_for(&self, slug: &Slug) -> PathBuf;

    /// Locations to observe for external changes
    fn watch_targets(&self) -> Vec<WatchTarget>;

    /// Whether `path` belongs to this store, and how
    fn claims_path(&self, path: &Path) -> Option<PathClaim>;
}

/// Reject records whose provenance names a different store
pub(crate) fn ensure_owner(store: StoreId, mode: &ModeConfig) -> Result<(), StoreError> {
    let owner = mode.store_id();
    if owner == store {
        Ok(())
    } else {
        Err(StoreError::WrongStore {
            store,
            owner,
            slug: mode.slug.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modekit_model::{DiagnosticKind, ModeFormat, ModeScope};

    #[test]
    fn ensure_owner_rejects_foreign_record() {
        let store = StoreId::new(ModeScope::Global, ModeFormat::Legacy);
        let mode = ModeConfig::new(Slug::new("a").unwrap(), "A", "r");
        let err = ensure_owner(store, &mode).unwrap_err();
        assert!(matches!(err, StoreError::WrongStore { .. }));
        assert_eq!(err.store(), store);

        let mode = mode.with_origin(ModeScope::Global, ModeFormat::Legacy);
        assert!(ensure_owner(store, &mode).is_ok());
    }

    #[test]
    fn tagged_sets_store_on_diagnostics() {
        let store = StoreId::new(ModeScope::Project, ModeFormat::Split);
        let mut listing = Enumeration::empty(store);
        listing
            .diagnostics
            .push(Diagnostic::warning(DiagnosticKind::Shape, "bad"));
        let listing = listing.tagged();
        assert_eq!(listing.diagnostics[0].store, Some(store));
    }
}
