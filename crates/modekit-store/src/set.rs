//! The four stores, ordered by precedence

use crate::layout::StoreLayout;
use crate::legacy::LegacyFileStore;
use crate::split::SplitDirStore;
use crate::store::{ModeStore, PathClaim, WatchTarget};
use modekit_codec::SplitCodec;
use modekit_model::{ModeScope, StoreId};
use std::path::Path;
use std::sync::Arc;

/// Shared handle to a store
pub type SharedStore = Arc<dyn ModeStore>;

/// Stores addressed by (scope, format), iterated highest precedence first
#[derive(Debug, Clone, Default)]
pub struct StoreSet {
    stores: Vec<SharedStore>,
}

impl StoreSet {
    /// Build from arbitrary stores
    ///
    /// A later store with an id already present replaces the earlier one.
    #[must_use]
    pub fn new(stores: impl IntoIterator<Item = SharedStore>) -> Self {
        let mut set = Self::default();
        for store in stores {
            set.insert(store);
        }
        set
    }

    /// Filesystem stores for `layout`
    ///
    /// Project stores are omitted when the layout has no project root.
    #[must_use]
    pub fn from_layout(layout: &StoreLayout, codec: &SplitCodec, recursive_split: bool) -> Self {
        let mut stores: Vec<SharedStore> = Vec::with_capacity(4);
        for scope in [ModeScope::Project, ModeScope::Global] {
            if let (Some(root), Some(dir)) = (layout.root(scope), layout.split_dir(scope)) {
                stores.push(Arc::new(
                    SplitDirStore::new(scope, dir)
                        .with_codec(codec.clone())
                        .with_recursive(recursive_split)
                        .with_boundary(root),
                ));
            }
            if let Some(file) = layout.legacy_file(scope) {
                stores.push(Arc::new(LegacyFileStore::new(scope, file)));
            }
        }
        Self::new(stores)
    }

    /// Add or replace a store
    pub fn insert(&mut self, store: SharedStore) {
        let id = store.id();
        self.stores.retain(|s| s.id() != id);
        self.stores.push(store);
        self.stores.sort_by_key(|s| s.id().precedence_rank());
    }

    /// Store for `id`
    #[must_use]
    pub fn get(&self, id: StoreId) -> Option<&SharedStore> {
        self.stores.iter().find(|s| s.id() == id)
    }

    /// Stores in precedence order
    pub fn iter(&self) -> impl Iterator<Item = &SharedStore> {
        self.stores.iter()
    }

    /// Stores serving `scope`, split first
    pub fn in_scope(&self, scope: ModeScope) -> impl Iterator<Item = &SharedStore> {
        self.stores.iter().filter(move |s| s.id().scope == scope)
    }

    /// Configured store ids, in precedence order
    #[must_use]
    pub fn ids(&self) -> Vec<StoreId> {
        self.stores.iter().map(|s| s.id()).collect()
    }

    /// Number of stores
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.stores.len()
    }

    /// Whether no store is configured
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    /// Every store that claims `path`
    #[must_use]
    pub fn claim(&self, path: &Path) -> Vec<(StoreId, PathClaim)> {
        self.stores
            .iter()
            .filter_map(|s| s.claims_path(path).map(|claim| (s.id(), claim)))
            .collect()
    }

    /// Union of all watch targets, without duplicates
    #[must_use]
    pub fn watch_targets(&self) -> Vec<WatchTarget> {
        let mut targets: Vec<WatchTarget> = Vec::new();
        for target in self.stores.iter().flat_map(|s| s.watch_targets()) {
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
        targets
    }
}
