//! Precedence merge across the stores
//!
//! Highest to lowest: project+split, project+legacy, global+split,
//! global+legacy. A slug is served wholesale by the highest store holding
//! it; lower copies are discarded without field-level merging.

use futures::future::join_all;
use indexmap::map::Entry;
use indexmap::IndexMap;
use modekit_model::{Diagnostic, ModeConfig, Slug, StoreId};
use modekit_store::{Enumeration, StoreSet};
use tracing::{debug, trace};

/// The resolved set of records plus everything dropped while loading
#[derive(Debug, Clone, Default)]
pub struct MergedView {
    modes: IndexMap<Slug, ModeConfig>,
    diagnostics: Vec<Diagnostic>,
}

impl MergedView {
    /// Winning records; project records come first, then global ones
    pub fn modes(&self) -> impl Iterator<Item = &ModeConfig> {
        self.modes.values()
    }

    /// Owned copy of the winning records
    #[must_use]
    pub fn to_vec(&self) -> Vec<ModeConfig> {
        self.modes.values().cloned().collect()
    }

    /// Winning record for `slug`
    #[inline]
    #[must_use]
    pub fn get(&self, slug: &Slug) -> Option<&ModeConfig> {
        self.modes.get(slug)
    }

    /// Store serving `slug`
    #[must_use]
    pub fn source_of(&self, slug: &Slug) -> Option<StoreId> {
        self.modes.get(slug).map(ModeConfig::store_id)
    }

    /// Loading problems from every store
    #[inline]
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Number of records
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.modes.len()
    }

    /// Whether no record resolved
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }
}

/// Fold store enumerations into one view
///
/// Input order does not matter; enumerations are ranked by their store id.
#[must_use]
pub fn merge(mut listings: Vec<Enumeration>) -> MergedView {
    listings.sort_by_key(|l| l.store.precedence_rank());

    let mut view = MergedView::default();
    for listing in listings {
        view.diagnostics.extend(listing.diagnostics);
        for mode in listing.modes {
            match view.modes.entry(mode.slug.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(mode);
                }
                Entry::Occupied(winner) => {
                    trace!(
                        slug = %mode.slug,
                        winner = %winner.get().store_id(),
                        shadowed = %listing.store,
                        "mode shadowed by higher-precedence store"
                    );
                }
            }
        }
    }
    view
}

/// Builds merged views from the configured stores
#[derive(Debug, Clone)]
pub struct MergeResolver {
    stores: StoreSet,
}

impl MergeResolver {
    /// Create resolver over `stores`
    #[inline]
    #[must_use]
    pub fn new(stores: StoreSet) -> Self {
        Self { stores }
    }

    /// Stores consulted
    #[inline]
    #[must_use]
    pub fn stores(&self) -> &StoreSet {
        &self.stores
    }

    /// Enumerate every store and merge by precedence
    ///
    /// Never fails; unreadable stores contribute diagnostics only.
    pub async fn resolve(&self) -> MergedView {
        let listings = join_all(self.stores.iter().map(|store| store.enumerate())).await;
        let view = merge(listings);
        debug!(
            modes = view.len(),
            diagnostics = view.diagnostics().len(),
            "resolved merged view"
        );
        view
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modekit_model::{DiagnosticKind, ModeFormat, ModeScope};
    use pretty_assertions::assert_eq;

    fn listing(store: StoreId, modes: &[(&str, &str)]) -> Enumeration {
        let mut listing = Enumeration::empty(store);
        listing.modes = modes
            .iter()
            .map(|(slug, name)| {
                ModeConfig::new(Slug::new(*slug).unwrap(), *name, "r")
                    .with_origin(store.scope, store.format)
            })
            .collect();
        listing
    }

    const PS: StoreId = StoreId::new(ModeScope::Project, ModeFormat::Split);
    const PL: StoreId = StoreId::new(ModeScope::Project, ModeFormat::Legacy);
    const GS: StoreId = StoreId::new(ModeScope::Global, ModeFormat::Split);
    const GL: StoreId = StoreId::new(ModeScope::Global, ModeFormat::Legacy);

    #[test]
    fn higher_precedence_wins_wholesale() {
        let view = merge(vec![
            listing(GL, &[("architect", "Global Legacy"), ("ask", "Ask")]),
            listing(PL, &[("architect", "Architect")]),
            listing(PS, &[("architect", "Architect2")]),
            listing(GS, &[("ask", "Ask Split")]),
        ]);
        let slug = Slug::new("architect").unwrap();
        assert_eq!(view.get(&slug).unwrap().name, "Architect2");
        assert_eq!(view.source_of(&slug), Some(PS));
        assert_eq!(view.get(&Slug::new("ask").unwrap()).unwrap().name, "Ask Split");
        assert_eq!(view.len(), 2);
    }

    #[test]
    fn slug_appears_once_and_project_first() {
        let view = merge(vec![
            listing(GL, &[("g", "G"), ("shared", "Global")]),
            listing(PS, &[("p", "P"), ("shared", "Project")]),
        ]);
        let slugs: Vec<_> = view.modes().map(|m| m.slug.as_str()).collect();
        assert_eq!(slugs, vec!["p", "shared", "g"]);
    }

    #[test]
    fn diagnostics_from_every_store_are_kept() {
        let mut broken = Enumeration::empty(PL);
        broken
            .diagnostics
            .push(Diagnostic::warning(DiagnosticKind::Shape, "bad"));
        let view = merge(vec![broken, listing(GS, &[("a", "A")])]);
        assert_eq!(view.diagnostics().len(), 1);
        assert_eq!(view.len(), 1);
    }

    #[test]
    fn empty_input_is_empty_view() {
        assert!(merge(Vec::new()).is_empty());
    }
}
