//! The mode registry: one entry point over stores, cache, writes and watching

use crate::bridge::ChangeBridge;
use crate::cache::ViewCache;
use crate::config::RegistryConfig;
use crate::error::{RegistryError, Result};
use crate::events::{Notifier, RefreshCallback, RefreshCause, RegistryEvent};
use crate::locks::SuppressionLocks;
use crate::migration::{LegacyMigration, MigrationReport};
use crate::resolver::{MergeResolver, MergedView};
use crate::serializer::{WriteOutcome, WriteSerializer};
use crate::watcher::FsWatcher;
use modekit_codec::{
    CodecError, Decoded, LegacyCodec, ModeCodec, SourceFile, SplitCodec, LEGACY_KEY,
};
use modekit_model::{Diagnostic, ModeConfig, ModeFormat, ModeScope, Slug, StoreId};
use modekit_store::{SharedStore, StoreLayout, StoreSet};
use parking_lot::Mutex;
use serde_yaml::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Records accepted and rejected by an import
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    /// Records written
    pub imported: Vec<Slug>,
    /// Records dropped while decoding
    pub skipped: Vec<Diagnostic>,
}

/// Running watch; stops when dropped
#[derive(Debug)]
pub struct WatchHandle {
    watcher: FsWatcher,
    bridge: JoinHandle<()>,
}

impl WatchHandle {
    /// Underlying filesystem watcher
    #[inline]
    #[must_use]
    pub fn watcher(&self) -> &FsWatcher {
        &self.watcher
    }

    /// Stop watching
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.bridge.abort();
    }
}

struct RegistryInner {
    config: RegistryConfig,
    layout: StoreLayout,
    stores: StoreSet,
    cache: Arc<ViewCache>,
    locks: Arc<SuppressionLocks>,
    notifier: Arc<Notifier>,
    writes: WriteSerializer,
    migration_attempted: Mutex<HashSet<ModeScope>>,
}

/// Resolves, caches and persists mode records across the four stores
///
/// Cloning is cheap; clones share the cache, the write queue and the
/// suppression locks.
///
/// # Example
///
/// ```rust,ignore
/// let registry = ModeRegistry::new(RegistryConfig::new(global).with_project_root(repo));
/// registry.migrate_legacy_if_needed(ModeScope::Project).await;
/// for mode in registry.get_all().await {
///     println!("{} ({})", mode.slug, mode.store_id());
/// }
/// ```
#[derive(Clone)]
pub struct ModeRegistry {
    inner: Arc<RegistryInner>,
}

impl ModeRegistry {
    /// Create registry over the filesystem stores described by `config`
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        let stores = StoreSet::from_layout(
            &config.layout(),
            &config.split_codec(),
            config.recursive_split_dirs,
        );
        Self::with_stores(config, stores)
    }

    /// Create registry over explicit stores
    #[must_use]
    pub fn with_stores(config: RegistryConfig, stores: StoreSet) -> Self {
        let cache = Arc::new(ViewCache::new(
            MergeResolver::new(stores.clone()),
            config.cache_ttl(),
        ));
        let locks = Arc::new(SuppressionLocks::new(
            config.suppression_grace(),
            config.suppression_max_hold(),
        ));
        let notifier = Arc::new(Notifier::default());
        let writes = WriteSerializer::new(cache.clone(), locks.clone(), notifier.clone());
        debug!(stores = ?stores.ids(), "mode registry created");
        Self {
            inner: Arc::new(RegistryInner {
                layout: config.layout(),
                config,
                stores,
                cache,
                locks,
                notifier,
                writes,
                migration_attempted: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// Configured stores
    #[inline]
    #[must_use]
    pub fn stores(&self) -> &StoreSet {
        &self.inner.stores
    }

    /// Suppression locks shared with the write queue
    #[inline]
    #[must_use]
    pub fn locks(&self) -> &Arc<SuppressionLocks> {
        &self.inner.locks
    }

    /// Write queue
    #[inline]
    #[must_use]
    pub fn writes(&self) -> &WriteSerializer {
        &self.inner.writes
    }

    /// Every resolved record, one per slug
    ///
    /// Never fails; see [`view`](Self::view) for loading diagnostics.
    pub async fn get_all(&self) -> Vec<ModeConfig> {
        self.view().await.to_vec()
    }

    /// Resolved records plus loading diagnostics
    pub async fn view(&self) -> Arc<MergedView> {
        self.inner.cache.get().await
    }

    /// Resolved record for `slug`
    pub async fn get(&self, slug: &Slug) -> Option<ModeConfig> {
        self.view().await.get(slug).cloned()
    }

    /// Write `mode` to the store named by its scope and format
    ///
    /// Returns once the write is on disk and the cache is invalidated.
    ///
    /// # Errors
    /// Fails when `slug` differs from the record's slug, the record is
    /// invalid, the target store is not configured, or the store rejects the
    /// write.
    pub async fn upsert(&self, slug: &Slug, mode: ModeConfig) -> Result<()> {
        if &mode.slug != slug {
            return Err(RegistryError::SlugMismatch {
                requested: slug.to_string(),
                record: mode.slug.to_string(),
            });
        }
        mode.validate()?;
        let store = self.store(mode.store_id())?;
        let label = format!("upsert {slug}");

        self.inner
            .writes
            .submit(label.clone(), move |ctx| async move {
                let target = store.location_for(&mode.slug).await;
                ctx.suppress(&mode.slug, &target);
                let path = store.write(&mode).await?;
                Ok::<_, RegistryError>(WriteOutcome::changed(label, Some(store.id()), vec![path]))
            })
            .await?;
        Ok(())
    }

    /// Remove `slug` from every store that holds it
    ///
    /// Removing a slug that does not exist is not an error.
    ///
    /// # Errors
    /// Fails on the first store that cannot be updated.
    pub async fn delete(&self, slug: &Slug) -> Result<()> {
        let stores: Vec<SharedStore> = self.inner.stores.iter().cloned().collect();
        let slug = slug.clone();
        let label = format!("delete {slug}");

        self.inner
            .writes
            .submit(label.clone(), move |ctx| async move {
                let mut paths = Vec::new();
                let mut touched = Vec::new();
                for store in &stores {
                    let target = store.location_for(&slug).await;
                    ctx.suppress(&slug, &target);
                    if store.delete(&slug).await? {
                        ctx.touched(&target);
                        paths.push(target);
                        touched.push(store.id());
                    }
                }
                Ok::<_, RegistryError>(match touched.as_slice() {
                    [] => WriteOutcome::unchanged(label),
                    [only] => WriteOutcome::changed(label, Some(*only), paths),
                    _ => WriteOutcome::changed(label, None, paths),
                })
            })
            .await?;
        Ok(())
    }

    /// Migrate `scope`'s legacy file into a split directory, once per
    /// registry
    ///
    /// Never fails; problems are described by the report and legacy records
    /// stay available either way.
    pub async fn migrate_legacy_if_needed(&self, scope: ModeScope) -> MigrationReport {
        if !self.inner.migration_attempted.lock().insert(scope) {
            return MigrationReport::already_attempted(scope);
        }
        let Some(plan) = LegacyMigration::for_layout(&self.inner.layout, scope) else {
            return MigrationReport::not_needed(scope, format!("no {scope} root configured"));
        };
        let plan = plan.with_codec(self.inner.config.split_codec());

        let slot: Arc<Mutex<Option<MigrationReport>>> = Arc::new(Mutex::new(None));
        let result_slot = slot.clone();
        let label = format!("migrate {scope}");
        let submitted = self
            .inner
            .writes
            .submit(label.clone(), move |ctx| async move {
                let report = plan.run(|slug, path| ctx.suppress(slug, path)).await;
                let outcome = if report.is_migrated() {
                    WriteOutcome::changed(
                        label,
                        Some(StoreId::new(scope, ModeFormat::Split)),
                        vec![plan.split_dir().to_path_buf()],
                    )
                } else {
                    WriteOutcome::unchanged(label)
                };
                *result_slot.lock() = Some(report);
                Ok(outcome)
            })
            .await;

        let report = slot.lock().take();
        match (submitted, report) {
            (_, Some(report)) => report,
            (Err(e), None) => MigrationReport::failed(scope, e.to_string()),
            (Ok(_), None) => MigrationReport::failed(scope, "migration did not run"),
        }
    }

    /// Drop the cached view and notify dependents
    pub fn invalidate(&self) {
        self.inner.cache.invalidate();
        self.inner.notifier.refreshed(RefreshCause::Manual);
    }

    /// Receive refresh events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.inner.notifier.subscribe()
    }

    /// Register a refresh callback, invoked once per refresh
    pub fn on_refresh(&self, callback: impl Fn(&RegistryEvent) + Send + Sync + 'static) {
        let callback: RefreshCallback = Arc::new(callback);
        self.inner.notifier.on_refresh(callback);
    }

    /// Bridge for hosts that deliver their own file events
    #[must_use]
    pub fn bridge(&self) -> ChangeBridge {
        ChangeBridge::new(
            self.inner.stores.clone(),
            self.inner.cache.clone(),
            self.inner.locks.clone(),
            self.inner.notifier.clone(),
        )
    }

    /// Watch every store location and keep the cache coherent
    ///
    /// # Errors
    /// Returns [`RegistryError::Watch`] if the platform watcher cannot start.
    pub fn watch(&self) -> Result<WatchHandle> {
        let (events, bridge) = self.bridge().spawn();
        let watcher = FsWatcher::start(self.inner.stores.watch_targets(), events)?;
        info!(targets = ?watcher.watched(), "watching mode stores");
        Ok(WatchHandle { watcher, bridge })
    }

    /// Render the resolved record for `slug` as a split document
    ///
    /// # Errors
    /// Returns [`RegistryError::UnknownMode`] if no store holds `slug`.
    pub async fn export_mode(&self, slug: &Slug) -> Result<String> {
        let view = self.view().await;
        let mode = view
            .get(slug)
            .ok_or_else(|| RegistryError::UnknownMode(slug.to_string()))?;
        Ok(self.inner.config.split_codec().encode(mode)?)
    }

    /// Import records from a legacy aggregate or split document into `scope`
    ///
    /// A document with a `customModes` key is read as an aggregate; anything
    /// else as a split document whose slug is the file stem of
    /// `source.path`. Imported records are written in the configured
    /// default format as one queued operation.
    ///
    /// # Errors
    /// Fails on syntax errors, when the target store is not configured, or
    /// when the store rejects the write.
    pub async fn import_modes(&self, source: &SourceFile<'_>, scope: ModeScope) -> Result<ImportReport> {
        let decoded = decode_import(source, scope)?;
        let format = self.inner.config.default_format;
        let store = self.store(StoreId::new(scope, format))?;
        let modes: Vec<ModeConfig> = decoded
            .modes
            .into_iter()
            .map(|m| m.with_origin(scope, format))
            .collect();
        let report = ImportReport {
            imported: modes.iter().map(|m| m.slug.clone()).collect(),
            skipped: decoded.diagnostics,
        };
        if modes.is_empty() {
            return Ok(report);
        }

        let label = format!("import {} modes into {}", modes.len(), store.id());
        self.inner
            .writes
            .submit(label.clone(), move |ctx| async move {
                let mut paths = Vec::new();
                for mode in &modes {
                    let target = store.location_for(&mode.slug).await;
                    ctx.suppress(&mode.slug, &target);
                    let path = store.write(mode).await?;
                    ctx.touched(&path);
                    if !paths.contains(&path) {
                        paths.push(path);
                    }
                }
                Ok::<_, RegistryError>(WriteOutcome::changed(label, Some(store.id()), paths))
            })
            .await?;
        Ok(report)
    }

    /// Remove every record of `scope` from both formats
    ///
    /// Returns how many records were removed.
    ///
    /// # Errors
    /// Fails when no store serves `scope` or a store cannot be cleared.
    pub async fn reset_scope(&self, scope: ModeScope) -> Result<usize> {
        let stores: Vec<SharedStore> = self.inner.stores.in_scope(scope).cloned().collect();
        if stores.is_empty() {
            return Err(RegistryError::StoreUnavailable(StoreId::new(
                scope,
                ModeFormat::Split,
            )));
        }
        let removed = Arc::new(Mutex::new(0usize));
        let counter = removed.clone();
        let label = format!("reset {scope}");

        self.inner
            .writes
            .submit(label.clone(), move |ctx| async move {
                let mut total = 0;
                let mut paths = Vec::new();
                for store in &stores {
                    let mut targets = Vec::new();
                    for mode in store.enumerate().await.modes {
                        let target = store.location_for(&mode.slug).await;
                        ctx.suppress(&mode.slug, &target);
                        if !targets.contains(&target) {
                            targets.push(target);
                        }
                    }
                    let cleared = store.clear().await?;
                    total += cleared;
                    if cleared == 0 {
                        continue;
                    }
                    for target in targets {
                        ctx.touched(&target);
                        if !paths.contains(&target) {
                            paths.push(target);
                        }
                    }
                }
                *counter.lock() = total;
                Ok::<_, RegistryError>(if total == 0 {
                    WriteOutcome::unchanged(label)
                } else {
                    WriteOutcome::changed(label, None, paths)
                })
            })
            .await?;
        let total = *removed.lock();
        Ok(total)
    }

    fn store(&self, id: StoreId) -> Result<SharedStore> {
        self.inner
            .stores
            .get(id)
            .cloned()
            .ok_or(RegistryError::StoreUnavailable(id))
    }
}

impl std::fmt::Debug for ModeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModeRegistry")
            .field("stores", &self.inner.stores.ids())
            .field("writes", &self.inner.writes)
            .finish_non_exhaustive()
    }
}

fn decode_import(source: &SourceFile<'_>, scope: ModeScope) -> Result<Decoded> {
    let text = modekit_codec::strip_bom(source.text);
    let value: Value =
        serde_yaml::from_str(text).map_err(|e| CodecError::parse(source.path, &e))?;
    let is_aggregate = matches!(&value, Value::Mapping(map) if map.contains_key(LEGACY_KEY));
    Ok(if is_aggregate {
        LegacyCodec::new().decode(source, scope)
    } else {
        SplitCodec::new().decode(source, scope)
    })
}
