//! Testing utilities for the modekit workspace
//!
//! Shared fixtures: temporary global/project roots, record builders, document
//! text helpers and an in-memory store.

#![allow(missing_docs)]

use async_trait::async_trait;
use modekit_model::{ModeConfig, ModeFormat, ModeScope, Slug, StoreId, ToolGroup};
use modekit_store::{
    Enumeration, ModeStore, PathClaim, StoreError, StoreLayout, WatchTarget,
};
use parking_lot::Mutex;
use std::fmt::Write as _;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tempfile::TempDir;

/// A global root and a project root inside one temporary directory
#[derive(Debug)]
pub struct TestWorkspace {
    _tmp: TempDir,
    global: PathBuf,
    project: PathBuf,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let tmp = TempDir::new().expect("create temp dir");
        let global = tmp.path().join("global");
        let project = tmp.path().join("project");
        std::fs::create_dir_all(&global).expect("create global root");
        std::fs::create_dir_all(&project).expect("create project root");
        Self {
            _tmp: tmp,
            global,
            project,
        }
    }

    pub fn global_root(&self) -> &Path {
        &self.global
    }

    pub fn project_root(&self) -> &Path {
        &self.project
    }

    pub fn layout(&self) -> StoreLayout {
        StoreLayout::new(&self.global).with_project_root(&self.project)
    }

    pub fn split_dir(&self, scope: ModeScope) -> PathBuf {
        self.layout().split_dir(scope).expect("both roots configured")
    }

    pub fn legacy_file(&self, scope: ModeScope) -> PathBuf {
        self.layout().legacy_file(scope).expect("both roots configured")
    }

    /// Write the legacy aggregate file for `scope`
    pub fn write_legacy(&self, scope: ModeScope, text: &str) -> PathBuf {
        let path = self.legacy_file(scope);
        write_file(&path, text);
        path
    }

    /// Write `<split dir>/<file_name>` for `scope`
    pub fn write_split(&self, scope: ModeScope, file_name: &str, text: &str) -> PathBuf {
        let path = self.split_dir(scope).join(file_name);
        write_file(&path, text);
        path
    }

    pub fn read(&self, path: &Path) -> String {
        std::fs::read_to_string(path).expect("read fixture file")
    }

    /// File names in the split directory of `scope`, sorted
    pub fn split_files(&self, scope: ModeScope) -> Vec<String> {
        let mut names: Vec<String> = match std::fs::read_dir(self.split_dir(scope)) {
            Ok(entries) => entries
                .filter_map(Result::ok)
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => panic!("cannot list split dir: {e}"),
        };
        names.sort();
        names
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

pub fn write_file(path: &Path, text: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dirs");
    }
    std::fs::write(path, text).expect("write fixture file");
}

pub fn slug(value: &str) -> Slug {
    Slug::new(value).expect("valid test slug")
}

/// Record with `read` access, tagged with the given store
pub fn mode(value: &str, name: &str, scope: ModeScope, format: ModeFormat) -> ModeConfig {
    ModeConfig::new(slug(value), name, format!("You are {name}."))
        .with_origin(scope, format)
        .with_group(ToolGroup::Read)
}

/// Legacy aggregate text holding `(slug, name)` entries
pub fn legacy_doc(entries: &[(&str, &str)]) -> String {
    let mut text = String::from("customModes:\n");
    for (slug, name) in entries {
        let _ = write!(
            text,
            "  - slug: {slug}\n    name: {name}\n    roleDefinition: You are {name}.\n    groups:\n      - read\n"
        );
    }
    text
}

/// Split document text for a record named `name`
pub fn split_doc(name: &str) -> String {
    format!("name: {name}\nroleDefinition: You are {name}.\ngroups:\n  read: {{}}\n")
}

/// In-memory store with switchable write failures
#[derive(Debug)]
pub struct MemoryStore {
    id: StoreId,
    records: Mutex<Vec<ModeConfig>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new(scope: ModeScope, format: ModeFormat) -> Self {
        Self {
            id: StoreId::new(scope, format),
            records: Mutex::new(Vec::new()),
            writes: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Seed records, re-tagged with this store's id
    pub fn with_modes(self, modes: impl IntoIterator<Item = ModeConfig>) -> Self {
        {
            let mut records = self.records.lock();
            for mode in modes {
                records.push(mode.with_origin(self.id.scope, self.id.format));
            }
        }
        self
    }

    /// Make every following write fail with a permission error
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Completed writes so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn slugs(&self) -> Vec<String> {
        self.records.lock().iter().map(|m| m.slug.to_string()).collect()
    }

    fn virtual_path(&self, slug: &Slug) -> PathBuf {
        PathBuf::from(format!("memory/{}/{slug}", self.id))
    }
}

#[async_trait]
impl ModeStore for MemoryStore {
    fn id(&self) -> StoreId {
        self.id
    }

    async fn enumerate(&self) -> Enumeration {
        let mut listing = Enumeration::empty(self.id);
        listing.modes = self.records.lock().clone();
        listing
    }

    async fn write(&self, mode: &ModeConfig) -> Result<PathBuf, StoreError> {
        let path = self.virtual_path(&mode.slug);
        if mode.store_id() != self.id {
            return Err(StoreError::WrongStore {
                store: self.id,
                owner: mode.store_id(),
                slug: mode.slug.to_string(),
            });
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Access {
                store: self.id,
                path,
                kind: modekit_model::AccessKind::PermissionDenied,
                source: io::Error::new(io::ErrorKind::PermissionDenied, "read-only store"),
            });
        }
        let mut records = self.records.lock();
        match records.iter_mut().find(|m| m.slug == mode.slug) {
            Some(existing) => *existing = mode.clone(),
            None => records.push(mode.clone()),
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(path)
    }

    async fn delete(&self, slug: &Slug) -> Result<bool, StoreError> {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|m| &m.slug != slug);
        Ok(records.len() != before)
    }

    async fn clear(&self) -> Result<usize, StoreError> {
        let mut records = self.records.lock();
        let count = records.len();
        records.clear();
        Ok(count)
    }

    async fn location_for(&self, slug: &Slug) -> PathBuf {
        self.virtual_path(slug)
    }

    fn watch_targets(&self) -> Vec<WatchTarget> {
        Vec::new()
    }

    fn claims_path(&self, _path: &Path) -> Option<PathClaim> {
        None
    }
}
