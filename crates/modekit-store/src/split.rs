//! Directory store: one document per record

use crate::error::{access_error, check_io, StoreError};
use crate::fsutil::{remove_if_exists, write_atomic};
use crate::store::{ensure_owner, Enumeration, ModeStore, PathClaim, WatchTarget};
use async_trait::async_trait;
use modekit_codec::{
    Decoded, ModeCodec, SourceFile, SplitCodec, SPLIT_EXTENSION, SPLIT_EXTENSION_ALIAS,
};
use modekit_model::{AccessKind, Diagnostic, ModeConfig, ModeFormat, ModeScope, Slug, StoreId};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Store backed by a directory of `<slug>.yaml` files
#[derive(Debug, Clone)]
pub struct SplitDirStore {
    id: StoreId,
    dir: PathBuf,
    codec: SplitCodec,
    recursive: bool,
    boundary: Option<PathBuf>,
}

impl SplitDirStore {
    /// Create store for `scope` rooted at `dir`
    #[must_use]
    pub fn new(scope: ModeScope, dir: impl Into<PathBuf>) -> Self {
        Self {
            id: StoreId::new(scope, ModeFormat::Split),
            dir: dir.into(),
            codec: SplitCodec::new(),
            recursive: false,
            boundary: None,
        }
    }

    /// With codec (schema annotation)
    #[inline]
    #[must_use]
    pub fn with_codec(mut self, codec: SplitCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Also enumerate nested directories
    #[inline]
    #[must_use]
    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Scope root the directory lives under; ancestors of the directory
    /// are claimed only strictly below it
    #[inline]
    #[must_use]
    pub fn with_boundary(mut self, root: impl Into<PathBuf>) -> Self {
        self.boundary = Some(root.into());
        self
    }

    /// Directory holding the documents
    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether `path` is an ancestor whose creation or removal can make the
    /// directory appear or vanish. Without a boundary only the parent counts.
    fn claims_ancestor(&self, path: &Path) -> bool {
        if !self.dir.starts_with(path) {
            return false;
        }
        match &self.boundary {
            Some(root) => path.starts_with(root) && path != root.as_path(),
            None => self.dir.parent() == Some(path),
        }
    }

    /// Candidate mode files, ordered so that a `.yaml` file is visited after
    /// its `.yml` twin
    async fn list_files(
        &self,
        diagnostics: Option<&mut Vec<Diagnostic>>,
    ) -> Result<Vec<PathBuf>, StoreError> {
        let mut files = Vec::new();
        let mut pending = vec![self.dir.clone()];
        let mut problems = Vec::new();

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if dir == self.dir => {
                    return Err(access_error(self.id, &dir, e, true).await);
                }
                Err(e) => {
                    problems.push(access_error(self.id, &dir, e, true).await.to_diagnostic());
                    continue;
                }
            };
            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => {
                        problems.push(access_error(self.id, &dir, e, true).await.to_diagnostic());
                        break;
                    }
                };
                let path = entry.path();
                let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
                if is_dir {
                    if self.recursive {
                        pending.push(path);
                    }
                    continue;
                }
                if SplitCodec::slug_for_path(&path).is_some() {
                    files.push(path);
                }
            }
        }

        files.sort_by(|a, b| {
            let key = |p: &Path| {
                (
                    p.with_extension(""),
                    p.extension().and_then(|e| e.to_str()) == Some(SPLIT_EXTENSION),
                )
            };
            key(a).cmp(&key(b))
        });
        if let Some(out) = diagnostics {
            out.extend(problems);
        }
        Ok(files)
    }

    /// Existing files holding `slug`, primary spelling first
    async fn existing_files(&self, slug: &Slug) -> Vec<PathBuf> {
        let mut found = Vec::new();
        for ext in [SPLIT_EXTENSION, SPLIT_EXTENSION_ALIAS] {
            let path = self.dir.join(format!("{slug}.{ext}"));
            if tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_file()) {
                found.push(path);
            }
        }
        if self.recursive {
            if let Ok(files) = self.list_files(None).await {
                for path in files {
                    if SplitCodec::slug_for_path(&path) == Some(slug.as_str()) && !found.contains(&path) {
                        found.push(path);
                    }
                }
            }
        }
        found
    }
}

#[async_trait]
impl ModeStore for SplitDirStore {
    fn id(&self) -> StoreId {
        self.id
    }

    async fn enumerate(&self) -> Enumeration {
        let mut listing = Enumeration::empty(self.id);
        let files = match self.list_files(Some(&mut listing.diagnostics)).await {
            Ok(files) => files,
            Err(e) => {
                if e.access_kind() == Some(AccessKind::NotFound) {
                    debug!(store = %self.id, dir = %self.dir.display(), "split directory absent");
                } else {
                    warn!(store = %self.id, "{e}");
                }
                listing.diagnostics.push(e.to_diagnostic());
                return listing.tagged();
            }
        };

        let mut decoded = Decoded::default();
        for path in files {
            let text = match tokio::fs::read_to_string(&path).await {
                Ok(text) => text,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => {
                    let err = access_error(self.id, &path, e, false).await;
                    warn!(store = %self.id, "{err}");
                    decoded.diagnostics.push(err.to_diagnostic());
                    continue;
                }
            };
            let one = self.codec.decode(&SourceFile::new(&path, &text), self.id.scope);
            decoded.extend(one, &path);
        }

        debug!(store = %self.id, count = decoded.modes.len(), "enumerated split directory");
        listing.modes = decoded.modes;
        listing.diagnostics.extend(decoded.diagnostics);
        listing.tagged()
    }

    async fn read_one(&self, slug: &Slug) -> Option<ModeConfig> {
        // Primary spelling wins over the alias
        let path = self.existing_files(slug).await.into_iter().next()?;
        let text = tokio::fs::read_to_string(&path).await.ok()?;
        self.codec
            .decode_one(&path, slug.as_str(), &text, self.id.scope)
            .ok()
    }

    async fn write(&self, mode: &ModeConfig) -> Result<PathBuf, StoreError> {
        ensure_owner(self.id, mode)?;
        let text = self.codec.encode(mode).map_err(|source| StoreError::Codec {
            store: self.id,
            source,
        })?;
        let path = self.location_for(&mode.slug).await;
        if let Some(parent) = path.parent() {
            check_io(self.id, parent, true, tokio::fs::create_dir_all(parent).await).await?;
        }
        check_io(self.id, &path, false, write_atomic(&path, &text).await).await?;
        debug!(store = %self.id, slug = %mode.slug, path = %path.display(), "wrote split document");
        Ok(path)
    }

    async fn delete(&self, slug: &Slug) -> Result<bool, StoreError> {
        let mut removed = false;
        for path in self.existing_files(slug).await {
            removed |= check_io(self.id, &path, false, remove_if_exists(&path).await).await?;
        }
        if removed {
            debug!(store = %self.id, slug = %slug, "deleted split document");
        }
        Ok(removed)
    }

    async fn clear(&self) -> Result<usize, StoreError> {
        let files = match self.list_files(None).await {
            Ok(files) => files,
            Err(e) if e.access_kind() == Some(AccessKind::NotFound) => return Ok(0),
            Err(e) => return Err(e),
        };
        let mut removed = 0;
        for path in files {
            if check_io(self.id, &path, false, remove_if_exists(&path).await).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn location_for(&self, slug: &Slug) -> PathBuf {
        // A record loaded from the alias spelling is written back in place
        self.existing_files(slug)
            .await
            .into_iter()
            .next()
            .unwrap_or_else(|| self.dir.join(format!("{slug}.{SPLIT_EXTENSION}")))
    }

    fn watch_targets(&self) -> Vec<WatchTarget> {
        vec![WatchTarget {
            path: self.dir.clone(),
            recursive: self.recursive,
        }]
    }

    fn claims_path(&self, path: &Path) -> Option<PathClaim> {
        if path == self.dir {
            return Some(PathClaim::Root);
        }
        if self.claims_ancestor(path) {
            return Some(PathClaim::Root);
        }
        let parent = path.parent()?;
        let inside = if self.recursive {
            parent.starts_with(&self.dir)
        } else {
            parent == self.dir
        };
        if !inside {
            return None;
        }
        SplitCodec::slug_for_path(path).map(|slug| PathClaim::Record(slug.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modekit_model::{DiagnosticKind, Severity, ToolGroup};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> SplitDirStore {
        SplitDirStore::new(ModeScope::Project, dir.path().join("modes"))
    }

    fn record(slug: &str, name: &str) -> ModeConfig {
        ModeConfig::new(Slug::new(slug).unwrap(), name, "Role")
            .with_origin(ModeScope::Project, ModeFormat::Split)
            .with_group(ToolGroup::Read)
    }

    async fn put(dir: &Path, name: &str, text: &str) {
        tokio::fs::create_dir_all(dir).await.unwrap();
        tokio::fs::write(dir.join(name), text).await.unwrap();
    }

    #[tokio::test]
    async fn missing_directory_is_empty_with_info() {
        let tmp = TempDir::new().unwrap();
        let listing = store(&tmp).enumerate().await;
        assert!(listing.modes.is_empty());
        assert_eq!(listing.diagnostics.len(), 1);
        assert_eq!(listing.diagnostics[0].severity, Severity::Info);
        assert_eq!(
            listing.diagnostics[0].kind,
            DiagnosticKind::Access {
                kind: AccessKind::NotFound
            }
        );
    }

    #[tokio::test]
    async fn file_in_place_of_directory_is_classified() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("modes"), "x").await.unwrap();
        let listing = store(&tmp).enumerate().await;
        assert!(listing.modes.is_empty());
        assert_eq!(
            listing.diagnostics[0].kind,
            DiagnosticKind::Access {
                kind: AccessKind::NotADirectory
            }
        );
    }

    #[tokio::test]
    async fn enumerate_skips_bad_files_and_foreign_extensions() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("modes");
        put(&dir, "good.yaml", "name: Good\nroleDefinition: r\n").await;
        put(&dir, "bad.yaml", "name: [unclosed\n").await;
        put(&dir, "notes.txt", "name: Ignored\nroleDefinition: r\n").await;
        put(&dir, "Bad Slug.yml", "name: X\nroleDefinition: r\n").await;

        let listing = store(&tmp).enumerate().await;
        let slugs: Vec<_> = listing.modes.iter().map(|m| m.slug.as_str()).collect();
        assert_eq!(slugs, vec!["good"]);
        assert_eq!(listing.diagnostics.len(), 2);
        assert!(listing
            .diagnostics
            .iter()
            .all(|d| d.store == Some(store(&tmp).id())));
    }

    #[tokio::test]
    async fn nested_directories_only_when_recursive() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("modes");
        put(&dir, "top.yaml", "name: Top\nroleDefinition: r\n").await;
        put(&dir.join("team"), "nested.yaml", "name: Nested\nroleDefinition: r\n").await;

        assert_eq!(store(&tmp).enumerate().await.modes.len(), 1);
        let recursive = store(&tmp).with_recursive(true);
        assert_eq!(recursive.enumerate().await.modes.len(), 2);
        assert_eq!(
            recursive.claims_path(&dir.join("team").join("nested.yaml")),
            Some(PathClaim::Record("nested".into()))
        );
        assert_eq!(store(&tmp).claims_path(&dir.join("team").join("nested.yaml")), None);
    }

    #[tokio::test]
    async fn write_creates_directory_and_reads_back() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let path = store.write(&record("architect", "Architect")).await.unwrap();
        assert_eq!(path, tmp.path().join("modes").join("architect.yaml"));

        let back = store.read_one(&Slug::new("architect").unwrap()).await.unwrap();
        assert_eq!(back.name, "Architect");
        assert_eq!(back.store_id(), store.id());
    }

    #[tokio::test]
    async fn alias_spelling_is_rewritten_in_place_and_deleted_with_primary() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("modes");
        put(&dir, "writer.yml", "name: Old\nroleDefinition: r\n").await;
        let store = store(&tmp);

        let path = store.write(&record("writer", "New")).await.unwrap();
        assert_eq!(path, dir.join("writer.yml"));
        assert!(!dir.join("writer.yaml").exists());

        put(&dir, "writer.yaml", "name: Primary\nroleDefinition: r\n").await;
        let listing = store.enumerate().await;
        assert_eq!(listing.modes.len(), 1);
        assert_eq!(listing.modes[0].name, "Primary");

        assert!(store.delete(&Slug::new("writer").unwrap()).await.unwrap());
        assert!(!dir.join("writer.yml").exists());
        assert!(!dir.join("writer.yaml").exists());
    }

    #[tokio::test]
    async fn delete_missing_is_not_an_error() {
        let tmp = TempDir::new().unwrap();
        assert!(!store(&tmp).delete(&Slug::new("ghost").unwrap()).await.unwrap());
    }

    #[tokio::test]
    async fn write_rejects_foreign_record() {
        let tmp = TempDir::new().unwrap();
        let mode = record("a", "A").with_origin(ModeScope::Global, ModeFormat::Split);
        let err = store(&tmp).write(&mode).await.unwrap_err();
        assert!(matches!(err, StoreError::WrongStore { .. }));
    }

    #[tokio::test]
    async fn write_under_file_parent_reports_access_error() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("modes"), "x").await.unwrap();
        let err = store(&tmp).write(&record("a", "A")).await.unwrap_err();
        assert!(matches!(
            err.access_kind(),
            Some(AccessKind::NotADirectory | AccessKind::MalformedParent)
        ));
    }

    #[tokio::test]
    async fn clear_removes_every_document() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        store.write(&record("a", "A")).await.unwrap();
        store.write(&record("b", "B")).await.unwrap();
        assert_eq!(store.clear().await.unwrap(), 2);
        assert!(store.enumerate().await.modes.is_empty());
        assert_eq!(SplitDirStore::new(ModeScope::Global, tmp.path().join("none")).clear().await.unwrap(), 0);
    }

    #[test]
    fn claims_paths_inside_directory() {
        let store = SplitDirStore::new(ModeScope::Project, "/repo/.roo/modes");
        assert_eq!(
            store.claims_path(Path::new("/repo/.roo/modes/a.yaml")),
            Some(PathClaim::Record("a".into()))
        );
        assert_eq!(store.claims_path(Path::new("/repo/.roo/modes")), Some(PathClaim::Root));
        assert_eq!(store.claims_path(Path::new("/repo/.roo")), Some(PathClaim::Root));
        assert_eq!(store.claims_path(Path::new("/repo")), None);
        assert_eq!(store.claims_path(Path::new("/")), None);
        assert_eq!(store.claims_path(Path::new("/repo/.roo/modes/a.json")), None);
        assert_eq!(store.claims_path(Path::new("/repo/.roomodes")), None);
    }

    #[test]
    fn ancestor_claims_stop_at_boundary() {
        let project = SplitDirStore::new(ModeScope::Project, "/repo/.roo/modes").with_boundary("/repo");
        assert_eq!(project.claims_path(Path::new("/repo/.roo")), Some(PathClaim::Root));
        assert_eq!(project.claims_path(Path::new("/repo")), None);
        assert_eq!(project.claims_path(Path::new("/")), None);

        let global = SplitDirStore::new(ModeScope::Global, "/home/u/.modes/modes").with_boundary("/home/u/.modes");
        assert_eq!(global.claims_path(Path::new("/home/u/.modes/modes")), Some(PathClaim::Root));
        assert_eq!(global.claims_path(Path::new("/home/u/.modes")), None);
        assert_eq!(global.claims_path(Path::new("/home")), None);
    }
}
