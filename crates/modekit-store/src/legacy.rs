//! Aggregate-file store: every record of a scope in one file

use crate::error::{access_error, check_io, StoreError};
use crate::fsutil::{read_optional, write_atomic};
use crate::store::{ensure_owner, Enumeration, ModeStore, PathClaim, WatchTarget};
use async_trait::async_trait;
use modekit_codec::{LegacyCodec, ModeCodec, SourceFile};
use modekit_model::{AccessKind, ModeConfig, ModeFormat, ModeScope, Slug, StoreId};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Store backed by a single `customModes` file
#[derive(Debug, Clone)]
pub struct LegacyFileStore {
    id: StoreId,
    file: PathBuf,
    codec: LegacyCodec,
}

impl LegacyFileStore {
    /// Create store for `scope` backed by `file`
    #[must_use]
    pub fn new(scope: ModeScope, file: impl Into<PathBuf>) -> Self {
        Self {
            id: StoreId::new(scope, ModeFormat::Legacy),
            file: file.into(),
            codec: LegacyCodec::new(),
        }
    }

    /// Aggregate file path
    #[inline]
    #[must_use]
    pub fn file(&self) -> &Path {
        &self.file
    }

    async fn read_existing(&self) -> Result<Option<String>, StoreError> {
        check_io(self.id, &self.file, false, read_optional(&self.file).await).await
    }

    async fn replace(&self, text: &str) -> Result<(), StoreError> {
        if let Some(parent) = self.file.parent() {
            check_io(self.id, parent, true, tokio::fs::create_dir_all(parent).await).await?;
        }
        check_io(self.id, &self.file, false, write_atomic(&self.file, text).await).await
    }

    fn codec_error(&self, source: modekit_codec::CodecError) -> StoreError {
        StoreError::Codec {
            store: self.id,
            source,
        }
    }
}

#[async_trait]
impl ModeStore for LegacyFileStore {
    fn id(&self) -> StoreId {
        self.id
    }

    async fn enumerate(&self) -> Enumeration {
        let mut listing = Enumeration::empty(self.id);
        let text = match tokio::fs::read_to_string(&self.file).await {
            Ok(text) => text,
            Err(e) => {
                let err = access_error(self.id, &self.file, e, false).await;
                if err.access_kind() == Some(AccessKind::NotFound) {
                    debug!(store = %self.id, file = %self.file.display(), "aggregate file absent");
                } else {
                    warn!(store = %self.id, "{err}");
                }
                listing.diagnostics.push(err.to_diagnostic());
                return listing.tagged();
            }
        };

        let decoded = self
            .codec
            .decode(&SourceFile::new(&self.file, &text), self.id.scope);
        debug!(store = %self.id, count = decoded.modes.len(), "enumerated aggregate file");
        listing.modes = decoded.modes;
        listing.diagnostics = decoded.diagnostics;
        listing.tagged()
    }

    async fn write(&self, mode: &ModeConfig) -> Result<PathBuf, StoreError> {
        ensure_owner(self.id, mode)?;
        let existing = self.read_existing().await?;
        let text = self
            .codec
            .upsert(&self.file, existing.as_deref(), mode)
            .map_err(|e| self.codec_error(e))?;
        self.replace(&text).await?;
        debug!(store = %self.id, slug = %mode.slug, "upserted aggregate entry");
        Ok(self.file.clone())
    }

    async fn delete(&self, slug: &Slug) -> Result<bool, StoreError> {
        let Some(existing) = self.read_existing().await? else {
            return Ok(false);
        };
        let (text, removed) = self
            .codec
            .remove(&self.file, &existing, slug)
            .map_err(|e| self.codec_error(e))?;
        if removed {
            self.replace(&text).await?;
            debug!(store = %self.id, slug = %slug, "removed aggregate entry");
        }
        Ok(removed)
    }

    async fn clear(&self) -> Result<usize, StoreError> {
        let Some(existing) = self.read_existing().await? else {
            return Ok(0);
        };
        let count = self
            .codec
            .decode(&SourceFile::new(&self.file, &existing), self.id.scope)
            .modes
            .len();
        let text = self
            .codec
            .replace_all(&self.file, Some(&existing), &[])
            .map_err(|e| self.codec_error(e))?;
        self.replace(&text).await?;
        Ok(count)
    }

    async fn location_for(&self, _slug: &Slug) -> PathBuf {
        self.file.clone()
    }

    fn watch_targets(&self) -> Vec<WatchTarget> {
        vec![WatchTarget {
            path: self.file.clone(),
            recursive: false,
        }]
    }

    fn claims_path(&self, path: &Path) -> Option<PathClaim> {
        (path == self.file).then_some(PathClaim::Aggregate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modekit_model::{DiagnosticKind, Severity, ToolGroup};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn store(tmp: &TempDir) -> LegacyFileStore {
        LegacyFileStore::new(ModeScope::Project, tmp.path().join(".roomodes"))
    }

    fn record(slug: &str, name: &str) -> ModeConfig {
        ModeConfig::new(Slug::new(slug).unwrap(), name, "Role")
            .with_origin(ModeScope::Project, ModeFormat::Legacy)
            .with_group(ToolGroup::Edit)
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let listing = store(&tmp).enumerate().await;
        assert!(listing.modes.is_empty());
        assert_eq!(listing.diagnostics[0].severity, Severity::Info);
    }

    #[tokio::test]
    async fn directory_in_place_of_file_is_classified() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::create_dir(tmp.path().join(".roomodes")).await.unwrap();
        let listing = store(&tmp).enumerate().await;
        assert_eq!(
            listing.diagnostics[0].kind,
            DiagnosticKind::Access {
                kind: AccessKind::IsADirectory
            }
        );
    }

    #[tokio::test]
    async fn upsert_replaces_in_place_and_appends() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        store.write(&record("a", "A")).await.unwrap();
        store.write(&record("b", "B")).await.unwrap();
        store.write(&record("a", "A2")).await.unwrap();

        let listing = store.enumerate().await;
        let names: Vec<_> = listing.modes.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["A2", "B"]);
        assert!(listing.modes.iter().all(|m| m.format == ModeFormat::Legacy));
    }

    #[tokio::test]
    async fn unknown_keys_survive_rewrite() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(".roomodes");
        tokio::fs::write(&path, "extra: keep-me\ncustomModes: []\n").await.unwrap();
        store(&tmp).write(&record("a", "A")).await.unwrap();
        let text = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(text.contains("extra: keep-me"));
    }

    #[tokio::test]
    async fn malformed_file_is_never_overwritten() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(".roomodes");
        tokio::fs::write(&path, "customModes: [unclosed\n").await.unwrap();
        let err = store(&tmp).write(&record("a", "A")).await.unwrap_err();
        assert!(matches!(err, StoreError::Codec { .. }));
        assert_eq!(
            tokio::fs::read_to_string(&path).await.unwrap(),
            "customModes: [unclosed\n"
        );
    }

    #[tokio::test]
    async fn delete_and_clear() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        assert!(!store.delete(&Slug::new("a").unwrap()).await.unwrap());

        store.write(&record("a", "A")).await.unwrap();
        store.write(&record("b", "B")).await.unwrap();
        assert!(store.delete(&Slug::new("a").unwrap()).await.unwrap());
        assert!(!store.delete(&Slug::new("a").unwrap()).await.unwrap());
        assert_eq!(store.clear().await.unwrap(), 1);
        assert!(store.enumerate().await.modes.is_empty());
    }

    #[test]
    fn claims_only_its_file() {
        let store = LegacyFileStore::new(ModeScope::Global, "/g/custom_modes.yaml");
        assert_eq!(
            store.claims_path(Path::new("/g/custom_modes.yaml")),
            Some(PathClaim::Aggregate)
        );
        assert_eq!(store.claims_path(Path::new("/g/other.yaml")), None);
    }
}
