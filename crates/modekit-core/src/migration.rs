//! One-time migration of legacy aggregate files into split directories
//!
//! Runs only when a scope's split directory is absent and its legacy file is
//! present. Records are written into a staging directory next to the split
//! root, which is renamed into place once every record is on disk; a failed
//! run leaves no partial split root behind. The legacy file is never
//! modified, renamed or deleted.

use crate::error::RegistryError;
use modekit_codec::{LegacyCodec, ModeCodec, SourceFile, SplitCodec, SPLIT_EXTENSION};
use modekit_model::{Diagnostic, DiagnosticKind, ModeFormat, ModeScope, Severity, Slug, StoreId};
use modekit_store::StoreLayout;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// How a migration attempt ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MigrationOutcome {
    /// Split directory created from the legacy file
    Migrated,
    /// Nothing to do
    NotNeeded {
        /// Why not
        reason: String,
    },
    /// Migration was already attempted for this scope in this session
    AlreadyAttempted,
    /// Migration stopped; legacy records keep being served from the file
    Failed {
        /// What went wrong
        message: String,
    },
}

/// Result of [`ModeRegistry::migrate_legacy_if_needed`](crate::ModeRegistry::migrate_legacy_if_needed)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// Scope examined
    pub scope: ModeScope,
    /// How it ended
    pub outcome: MigrationOutcome,
    /// Records written to the split directory
    pub migrated: Vec<Slug>,
    /// Records left behind, with the reason
    pub skipped: Vec<Diagnostic>,
}

impl MigrationReport {
    fn new(scope: ModeScope, outcome: MigrationOutcome) -> Self {
        Self {
            scope,
            outcome,
            migrated: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Report for a scope that was already handled this session
    #[must_use]
    pub fn already_attempted(scope: ModeScope) -> Self {
        Self::new(scope, MigrationOutcome::AlreadyAttempted)
    }

    /// Report for a scope with nothing to migrate
    #[must_use]
    pub fn not_needed(scope: ModeScope, reason: impl Into<String>) -> Self {
        Self::new(
            scope,
            MigrationOutcome::NotNeeded {
                reason: reason.into(),
            },
        )
    }

    pub(crate) fn failed(scope: ModeScope, message: impl Into<String>) -> Self {
        Self::new(
            scope,
            MigrationOutcome::Failed {
                message: message.into(),
            },
        )
    }

    /// Number of records migrated
    #[inline]
    #[must_use]
    pub fn migrated_count(&self) -> usize {
        self.migrated.len()
    }

    /// Whether the split directory was created
    #[inline]
    #[must_use]
    pub fn is_migrated(&self) -> bool {
        self.outcome == MigrationOutcome::Migrated
    }

    /// Turn a failed outcome into an error
    ///
    /// # Errors
    /// Returns [`RegistryError::Migration`] when the outcome is `Failed`.
    pub fn into_result(self) -> Result<Self, RegistryError> {
        match &self.outcome {
            MigrationOutcome::Failed { message } => {
                Err(RegistryError::migration(self.scope, message.clone()))
            }
            _ => Ok(self),
        }
    }
}

/// Migration plan for one scope
#[derive(Debug, Clone)]
pub struct LegacyMigration {
    scope: ModeScope,
    split_dir: PathBuf,
    legacy_file: PathBuf,
    codec: SplitCodec,
}

impl LegacyMigration {
    /// Create plan moving `legacy_file` into `split_dir`
    #[must_use]
    pub fn new(scope: ModeScope, split_dir: impl Into<PathBuf>, legacy_file: impl Into<PathBuf>) -> Self {
        Self {
            scope,
            split_dir: split_dir.into(),
            legacy_file: legacy_file.into(),
            codec: SplitCodec::new(),
        }
    }

    /// Plan for `scope` under `layout`; `None` when the scope has no root
    #[must_use]
    pub fn for_layout(layout: &StoreLayout, scope: ModeScope) -> Option<Self> {
        Some(Self::new(scope, layout.split_dir(scope)?, layout.legacy_file(scope)?))
    }

    /// With split codec (schema annotation)
    #[inline]
    #[must_use]
    pub fn with_codec(mut self, codec: SplitCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Scope migrated
    #[inline]
    #[must_use]
    pub fn scope(&self) -> ModeScope {
        self.scope
    }

    /// Split directory created by the migration
    #[inline]
    #[must_use]
    pub fn split_dir(&self) -> &Path {
        &self.split_dir
    }

    /// Perform the migration if its preconditions hold
    ///
    /// `before_write` is called with each slug and its final path before
    /// anything is written, so the caller can suppress the resulting file
    /// events.
    pub async fn run(&self, before_write: impl Fn(&Slug, &Path)) -> MigrationReport {
        let scope = self.scope;
        match tokio::fs::symlink_metadata(&self.split_dir).await {
            Ok(_) => return MigrationReport::not_needed(scope, "split directory already exists"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return self.fail(format!("cannot inspect {}: {e}", self.split_dir.display()));
            }
        }

        let text = match tokio::fs::read_to_string(&self.legacy_file).await {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return MigrationReport::not_needed(scope, "no legacy file");
            }
            Err(e) => {
                return self.fail(format!("cannot read {}: {e}", self.legacy_file.display()));
            }
        };

        let decoded = LegacyCodec::new().decode(&SourceFile::new(&self.legacy_file, &text), scope);
        if let Some(fatal) = decoded.diagnostics.iter().find(|d| {
            matches!(d.kind, DiagnosticKind::Parse { .. } | DiagnosticKind::Shape)
                && d.severity != Severity::Info
        }) {
            return self.fail(fatal.message.clone());
        }

        let mut report = MigrationReport::new(scope, MigrationOutcome::Migrated);
        report.skipped = decoded
            .diagnostics
            .into_iter()
            .map(|d| {
                Diagnostic {
                    kind: DiagnosticKind::Migration,
                    ..d
                }
                .in_store(StoreId::new(scope, ModeFormat::Legacy))
            })
            .collect();
        for diag in &report.skipped {
            warn!(scope = %scope, "not migrated: {diag}");
        }

        let staging = match self.staging_dir() {
            Some(staging) => staging,
            None => return self.fail("split directory has no parent"),
        };
        if let Err(e) = self.prepare_staging(&staging).await {
            return self.fail(format!("cannot create {}: {e}", staging.display()));
        }

        for mode in &decoded.modes {
            let mode = mode.clone().with_origin(scope, ModeFormat::Split);
            let file_name = format!("{}.{SPLIT_EXTENSION}", mode.slug);
            before_write(&mode.slug, &self.split_dir.join(&file_name));

            let written = match self.codec.encode(&mode) {
                Ok(doc) => tokio::fs::write(staging.join(&file_name), doc)
                    .await
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            if let Err(message) = written {
                let _ = tokio::fs::remove_dir_all(&staging).await;
                return self.fail(format!("cannot write mode '{}': {message}", mode.slug));
            }
            report.migrated.push(mode.slug);
        }

        if let Err(e) = tokio::fs::rename(&staging, &self.split_dir).await {
            let _ = tokio::fs::remove_dir_all(&staging).await;
            return self.fail(format!("cannot move staged modes into place: {e}"));
        }

        info!(
            scope = %scope,
            migrated = report.migrated_count(),
            skipped = report.skipped.len(),
            dir = %self.split_dir.display(),
            "migrated legacy modes"
        );
        report
    }

    fn staging_dir(&self) -> Option<PathBuf> {
        let parent = self.split_dir.parent()?;
        let name = self.split_dir.file_name()?.to_string_lossy();
        Some(parent.join(format!(".{name}.staging-{}", std::process::id())))
    }

    async fn prepare_staging(&self, staging: &Path) -> io::Result<()> {
        if tokio::fs::symlink_metadata(staging).await.is_ok() {
            tokio::fs::remove_dir_all(staging).await?;
        }
        tokio::fs::create_dir_all(staging).await
    }

    fn fail(&self, message: impl Into<String>) -> MigrationReport {
        let message = message.into();
        warn!(scope = %self.scope, "migration failed: {message}");
        MigrationReport::failed(self.scope, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const LEGACY: &str = "customModes:\n  - slug: architect\n    name: Architect\n    roleDefinition: You plan.\n    groups: [read]\n  - slug: Bad Slug\n    name: Bad\n    roleDefinition: r\n  - slug: writer\n    name: Writer\n    roleDefinition: You write.\n";

    fn plan(tmp: &TempDir) -> LegacyMigration {
        LegacyMigration::new(
            ModeScope::Project,
            tmp.path().join(".roo").join("modes"),
            tmp.path().join(".roomodes"),
        )
    }

    #[tokio::test]
    async fn migrates_valid_records_and_keeps_legacy_file() {
        let tmp = TempDir::new().unwrap();
        let legacy = tmp.path().join(".roomodes");
        tokio::fs::write(&legacy, LEGACY).await.unwrap();

        let seen = Mutex::new(Vec::new());
        let report = plan(&tmp)
            .run(|slug, _| seen.lock().unwrap().push(slug.to_string()))
            .await;

        assert!(report.is_migrated());
        assert_eq!(report.migrated_count(), 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].kind, DiagnosticKind::Migration);
        assert_eq!(*seen.lock().unwrap(), vec!["architect", "writer"]);

        let dir = tmp.path().join(".roo").join("modes");
        assert!(dir.join("architect.yaml").is_file());
        assert!(dir.join("writer.yaml").is_file());
        assert_eq!(tokio::fs::read_to_string(&legacy).await.unwrap(), LEGACY);

        let mut entries = tokio::fs::read_dir(tmp.path().join(".roo")).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec!["modes"], "no staging directory left behind");
    }

    #[tokio::test]
    async fn existing_split_directory_means_nothing_to_do() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join(".roomodes"), LEGACY).await.unwrap();
        tokio::fs::create_dir_all(tmp.path().join(".roo").join("modes"))
            .await
            .unwrap();
        let report = plan(&tmp).run(|_, _| {}).await;
        assert!(matches!(report.outcome, MigrationOutcome::NotNeeded { .. }));
        assert_eq!(report.migrated_count(), 0);
    }

    #[tokio::test]
    async fn missing_legacy_file_means_nothing_to_do() {
        let tmp = TempDir::new().unwrap();
        let report = plan(&tmp).run(|_, _| {}).await;
        assert_eq!(
            report.outcome,
            MigrationOutcome::NotNeeded {
                reason: "no legacy file".into()
            }
        );
        assert!(!tmp.path().join(".roo").exists());
    }

    #[tokio::test]
    async fn malformed_legacy_file_fails_without_split_root() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join(".roomodes"), "customModes: [unclosed\n")
            .await
            .unwrap();
        let report = plan(&tmp).run(|_, _| {}).await;
        assert!(matches!(report.outcome, MigrationOutcome::Failed { .. }));
        assert!(!tmp.path().join(".roo").join("modes").exists());
        assert!(report.into_result().is_err());
    }

    #[tokio::test]
    async fn blocked_parent_fails_cleanly() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join(".roomodes"), LEGACY).await.unwrap();
        tokio::fs::write(tmp.path().join(".roo"), "not a dir").await.unwrap();
        let report = plan(&tmp).run(|_, _| {}).await;
        assert!(matches!(report.outcome, MigrationOutcome::Failed { .. }));
        assert_eq!(
            tokio::fs::read_to_string(tmp.path().join(".roomodes")).await.unwrap(),
            LEGACY
        );
    }
}
