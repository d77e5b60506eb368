//! Error types for scope stores
//!
//! Provides error handling for:
//! - Filesystem access (classified by [`AccessKind`])
//! - Codec failures while reading or rewriting a store file
//! - Writes routed to a store that does not own the record

use modekit_codec::CodecError;
use modekit_model::{AccessKind, Diagnostic, DiagnosticKind, Severity, StoreId};
use std::io;
use std::path::{Path, PathBuf};

/// Errors raised by a single (scope, format) store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem access failed
    #[error("[{store}] cannot access {}: {kind}", path.display())]
    Access {
        store: StoreId,
        path: PathBuf,
        kind: AccessKind,
        #[source]
        source: io::Error,
    },

    /// Existing file could not be decoded or the record could not be encoded
    #[error("[{store}] {source}")]
    Codec {
        store: StoreId,
        #[source]
        source: CodecError,
    },

    /// Record provenance names a different store
    #[error("[{store}] refusing to write mode '{slug}' owned by {owner}")]
    WrongStore {
        store: StoreId,
        owner: StoreId,
        slug: String,
    },
}

impl StoreError {
    /// Store the error originated from
    #[inline]
    #[must_use]
    pub fn store(&self) -> StoreId {
        match self {
            Self::Access { store, .. } | Self::Codec { store, .. } | Self::WrongStore { store, .. } => {
                *store
            }
        }
    }

    /// Access class, for access failures
    #[inline]
    #[must_use]
    pub fn access_kind(&self) -> Option<AccessKind> {
        match self {
            Self::Access { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Convert into a loading diagnostic
    #[must_use]
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            Self::Access {
                store,
                path,
                kind,
                source,
            } => {
                let severity = if *kind == AccessKind::NotFound {
                    Severity::Info
                } else {
                    Severity::Warning
                };
                Diagnostic::warning(DiagnosticKind::Access { kind: *kind }, source.to_string())
                    .with_severity(severity)
                    .in_store(*store)
                    .at_path(path)
            }
            Self::Codec { store, source } => source.to_diagnostic().in_store(*store),
            Self::WrongStore { store, slug, .. } => {
                Diagnostic::warning(DiagnosticKind::Validation, self.to_string())
                    .with_severity(Severity::Error)
                    .in_store(*store)
                    .for_slug(slug)
            }
        }
    }
}

/// Classify an I/O failure on `path`
///
/// `NotFound` is refined to [`AccessKind::MalformedParent`] when an ancestor
/// exists but is not a directory, and directory/file mismatches are detected
/// from metadata so the classification does not depend on platform error
/// codes.
pub async fn classify(path: &Path, err: &io::Error, expect_dir: bool) -> AccessKind {
    match err.kind() {
        io::ErrorKind::PermissionDenied => AccessKind::PermissionDenied,
        io::ErrorKind::NotFound => {
            for ancestor in path.ancestors().skip(1) {
                if let Ok(meta) = tokio::fs::metadata(ancestor).await {
                    return if meta.is_dir() {
                        AccessKind::NotFound
                    } else {
                        AccessKind::MalformedParent
                    };
                }
            }
            AccessKind::NotFound
        }
        _ => match tokio::fs::metadata(path).await {
            Ok(meta) if expect_dir && !meta.is_dir() => AccessKind::NotADirectory,
            Ok(meta) if !expect_dir && meta.is_dir() => AccessKind::IsADirectory,
            Ok(_) => AccessKind::Other,
            Err(inner) if inner.kind() == io::ErrorKind::PermissionDenied => {
                AccessKind::PermissionDenied
            }
            Err(_) => {
                // ENOTDIR surfaces here when a parent is a regular file
                for ancestor in path.ancestors().skip(1) {
                    if let Ok(meta) = tokio::fs::metadata(ancestor).await {
                        if !meta.is_dir() {
                            return AccessKind::MalformedParent;
                        }
                        break;
                    }
                }
                AccessKind::Other
            }
        },
    }
}

/// Build a classified access error
pub async fn access_error(store: StoreId, path: &Path, source: io::Error, expect_dir: bool) -> StoreError {
    let kind = classify(path, &source, expect_dir).await;
    StoreError::Access {
        store,
        path: path.to_path_buf(),
        kind,
        source,
    }
}

/// Classify the error of a filesystem call, if any
pub(crate) async fn check_io<T>(
    store: StoreId,
    path: &Path,
    expect_dir: bool,
    result: io::Result<T>,
) -> Result<T, StoreError> {
    match result {
        Ok(value) => Ok(value),
        Err(source) => Err(access_error(store, path, source, expect_dir).await),
    }
}
