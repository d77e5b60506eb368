//! Non-fatal problems surfaced alongside resolved modes
//!
//! Loading never fails as a whole: a bad file, a bad record or an
//! unreadable root becomes a [`Diagnostic`] and resolution carries on.

use crate::mode::StoreId;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;

/// How loud a diagnostic is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational (e.g. an expected file is simply absent)
    Info,
    /// Something was dropped or ignored
    Warning,
    /// An operation failed
    Error,
}

/// Classification of a filesystem access failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessKind {
    /// Path does not exist
    NotFound,
    /// Permission denied
    PermissionDenied,
    /// Expected a directory, found something else
    NotADirectory,
    /// Expected a file, found a directory
    IsADirectory,
    /// A parent component is missing or not a directory
    MalformedParent,
    /// Any other I/O failure
    Other,
}

impl AccessKind {
    /// Stable label for messages
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not found",
            Self::PermissionDenied => "permission denied",
            Self::NotADirectory => "not a directory",
            Self::IsADirectory => "is a directory",
            Self::MalformedParent => "malformed parent path",
            Self::Other => "i/o error",
        }
    }
}

impl Display for AccessKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What went wrong
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DiagnosticKind {
    /// Structured-text syntax error
    Parse {
        /// 1-based line, when the parser reports one
        line: Option<usize>,
        /// 1-based column, when the parser reports one
        column: Option<usize>,
    },
    /// Document has the wrong top-level shape
    Shape,
    /// Record failed schema or slug validation
    Validation,
    /// Same slug seen twice in one store; the later one won
    DuplicateSlug,
    /// Store root could not be accessed
    Access {
        /// Access failure class
        kind: AccessKind,
    },
    /// Legacy-to-split migration problem
    Migration,
}

/// A non-fatal problem found while loading or migrating
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity
    pub severity: Severity,
    /// Classification
    pub kind: DiagnosticKind,
    /// Store that produced it, once known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<StoreId>,
    /// Offending file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Offending record, when one can be named
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    /// Human-readable message
    pub message: String,
}

impl Diagnostic {
    /// Create a warning
    #[must_use]
    pub fn warning(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            kind,
            store: None,
            path: None,
            slug: None,
            message: message.into(),
        }
    }

    /// Create with explicit severity
    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Attach the producing store
    #[must_use]
    pub fn in_store(mut self, store: StoreId) -> Self {
        self.store = Some(store);
        self
    }

    /// Attach the offending path
    #[must_use]
    pub fn at_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Attach the offending slug
    #[must_use]
    pub fn for_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(store) = self.store {
            write!(f, "[{store}] ")?;
        }
        if let Some(path) = &self.path {
            write!(f, "{}", path.display())?;
            if let DiagnosticKind::Parse {
                line: Some(line),
                column,
            } = &self.kind
            {
                write!(f, ":{line}")?;
                if let Some(column) = column {
                    write!(f, ":{column}")?;
                }
            }
            f.write_str(": ")?;
        }
        if let Some(slug) = &self.slug {
            write!(f, "mode '{slug}': ")?;
        }
        f.write_str(&self.message)
    }
}
