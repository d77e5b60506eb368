//! Error types for the mode codecs
//!
//! Provides error handling for:
//! - Decoding structured text (syntax, shape, schema)
//! - Encoding records back to text

use modekit_model::{Diagnostic, DiagnosticKind, ModelError};
use std::path::PathBuf;

/// Errors raised while decoding or encoding mode documents
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Structured-text syntax error
    #[error("syntax error in {}{}: {message}", origin.display(), position(*line, *column))]
    Parse {
        origin: PathBuf,
        line: Option<usize>,
        column: Option<usize>,
        message: String,
    },

    /// Document parsed but has the wrong top-level shape
    #[error("unexpected document shape in {}: {message}", origin.display())]
    Shape { origin: PathBuf, message: String },

    /// Record failed validation
    #[error("invalid mode{} in {}: {source}", slug_label(slug.as_deref()), origin.display())]
    Validation {
        origin: PathBuf,
        slug: Option<String>,
        #[source]
        source: ModelError,
    },

    /// Record body could not be mapped onto the schema
    #[error("invalid mode{} in {}: {message}", slug_label(slug.as_deref()), origin.display())]
    Schema {
        origin: PathBuf,
        slug: Option<String>,
        message: String,
    },

    /// Serialization failed
    #[error("failed to encode mode document: {0}")]
    Encode(#[from] serde_yaml::Error),
}

fn position(line: Option<usize>, column: Option<usize>) -> String {
    match (line, column) {
        (Some(l), Some(c)) => format!(":{l}:{c}"),
        (Some(l), None) => format!(":{l}"),
        _ => String::new(),
    }
}

fn slug_label(slug: Option<&str>) -> String {
    slug.map(|s| format!(" '{s}'")).unwrap_or_default()
}

impl CodecError {
    /// Build a parse error from a `serde_yaml` failure, keeping its position
    pub fn parse(origin: impl Into<PathBuf>, err: &serde_yaml::Error) -> Self {
        let location = err.location();
        Self::Parse {
            origin: origin.into(),
            line: location.as_ref().map(serde_yaml::Location::line),
            column: location.as_ref().map(serde_yaml::Location::column),
            message: err.to_string(),
        }
    }

    /// Create shape error
    pub fn shape(origin: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Shape {
            origin: origin.into(),
            message: message.into(),
        }
    }

    /// Convert into a loading diagnostic
    #[must_use]
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            Self::Parse {
                origin,
                line,
                column,
                message,
            } => Diagnostic::warning(
                DiagnosticKind::Parse {
                    line: *line,
                    column: *column,
                },
                message.clone(),
            )
            .at_path(origin),
            Self::Shape { origin, message } => {
                Diagnostic::warning(DiagnosticKind::Shape, message.clone()).at_path(origin)
            }
            Self::Validation {
                origin,
                slug,
                source,
            } => with_slug(
                Diagnostic::warning(DiagnosticKind::Validation, source.to_string()).at_path(origin),
                slug.as_deref(),
            ),
            Self::Schema {
                origin,
                slug,
                message,
            } => with_slug(
                Diagnostic::warning(DiagnosticKind::Validation, message.clone()).at_path(origin),
                slug.as_deref(),
            ),
            Self::Encode(e) => Diagnostic::warning(DiagnosticKind::Shape, e.to_string()),
        }
    }
}

fn with_slug(diag: Diagnostic, slug: Option<&str>) -> Diagnostic {
    match slug {
        Some(s) => diag.for_slug(s),
        None => diag,
    }
}
