//! Modekit Codecs
//!
//! Conversion between on-disk mode documents and typed [`ModeConfig`]
//! records.
//!
//! # Formats
//!
//! - **Legacy** ([`LegacyCodec`]): one aggregate file per scope with a
//!   `customModes` array; each element carries its own `slug`
//! - **Split** ([`SplitCodec`]): one document per record; the slug is the
//!   file stem
//!
//! Decoding never fails as a whole. Each bad record is dropped and reported
//! as a [`Diagnostic`]; its siblings still load.
//!
//! # Example
//!
//! ```rust,ignore
//! use modekit_codec::{LegacyCodec, ModeCodec, SourceFile};
//! use modekit_model::ModeScope;
//!
//! let decoded = LegacyCodec::new().decode(&SourceFile::new(path, &text), ModeScope::Project);
//! for diag in &decoded.diagnostics {
//!     tracing::warn!("{diag}");
//! }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

// Core modules
pub mod error;
mod groups;
pub mod legacy;
pub mod split;

// Re-exports for convenience
pub use error::CodecError;
pub use legacy::{LegacyCodec, LEGACY_KEY};
pub use split::{SplitCodec, DEFAULT_SCHEMA_URL, SPLIT_EXTENSION, SPLIT_EXTENSION_ALIAS};

use modekit_model::{Diagnostic, DiagnosticKind, ModeConfig, ModeFormat, ModeScope};
use std::path::Path;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// A file's identity and text, as handed to a codec
#[derive(Debug, Clone, Copy)]
pub struct SourceFile<'a> {
    /// Where the text came from
    pub path: &'a Path,
    /// File contents
    pub text: &'a str,
}

impl<'a> SourceFile<'a> {
    /// Create source file view
    #[inline]
    #[must_use]
    pub fn new(path: &'a Path, text: &'a str) -> Self {
        Self { path, text }
    }
}

/// Records that survived decoding, plus what was dropped and why
#[derive(Debug, Clone, Default)]
pub struct Decoded {
    /// Valid records, in document order
    pub modes: Vec<ModeConfig>,
    /// Problems found while decoding
    pub diagnostics: Vec<Diagnostic>,
}

impl Decoded {
    /// Keep a valid record; a repeated slug replaces the earlier one
    pub fn accept(&mut self, origin: &Path, mode: ModeConfig) {
        match self.modes.iter().position(|m| m.slug == mode.slug) {
            Some(idx) => {
                tracing::warn!(slug = %mode.slug, path = %origin.display(), "duplicate slug, later definition wins");
                self.diagnostics.push(
                    Diagnostic::warning(
                        DiagnosticKind::DuplicateSlug,
                        "slug defined more than once; the later definition wins",
                    )
                    .at_path(origin)
                    .for_slug(mode.slug.as_str()),
                );
                self.modes[idx] = mode;
            }
            None => self.modes.push(mode),
        }
    }

    /// Record a dropped record or file
    pub fn reject(&mut self, err: CodecError) {
        tracing::warn!("dropping mode definition: {err}");
        self.diagnostics.push(err.to_diagnostic());
    }

    /// Merge another decode result into this one
    pub fn extend(&mut self, other: Decoded, origin: &Path) {
        self.diagnostics.extend(other.diagnostics);
        for mode in other.modes {
            self.accept(origin, mode);
        }
    }
}

/// A decoder for one on-disk format
///
/// Implementations validate every decoded record and tag it with the given
/// scope and their own format.
pub trait ModeCodec: Send + Sync + 'static {
    /// Format this codec reads and writes
    fn format(&self) -> ModeFormat;

    /// Decode every valid record from `source`
    fn decode(&self, source: &SourceFile<'_>, scope: ModeScope) -> Decoded;
}

/// Drop a leading UTF-8 byte-order mark
#[inline]
#[must_use]
pub fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}
