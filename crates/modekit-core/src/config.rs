//! Registry configuration
//!
//! Loaded from TOML (or JSON) or built in code:
//!
//! ```toml
//! global_root = "/home/me/.config/modekit"
//! project_root = "/work/repo"
//! cache_ttl_ms = 10000
//! suppression_grace_ms = 1000
//! recursive_split_dirs = false
//! schema_url = "https://example.com/custom-mode.schema.json"
//! ```
//!
//! `schema_url` defaults to [`DEFAULT_SCHEMA_URL`]; an empty string (or JSON
//! `null`) turns the annotation off.

use crate::error::RegistryError;
use modekit_codec::{SplitCodec, DEFAULT_SCHEMA_URL};
use modekit_model::ModeFormat;
use modekit_store::StoreLayout;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for [`ModeRegistry`](crate::ModeRegistry)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Installation-wide settings directory
    pub global_root: PathBuf,
    /// Repository root; project stores are disabled without one
    pub project_root: Option<PathBuf>,
    /// Merged view lifetime in milliseconds
    pub cache_ttl_ms: u64,
    /// How long a slug stays suppressed after its write completes
    pub suppression_grace_ms: u64,
    /// Upper bound on any single suppression
    pub suppression_max_hold_ms: u64,
    /// Enumerate nested directories under split roots
    pub recursive_split_dirs: bool,
    /// Schema annotation emitted at the top of split documents
    pub schema_url: Option<String>,
    /// Format given to records imported from a legacy document
    pub default_format: ModeFormat,
}

impl RegistryConfig {
    /// Create configuration rooted at `global_root`
    #[inline]
    #[must_use]
    pub fn new(global_root: impl Into<PathBuf>) -> Self {
        Self {
            global_root: global_root.into(),
            ..Self::default()
        }
    }

    /// With project root
    #[inline]
    #[must_use]
    pub fn with_project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = Some(root.into());
        self
    }

    /// With cache lifetime
    #[inline]
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl_ms = duration_ms(ttl);
        self
    }

    /// With suppression grace delay
    #[inline]
    #[must_use]
    pub fn with_suppression_grace(mut self, grace: Duration) -> Self {
        self.suppression_grace_ms = duration_ms(grace);
        self
    }

    /// With suppression upper bound
    #[inline]
    #[must_use]
    pub fn with_suppression_max_hold(mut self, hold: Duration) -> Self {
        self.suppression_max_hold_ms = duration_ms(hold);
        self
    }

    /// With nested split directory enumeration
    #[inline]
    #[must_use]
    pub fn with_recursive_split_dirs(mut self, recursive: bool) -> Self {
        self.recursive_split_dirs = recursive;
        self
    }

    /// With schema annotation
    #[inline]
    #[must_use]
    pub fn with_schema_url(mut self, url: impl Into<String>) -> Self {
        self.schema_url = Some(url.into());
        self
    }

    /// With import format
    #[inline]
    #[must_use]
    pub fn with_default_format(mut self, format: ModeFormat) -> Self {
        self.default_format = format;
        self
    }

    /// Cache lifetime
    #[inline]
    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    /// Suppression grace delay
    #[inline]
    #[must_use]
    pub fn suppression_grace(&self) -> Duration {
        Duration::from_millis(self.suppression_grace_ms)
    }

    /// Suppression upper bound
    #[inline]
    #[must_use]
    pub fn suppression_max_hold(&self) -> Duration {
        Duration::from_millis(self.suppression_max_hold_ms)
    }

    /// Store roots
    #[must_use]
    pub fn layout(&self) -> StoreLayout {
        let layout = StoreLayout::new(&self.global_root);
        match &self.project_root {
            Some(root) => layout.with_project_root(root),
            None => layout,
        }
    }

    /// Split codec carrying the configured annotation
    #[must_use]
    pub fn split_codec(&self) -> SplitCodec {
        match self.schema_url.as_deref() {
            Some(url) if !url.is_empty() => SplitCodec::new().with_schema_url(url),
            _ => SplitCodec::new().without_schema_url(),
        }
    }

    /// Parse TOML configuration
    ///
    /// # Errors
    /// Returns [`RegistryError::Config`] on syntax or type errors.
    pub fn from_toml_str(text: &str) -> Result<Self, RegistryError> {
        toml::from_str(text).map_err(|e| RegistryError::Config(e.to_string()))
    }

    /// Parse JSON configuration
    ///
    /// # Errors
    /// Returns [`RegistryError::Config`] on syntax or type errors.
    pub fn from_json_str(text: &str) -> Result<Self, RegistryError> {
        serde_json::from_str(text).map_err(|e| RegistryError::Config(e.to_string()))
    }

    /// Load configuration from a `.toml` or `.json` file
    ///
    /// # Errors
    /// Returns [`RegistryError::Config`] if the file cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self, RegistryError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| RegistryError::Config(format!("{}: {e}", path.display())))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text),
            _ => Self::from_toml_str(&text),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            global_root: PathBuf::from(".modekit"),
            project_root: None,
            cache_ttl_ms: 10_000,
            suppression_grace_ms: 1_000,
            suppression_max_hold_ms: 30_000,
            recursive_split_dirs: false,
            schema_url: Some(DEFAULT_SCHEMA_URL.to_string()),
            default_format: ModeFormat::Split,
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
