//! On-disk layout of the four stores
//!
//! ```text
//! <global-root>/modes/<slug>.yaml        global + split
//! <global-root>/custom_modes.yaml        global + legacy
//! <project-root>/.roo/modes/<slug>.yaml  project + split
//! <project-root>/.roomodes               project + legacy
//! ```

use modekit_model::{ModeFormat, ModeScope, StoreId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Split directory under the global root
pub const GLOBAL_SPLIT_DIR: &str = "modes";

/// Legacy aggregate file under the global root
pub const GLOBAL_LEGACY_FILE: &str = "custom_modes.yaml";

/// Split directory under the project root
pub const PROJECT_SPLIT_DIR: &str = ".roo/modes";

/// Legacy aggregate file under the project root
pub const PROJECT_LEGACY_FILE: &str = ".roomodes";

/// Roots the stores are derived from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreLayout {
    /// Installation-wide settings directory
    pub global_root: PathBuf,
    /// Repository root, when a project is open
    #[serde(default)]
    pub project_root: Option<PathBuf>,
}

impl StoreLayout {
    /// Layout with only a global root
    #[inline]
    #[must_use]
    pub fn new(global_root: impl Into<PathBuf>) -> Self {
        Self {
            global_root: global_root.into(),
            project_root: None,
        }
    }

    /// With project root
    #[inline]
    #[must_use]
    pub fn with_project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = Some(root.into());
        self
    }

    /// Root directory for `scope`, if configured
    #[must_use]
    pub fn root(&self, scope: ModeScope) -> Option<&Path> {
        match scope {
            ModeScope::Global => Some(&self.global_root),
            ModeScope::Project => self.project_root.as_deref(),
        }
    }

    /// Split directory for `scope`
    #[must_use]
    pub fn split_dir(&self, scope: ModeScope) -> Option<PathBuf> {
        let dir = match scope {
            ModeScope::Global => GLOBAL_SPLIT_DIR,
            ModeScope::Project => PROJECT_SPLIT_DIR,
        };
        self.root(scope).map(|root| root.join(dir))
    }

    /// Legacy aggregate file for `scope`
    #[must_use]
    pub fn legacy_file(&self, scope: ModeScope) -> Option<PathBuf> {
        let file = match scope {
            ModeScope::Global => GLOBAL_LEGACY_FILE,
            ModeScope::Project => PROJECT_LEGACY_FILE,
        };
        self.root(scope).map(|root| root.join(file))
    }

    /// Physical location backing `id`: a directory for split, a file for legacy
    #[must_use]
    pub fn location(&self, id: StoreId) -> Option<PathBuf> {
        match id.format {
            ModeFormat::Split => self.split_dir(id.scope),
            ModeFormat::Legacy => self.legacy_file(id.scope),
        }
    }
}
