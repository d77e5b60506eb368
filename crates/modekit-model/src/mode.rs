//! Mode records and their storage provenance

use crate::error::ModelError;
use crate::group::{GroupEntry, ToolGroup};
use crate::slug::Slug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Storage root a record was loaded from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeScope {
    /// Installation-wide settings directory
    Global,
    /// Repository-local root
    Project,
}

impl ModeScope {
    /// Wire name
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Project => "project",
        }
    }
}

impl Display for ModeScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModeScope {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "global" => Ok(Self::Global),
            "project" => Ok(Self::Project),
            other => Err(ModelError::UnknownScope(other.to_string())),
        }
    }
}

/// On-disk shape a record was loaded from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeFormat {
    /// Single aggregate file holding every record of a scope
    Legacy,
    /// One document per record inside a directory
    Split,
}

impl ModeFormat {
    /// Wire name
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Split => "split",
        }
    }
}

impl Display for ModeFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModeFormat {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "legacy" => Ok(Self::Legacy),
            "split" => Ok(Self::Split),
            other => Err(ModelError::UnknownFormat(other.to_string())),
        }
    }
}

/// Identity of one (scope, format) store
///
/// Ordering follows resolution precedence: the smallest id wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreId {
    /// Storage root
    pub scope: ModeScope,
    /// On-disk shape
    pub format: ModeFormat,
}

impl StoreId {
    /// All four stores, highest precedence first
    pub const BY_PRECEDENCE: [StoreId; 4] = [
        StoreId::new(ModeScope::Project, ModeFormat::Split),
        StoreId::new(ModeScope::Project, ModeFormat::Legacy),
        StoreId::new(ModeScope::Global, ModeFormat::Split),
        StoreId::new(ModeScope::Global, ModeFormat::Legacy),
    ];

    /// Create store id
    #[inline]
    #[must_use]
    pub const fn new(scope: ModeScope, format: ModeFormat) -> Self {
        Self { scope, format }
    }

    /// Position in [`StoreId::BY_PRECEDENCE`]; lower wins
    #[inline]
    #[must_use]
    pub const fn precedence_rank(self) -> u8 {
        match (self.scope, self.format) {
            (ModeScope::Project, ModeFormat::Split) => 0,
            (ModeScope::Project, ModeFormat::Legacy) => 1,
            (ModeScope::Global, ModeFormat::Split) => 2,
            (ModeScope::Global, ModeFormat::Legacy) => 3,
        }
    }
}

impl PartialOrd for StoreId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StoreId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.precedence_rank().cmp(&other.precedence_rank())
    }
}

impl Display for StoreId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.scope, self.format)
    }
}

/// A named mode definition
///
/// `scope` and `format` record where the record was loaded from and decide
/// the single location it is written back to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeConfig {
    /// Stable identifier
    pub slug: Slug,
    /// Display name
    pub name: String,
    /// Role the assistant takes on in this mode
    pub role_definition: String,
    /// Short hint for when to pick this mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when_to_use: Option<String>,
    /// One-line summary shown in pickers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Extra instructions appended to the system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_instructions: Option<String>,
    /// Capability-group grants
    #[serde(default)]
    pub groups: Vec<GroupEntry>,
    /// Storage root provenance
    pub scope: ModeScope,
    /// On-disk shape provenance
    pub format: ModeFormat,
}

impl ModeConfig {
    /// Create a record with the required fields
    ///
    /// Provenance defaults to project + split, the location new records are
    /// written to unless a caller says otherwise.
    #[must_use]
    pub fn new(slug: Slug, name: impl Into<String>, role_definition: impl Into<String>) -> Self {
        Self {
            slug,
            name: name.into(),
            role_definition: role_definition.into(),
            when_to_use: None,
            description: None,
            custom_instructions: None,
            groups: Vec::new(),
            scope: ModeScope::Project,
            format: ModeFormat::Split,
        }
    }

    /// With provenance
    #[inline]
    #[must_use]
    pub fn with_origin(mut self, scope: ModeScope, format: ModeFormat) -> Self {
        self.scope = scope;
        self.format = format;
        self
    }

    /// With custom instructions
    #[inline]
    #[must_use]
    pub fn with_custom_instructions(mut self, text: impl Into<String>) -> Self {
        self.custom_instructions = Some(text.into());
        self
    }

    /// With when-to-use hint
    #[inline]
    #[must_use]
    pub fn with_when_to_use(mut self, text: impl Into<String>) -> Self {
        self.when_to_use = Some(text.into());
        self
    }

    /// With description
    #[inline]
    #[must_use]
    pub fn with_description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    /// With an additional group grant
    #[inline]
    #[must_use]
    pub fn with_group(mut self, entry: impl Into<GroupEntry>) -> Self {
        self.groups.push(entry.into());
        self
    }

    /// Store this record belongs to
    #[inline]
    #[must_use]
    pub fn store_id(&self) -> StoreId {
        StoreId::new(self.scope, self.format)
    }

    /// Whether the record grants `group`
    #[must_use]
    pub fn grants(&self, group: ToolGroup) -> bool {
        self.groups.iter().any(|g| g.group == group)
    }

    /// Compare logical content, ignoring provenance and option spelling
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        fn norm(text: &Option<String>) -> Option<&str> {
            text.as_deref().filter(|s| !s.is_empty())
        }

        self.slug == other.slug
            && self.name == other.name
            && self.role_definition == other.role_definition
            && norm(&self.when_to_use) == norm(&other.when_to_use)
            && norm(&self.description) == norm(&other.description)
            && norm(&self.custom_instructions) == norm(&other.custom_instructions)
            && self.groups.len() == other.groups.len()
            && self
                .groups
                .iter()
                .zip(&other.groups)
                .all(|(a, b)| a.group == b.group && a.options() == b.options())
    }

    /// Validate the record against the mode schema
    ///
    /// # Errors
    /// - [`ModelError::EmptyField`] for a blank `name` or `roleDefinition`
    /// - [`ModelError::DuplicateGroup`] if a group is granted twice
    /// - [`ModelError::InvalidFileRegex`] if a `fileRegex` does not compile
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.name.trim().is_empty() {
            return Err(ModelError::EmptyField("name"));
        }
        if self.role_definition.trim().is_empty() {
            return Err(ModelError::EmptyField("roleDefinition"));
        }

        let mut seen = HashSet::with_capacity(self.groups.len());
        for entry in &self.groups {
            if !seen.insert(entry.group) {
                return Err(ModelError::DuplicateGroup(entry.group));
            }
            if let Some(pattern) = entry.options().and_then(|o| o.file_regex.as_deref()) {
                regex::Regex::new(pattern).map_err(|e| ModelError::InvalidFileRegex {
                    group: entry.group,
                    pattern: pattern.to_string(),
                    reason: e.to_string(),
                })?;
            }
        }

        Ok(())
    }
}
