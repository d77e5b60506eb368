//! Capability-group grants
//!
//! A mode grants itself a set of tool groups. Each grant is either a bare
//! group name or a group name paired with [`GroupOptions`].

use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Capability group a mode may be granted
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolGroup {
    /// Read files
    Read,
    /// Edit files (optionally filtered by `fileRegex`)
    Edit,
    /// Drive a browser
    Browser,
    /// Run commands
    Command,
    /// Use MCP servers
    Mcp,
    /// Switch or create modes
    Modes,
}

impl ToolGroup {
    /// Every known group, in canonical order
    pub const ALL: [ToolGroup; 6] = [
        Self::Read,
        Self::Edit,
        Self::Browser,
        Self::Command,
        Self::Mcp,
        Self::Modes,
    ];

    /// Wire name of the group
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Edit => "edit",
            Self::Browser => "browser",
            Self::Command => "command",
            Self::Mcp => "mcp",
            Self::Modes => "modes",
        }
    }
}

impl Display for ToolGroup {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolGroup {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|g| g.as_str() == s)
            .ok_or_else(|| ModelError::UnknownGroup(s.to_string()))
    }
}

/// Options attached to a group grant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupOptions {
    /// Restrict the grant to paths matching this regular expression
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_regex: Option<String>,
    /// Human-readable description of the restriction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl GroupOptions {
    /// Options carrying only a file filter
    #[inline]
    #[must_use]
    pub fn file_regex(pattern: impl Into<String>) -> Self {
        Self {
            file_regex: Some(pattern.into()),
            description: None,
        }
    }

    /// With description
    #[inline]
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// True when neither field is set
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.file_regex.is_none() && self.description.is_none()
    }
}

/// One group grant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupEntry {
    /// Granted group
    pub group: ToolGroup,
    /// Optional restriction; `None` and empty options are equivalent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<GroupOptions>,
}

impl GroupEntry {
    /// Bare grant
    #[inline]
    #[must_use]
    pub fn bare(group: ToolGroup) -> Self {
        Self {
            group,
            options: None,
        }
    }

    /// Grant with options; empty options collapse to a bare grant
    #[inline]
    #[must_use]
    pub fn with_options(group: ToolGroup, options: GroupOptions) -> Self {
        Self {
            group,
            options: (!options.is_empty()).then_some(options),
        }
    }

    /// Options, treating an empty value as absent
    #[inline]
    #[must_use]
    pub fn options(&self) -> Option<&GroupOptions> {
        self.options.as_ref().filter(|o| !o.is_empty())
    }
}

impl From<ToolGroup> for GroupEntry {
    fn from(group: ToolGroup) -> Self {
        Self::bare(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_group_round_trips_through_str() {
        for group in ToolGroup::ALL {
            assert_eq!(group.as_str().parse::<ToolGroup>().unwrap(), group);
        }
    }

    #[test]
    fn unknown_group_is_rejected() {
        assert!(matches!(
            "teleport".parse::<ToolGroup>(),
            Err(ModelError::UnknownGroup(name)) if name == "teleport"
        ));
    }

    #[test]
    fn empty_options_collapse_to_bare() {
        let entry = GroupEntry::with_options(ToolGroup::Edit, GroupOptions::default());
        assert_eq!(entry, GroupEntry::bare(ToolGroup::Edit));
        assert!(entry.options().is_none());
    }

    #[test]
    fn options_builder() {
        let options = GroupOptions::file_regex(r"\.md$").with_description("Markdown only");
        assert_eq!(options.file_regex.as_deref(), Some(r"\.md$"));
        assert_eq!(options.description.as_deref(), Some("Markdown only"));
        assert!(!options.is_empty());
    }
}
