//! Error types for the mode model

use crate::group::ToolGroup;

/// Errors raised while constructing or validating mode records
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// Slug outside `^[A-Za-z0-9-]+$`
    #[error("invalid slug '{0}': only letters, digits and hyphens are allowed")]
    InvalidSlug(String),

    /// Required text field is empty
    #[error("required field '{0}' is empty")]
    EmptyField(&'static str),

    /// Group name not in the known set
    #[error("unknown group '{0}'")]
    UnknownGroup(String),

    /// Same group granted twice in one record
    #[error("group '{0}' is granted more than once")]
    DuplicateGroup(ToolGroup),

    /// `fileRegex` does not compile
    #[error("invalid fileRegex for group '{group}': {pattern}: {reason}")]
    InvalidFileRegex {
        group: ToolGroup,
        pattern: String,
        reason: String,
    },

    /// Unrecognised scope name
    #[error("unknown scope '{0}' (expected 'global' or 'project')")]
    UnknownScope(String),

    /// Unrecognised format name
    #[error("unknown format '{0}' (expected 'legacy' or 'split')")]
    UnknownFormat(String),
}
