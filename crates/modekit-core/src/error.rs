//! Error types for the mode registry
//!
//! Every failure a caller can see maps to an [`ErrorKind`] so user-facing
//! messages can be specific about what went wrong and where.

use modekit_codec::CodecError;
use modekit_model::{AccessKind, ModeScope, ModelError, StoreId};
use modekit_store::StoreError;

/// Main registry error type
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A store rejected the operation
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The record failed validation
    #[error("invalid mode: {0}")]
    InvalidMode(#[from] ModelError),

    /// Text could not be decoded or a record could not be encoded
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Slug argument differs from the record's slug
    #[error("slug '{requested}' does not match record slug '{record}'")]
    SlugMismatch {
        /// Slug the caller asked for
        requested: String,
        /// Slug carried by the record
        record: String,
    },

    /// Target store is not configured (e.g. no project is open)
    #[error("{0} store is not available")]
    StoreUnavailable(StoreId),

    /// No record with this slug exists
    #[error("no mode named '{0}'")]
    UnknownMode(String),

    /// The write queue is gone
    #[error("write queue is shut down")]
    QueueClosed,

    /// A queued write stopped before completing
    #[error("write '{0}' aborted")]
    WriteAborted(String),

    /// Migration could not complete
    #[error("migration of {scope} modes failed: {message}")]
    Migration {
        /// Scope being migrated
        scope: ModeScope,
        /// What went wrong
        message: String,
    },

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(String),

    /// Watcher could not be started
    #[error("watcher error: {0}")]
    Watch(String),
}

/// Classification of a [`RegistryError`] for presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Filesystem access problem, by class
    Access(AccessKind),
    /// The record or input is invalid
    InvalidInput,
    /// An existing file is malformed and was left untouched
    MalformedFile,
    /// The named mode does not exist
    NotFound,
    /// The target store or service is not available
    Unavailable,
    /// Migration failed; legacy files remain authoritative
    Migration,
    /// Configuration problem
    Config,
}

impl RegistryError {
    /// Classify the error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Store(StoreError::Access { kind, .. }) => ErrorKind::Access(*kind),
            Self::Store(StoreError::Codec { source, .. }) => match source {
                CodecError::Encode(_) => ErrorKind::InvalidInput,
                _ => ErrorKind::MalformedFile,
            },
            Self::Store(StoreError::WrongStore { .. })
            | Self::InvalidMode(_)
            | Self::Codec(_)
            | Self::SlugMismatch { .. } => ErrorKind::InvalidInput,
            Self::UnknownMode(_) => ErrorKind::NotFound,
            Self::StoreUnavailable(_)
            | Self::QueueClosed
            | Self::WriteAborted(_)
            | Self::Watch(_) => ErrorKind::Unavailable,
            Self::Migration { .. } => ErrorKind::Migration,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Create migration error
    #[inline]
    #[must_use]
    pub fn migration(scope: ModeScope, message: impl Into<String>) -> Self {
        Self::Migration {
            scope,
            message: message.into(),
        }
    }
}

/// Result alias
pub type Result<T, E = RegistryError> = std::result::Result<T, E>;
