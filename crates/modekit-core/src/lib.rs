//! Modekit Core
//!
//! Resolves user-editable mode records from four stores, caches the merged
//! view, serializes every mutation and keeps the cache coherent with
//! filesystem changes.
//!
//! # Pipeline
//!
//! ```text
//! read:  ModeRegistry -> ViewCache --(miss)--> MergeResolver -> 4 x ModeStore
//! write: ModeRegistry -> WriteSerializer -> ModeStore
//!                          |-> SuppressionLocks (engage before I/O)
//!                          '-> ViewCache::invalidate + Notifier
//! watch: FsWatcher -> ChangeBridge -> (unless suppressed) invalidate + notify
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use modekit_core::{ModeRegistry, RegistryConfig};
//! use modekit_model::{ModeConfig, ModeScope, ModeFormat, Slug, ToolGroup};
//!
//! let registry = ModeRegistry::new(RegistryConfig::new(global).with_project_root(repo));
//! let slug = Slug::new("reviewer")?;
//! let mode = ModeConfig::new(slug.clone(), "Reviewer", "You review diffs.")
//!     .with_origin(ModeScope::Project, ModeFormat::Split)
//!     .with_group(ToolGroup::Read);
//! registry.upsert(&slug, mode).await?;
//! assert!(registry.get(&slug).await.is_some());
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

// Core modules
pub mod bridge;
pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod locks;
pub mod migration;
pub mod registry;
pub mod resolver;
pub mod serializer;
pub mod watcher;

// Re-exports for convenience
pub use bridge::{BridgeOutcome, ChangeBridge, FileEvent, FileEventKind};
pub use cache::ViewCache;
pub use config::RegistryConfig;
pub use error::{ErrorKind, RegistryError, Result};
pub use events::{Notifier, RefreshCallback, RefreshCause, RegistryEvent};
pub use locks::{Clock, ManualClock, SuppressionLocks, SystemClock};
pub use migration::{LegacyMigration, MigrationOutcome, MigrationReport};
pub use registry::{ImportReport, ModeRegistry, WatchHandle};
pub use resolver::{merge, MergeResolver, MergedView};
pub use serializer::{WriteContext, WriteOutcome, WriteSerializer};
pub use watcher::FsWatcher;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
