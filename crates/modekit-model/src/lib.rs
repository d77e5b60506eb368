//! Modekit Model
//!
//! Typed mode records with storage provenance and schema validation.
//!
//! # Core Concepts
//!
//! - [`ModeConfig`]: A named mode definition (role, instructions, groups)
//! - [`Slug`]: Stable identifier restricted to `[A-Za-z0-9-]`
//! - [`GroupEntry`]: A capability-group grant, optionally with [`GroupOptions`]
//! - [`StoreId`]: The (scope, format) pair a record was loaded from, ordered
//!   by resolution precedence
//! - [`Diagnostic`]: A non-fatal loading problem (parse, validation, access)
//!
//! # Example
//!
//! ```rust
//! use modekit_model::{ModeConfig, Slug, ToolGroup};
//!
//! let mode = ModeConfig::new(Slug::new("architect").unwrap(), "Architect", "You plan.")
//!     .with_group(ToolGroup::Read);
//! assert!(mode.validate().is_ok());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
mod diagnostic;
mod error;
mod group;
mod mode;
mod slug;

// Re-exports
pub use diagnostic::{AccessKind, Diagnostic, DiagnosticKind, Severity};
pub use error::ModelError;
pub use group::{GroupEntry, GroupOptions, ToolGroup};
pub use mode::{ModeConfig, ModeFormat, ModeScope, StoreId};
pub use slug::Slug;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
