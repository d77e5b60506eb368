//! Modekit Stores
//!
//! The four places a mode record can live, behind one [`ModeStore`] trait:
//!
//! | store            | location                        |
//! |------------------|---------------------------------|
//! | project + split  | `<project>/.roo/modes/<slug>.yaml` |
//! | project + legacy | `<project>/.roomodes`           |
//! | global + split   | `<global>/modes/<slug>.yaml`    |
//! | global + legacy  | `<global>/custom_modes.yaml`    |
//!
//! Reads never fail: a store that cannot be read contributes nothing and
//! reports why through [`Enumeration::diagnostics`]. Writes return a
//! [`StoreError`] classified by [`AccessKind`](modekit_model::AccessKind).
//!
//! # Example
//!
//! ```rust,ignore
//! use modekit_store::{StoreLayout, StoreSet};
//! use modekit_codec::SplitCodec;
//!
//! let layout = StoreLayout::new(global_dir).with_project_root(repo);
//! let stores = StoreSet::from_layout(&layout, &SplitCodec::new(), false);
//! for store in stores.iter() {
//!     let listing = store.enumerate().await;
//!     println!("{}: {} modes", store.id(), listing.modes.len());
//! }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

// Core modules
pub mod error;
pub mod fsutil;
pub mod layout;
pub mod legacy;
pub mod set;
pub mod split;
pub mod store;

// Re-exports for convenience
pub use error::StoreError;
pub use fsutil::write_atomic;
pub use layout::{
    StoreLayout, GLOBAL_LEGACY_FILE, GLOBAL_SPLIT_DIR, PROJECT_LEGACY_FILE, PROJECT_SPLIT_DIR,
};
pub use legacy::LegacyFileStore;
pub use set::{SharedStore, StoreSet};
pub use split::SplitDirStore;
pub use store::{Enumeration, ModeStore, PathClaim, WatchTarget};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
