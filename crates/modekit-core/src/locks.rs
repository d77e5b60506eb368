//! Self-suppression locks
//!
//! A write engages a lock on its slug before touching the filesystem and
//! releases it when done. The lock then lingers for a grace period so the
//! change notification caused by our own write is recognised and dropped.
//! Every lock expires on its own after the maximum hold, released or not.

use dashmap::DashMap;
use modekit_model::Slug;
use parking_lot::Mutex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

/// Time source for lock expiry
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current instant
    fn now(&self) -> Instant;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    /// Create clock frozen at the current instant
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move time forward
    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }
}

#[derive(Debug)]
struct LockEntry {
    holds: usize,
    expires_at: Instant,
    targets: Vec<PathBuf>,
}

/// Per-slug suppression flags with bounded lifetime
#[derive(Debug)]
pub struct SuppressionLocks {
    entries: DashMap<Slug, LockEntry>,
    clock: Arc<dyn Clock>,
    grace: Duration,
    max_hold: Duration,
}

impl SuppressionLocks {
    /// Create locks on the wall clock
    #[must_use]
    pub fn new(grace: Duration, max_hold: Duration) -> Self {
        Self::with_clock(grace, max_hold, Arc::new(SystemClock))
    }

    /// Create locks on a custom clock
    #[must_use]
    pub fn with_clock(grace: Duration, max_hold: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            grace,
            max_hold: max_hold.max(grace),
        }
    }

    /// Grace period applied on release
    #[inline]
    #[must_use]
    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Suppress events for `slug` (and for `target`) until released
    pub fn engage(&self, slug: &Slug, target: &Path) {
        self.sweep();
        let expires_at = self.clock.now() + self.max_hold;
        let mut entry = self.entries.entry(slug.clone()).or_insert_with(|| LockEntry {
            holds: 0,
            expires_at,
            targets: Vec::new(),
        });
        entry.holds += 1;
        entry.expires_at = expires_at;
        if !entry.targets.iter().any(|t| t == target) {
            entry.targets.push(target.to_path_buf());
        }
        trace!(slug = %slug, target = %target.display(), "suppression engaged");
    }

    /// Add another file a pending write of `slug` will touch
    pub fn add_target(&self, slug: &Slug, target: &Path) {
        if let Some(mut entry) = self.entries.get_mut(slug) {
            if !entry.targets.iter().any(|t| t == target) {
                entry.targets.push(target.to_path_buf());
            }
        }
    }

    /// End one hold on `slug`; suppression lingers for the grace period
    pub fn release(&self, slug: &Slug) {
        if let Some(mut entry) = self.entries.get_mut(slug) {
            entry.holds = entry.holds.saturating_sub(1);
            if entry.holds == 0 {
                let lingering = self.clock.now() + self.grace;
                entry.expires_at = entry.expires_at.min(lingering);
            }
            trace!(slug = %slug, holds = entry.holds, "suppression released");
        }
    }

    /// Whether events for `slug` should currently be ignored
    #[must_use]
    pub fn is_suppressed(&self, slug: &Slug) -> bool {
        let now = self.clock.now();
        self.entries
            .get(slug)
            .is_some_and(|entry| now < entry.expires_at)
    }

    /// Whether an active lock targets `path`
    #[must_use]
    pub fn suppresses_path(&self, path: &Path) -> bool {
        let now = self.clock.now();
        self.entries
            .iter()
            .any(|entry| now < entry.expires_at && entry.targets.iter().any(|t| t == path))
    }

    /// Whether an active lock targets `dir` or anything beneath it
    #[must_use]
    pub fn suppresses_within(&self, dir: &Path) -> bool {
        let now = self.clock.now();
        self.entries
            .iter()
            .any(|entry| now < entry.expires_at && entry.targets.iter().any(|t| t.starts_with(dir)))
    }

    /// Number of unexpired locks
    #[must_use]
    pub fn active(&self) -> usize {
        let now = self.clock.now();
        self.entries.iter().filter(|e| now < e.expires_at).count()
    }

    /// Forget expired locks
    pub fn sweep(&self) {
        let now = self.clock.now();
        self.entries.retain(|_, entry| now < entry.expires_at);
    }
}
