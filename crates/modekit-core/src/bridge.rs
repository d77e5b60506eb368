//! Change-notification bridge
//!
//! Turns file events from the host (or from [`FsWatcher`](crate::FsWatcher))
//! into cache invalidations and refresh notifications, dropping the events
//! our own writes produce.

use crate::cache::ViewCache;
use crate::events::{Notifier, RefreshCause};
use crate::locks::SuppressionLocks;
use modekit_model::Slug;
use modekit_store::{PathClaim, StoreSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Kind of filesystem change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileEventKind {
    /// File or directory appeared
    Created,
    /// Contents changed
    Changed,
    /// File or directory disappeared
    Removed,
}

/// One filesystem change reported by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    /// What happened
    pub kind: FileEventKind,
    /// Where it happened
    pub path: PathBuf,
}

impl FileEvent {
    /// Create event
    #[inline]
    #[must_use]
    pub fn new(kind: FileEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// What the bridge did with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeOutcome {
    /// No store owns the path
    Ignored,
    /// Caused by one of our own writes
    Suppressed,
    /// Cache dropped and dependents notified
    Invalidated,
}

/// Routes file events to cache invalidation
#[derive(Debug, Clone)]
pub struct ChangeBridge {
    stores: StoreSet,
    cache: Arc<ViewCache>,
    locks: Arc<SuppressionLocks>,
    notifier: Arc<Notifier>,
}

impl ChangeBridge {
    /// Create bridge
    #[must_use]
    pub fn new(
        stores: StoreSet,
        cache: Arc<ViewCache>,
        locks: Arc<SuppressionLocks>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            stores,
            cache,
            locks,
            notifier,
        }
    }

    /// Decide what an event means without acting on it
    #[must_use]
    pub fn classify(&self, event: &FileEvent) -> BridgeOutcome {
        let claims = self.stores.claim(&event.path);
        if claims.is_empty() {
            trace!(path = %event.path.display(), "event outside every store");
            return BridgeOutcome::Ignored;
        }
        let suppressed = claims
            .iter()
            .all(|(_, claim)| self.claim_suppressed(claim, &event.path));
        if suppressed {
            BridgeOutcome::Suppressed
        } else {
            BridgeOutcome::Invalidated
        }
    }

    fn claim_suppressed(&self, claim: &PathClaim, path: &Path) -> bool {
        match claim {
            PathClaim::Record(slug) => {
                Slug::new(slug.as_str()).is_ok_and(|slug| self.locks.is_suppressed(&slug))
                    || self.locks.suppresses_path(path)
            }
            PathClaim::Aggregate => self.locks.suppresses_path(path),
            PathClaim::Root => self.locks.suppresses_within(path),
        }
    }

    /// Handle one event: invalidate and notify unless it is ignorable
    pub fn handle(&self, event: &FileEvent) -> BridgeOutcome {
        let outcome = self.classify(event);
        match outcome {
            BridgeOutcome::Invalidated => {
                debug!(kind = ?event.kind, path = %event.path.display(), "external mode change");
                self.cache.invalidate();
                self.notifier.refreshed(RefreshCause::ExternalChange {
                    path: event.path.clone(),
                });
            }
            BridgeOutcome::Suppressed => {
                debug!(path = %event.path.display(), "suppressed self-caused event");
            }
            BridgeOutcome::Ignored => {}
        }
        outcome
    }

    /// Consume events until the channel closes
    ///
    /// Events already queued together are coalesced into at most one
    /// refresh.
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<FileEvent>) {
        while let Some(first) = events.recv().await {
            let mut trigger = None;
            let mut next = Some(first);
            while let Some(event) = next {
                if trigger.is_none() && self.classify(&event) == BridgeOutcome::Invalidated {
                    trigger = Some(event);
                }
                next = events.try_recv().ok();
            }
            if let Some(event) = trigger {
                self.handle(&event);
            }
        }
        debug!("change bridge stopped");
    }

    /// Run on a background task; returns the sender to feed events into
    #[must_use]
    pub fn spawn(self) -> (mpsc::UnboundedSender<FileEvent>, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(self.run(rx));
        (tx, handle)
    }
}
