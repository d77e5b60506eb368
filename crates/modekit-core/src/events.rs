//! Refresh notifications for dependents of the registry

use modekit_model::StoreId;
use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Why the merged view changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RefreshCause {
    /// A mutation submitted through the registry completed
    LocalWrite {
        /// What was mutated
        operation: String,
        /// Store that was written
        store: Option<StoreId>,
    },
    /// A file changed outside the registry
    ExternalChange {
        /// Path reported by the watcher
        path: PathBuf,
    },
    /// Explicit invalidation
    Manual,
}

/// Event broadcast to subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RegistryEvent {
    /// The cached view was dropped; readers will see fresh data
    Refreshed {
        /// What triggered the refresh
        cause: RefreshCause,
    },
}

/// Host-supplied refresh hook
pub type RefreshCallback = Arc<dyn Fn(&RegistryEvent) + Send + Sync>;

/// Fan-out of refresh events to callbacks and broadcast subscribers
pub struct Notifier {
    sender: broadcast::Sender<RegistryEvent>,
    callbacks: RwLock<Vec<RefreshCallback>>,
}

impl Notifier {
    /// Create notifier buffering up to `capacity` events per subscriber
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            callbacks: RwLock::new(Vec::new()),
        }
    }

    /// Receive future events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.sender.subscribe()
    }

    /// Register a refresh callback
    pub fn on_refresh(&self, callback: RefreshCallback) {
        self.callbacks.write().push(callback);
    }

    /// Deliver a refresh event once to every callback and subscriber
    pub fn refreshed(&self, cause: RefreshCause) {
        let event = RegistryEvent::Refreshed { cause };
        debug!(?event, "notifying dependents");
        let callbacks = self.callbacks.read().clone();
        for callback in callbacks {
            callback(&event);
        }
        // No subscribers is fine
        let _ = self.sender.send(event);
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(64)
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("subscribers", &self.sender.receiver_count())
            .field("callbacks", &self.callbacks.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn callbacks_and_subscribers_see_each_event_once() {
        let notifier = Notifier::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        notifier.on_refresh(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        let mut rx = notifier.subscribe();

        notifier.refreshed(RefreshCause::Manual);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            rx.recv().await.unwrap(),
            RegistryEvent::Refreshed {
                cause: RefreshCause::Manual
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn refresh_without_listeners_is_fine() {
        Notifier::new(1).refreshed(RefreshCause::ExternalChange {
            path: PathBuf::from("/x"),
        });
    }

    #[test]
    fn cause_serializes_with_tag() {
        let json = serde_json::to_string(&RefreshCause::Manual).unwrap();
        assert_eq!(json, r#"{"type":"manual"}"#);
    }
}
