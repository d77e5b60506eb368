//! Write serializer
//!
//! Every mutation runs through one FIFO queue, one operation at a time, so
//! two read-modify-write cycles on the same aggregate file never interleave.
//! A failed operation is reported to its submitter and the queue moves on.
//! After each operation that changed something, the cache is invalidated and
//! dependents are notified exactly once.

use crate::cache::ViewCache;
use crate::error::{RegistryError, Result};
use crate::events::{Notifier, RefreshCause};
use crate::locks::SuppressionLocks;
use futures::future::BoxFuture;
use modekit_model::{Slug, StoreId};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// What a completed write did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Operation label, e.g. `upsert architect`
    pub operation: String,
    /// Store written, when a single store was involved
    pub store: Option<StoreId>,
    /// Files written or removed
    pub paths: Vec<PathBuf>,
    /// Whether anything on disk changed
    pub changed: bool,
}

impl WriteOutcome {
    /// Outcome of an operation that changed files
    #[must_use]
    pub fn changed(operation: impl Into<String>, store: Option<StoreId>, paths: Vec<PathBuf>) -> Self {
        Self {
            operation: operation.into(),
            store,
            paths,
            changed: true,
        }
    }

    /// Outcome of an operation that found nothing to do
    #[must_use]
    pub fn unchanged(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            store: None,
            paths: Vec::new(),
            changed: false,
        }
    }
}

/// Handle given to a running operation for engaging suppression locks
#[derive(Clone)]
pub struct WriteContext {
    locks: Arc<SuppressionLocks>,
    engaged: Arc<Mutex<Vec<Slug>>>,
    touched: Arc<Mutex<Vec<PathBuf>>>,
}

impl WriteContext {
    fn new(locks: Arc<SuppressionLocks>) -> Self {
        Self {
            locks,
            engaged: Arc::new(Mutex::new(Vec::new())),
            touched: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Record that `path` changed on disk
    ///
    /// Operations spanning several files call this after each step, so a
    /// later failure still invalidates the cache for the steps that landed.
    pub fn touched(&self, path: &Path) {
        let mut touched = self.touched.lock();
        if !touched.iter().any(|p| p == path) {
            touched.push(path.to_path_buf());
        }
    }

    fn touched_paths(&self) -> Vec<PathBuf> {
        self.touched.lock().clone()
    }

    /// Suppress change events for `slug` and `target` until shortly after
    /// this operation completes
    ///
    /// Call before touching the filesystem.
    pub fn suppress(&self, slug: &Slug, target: &Path) {
        let mut engaged = self.engaged.lock();
        if engaged.contains(slug) {
            self.locks.add_target(slug, target);
        } else {
            self.locks.engage(slug, target);
            engaged.push(slug.clone());
        }
    }

    fn release_all(&self) {
        for slug in self.engaged.lock().drain(..) {
            self.locks.release(&slug);
        }
    }
}

impl fmt::Debug for WriteContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteContext")
            .field("engaged", &*self.engaged.lock())
            .field("touched", &*self.touched.lock())
            .finish()
    }
}

type WriteOp = Box<dyn FnOnce(WriteContext) -> BoxFuture<'static, Result<WriteOutcome>> + Send>;

struct PendingWrite {
    label: String,
    op: WriteOp,
    reply: Option<oneshot::Sender<Result<WriteOutcome>>>,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<PendingWrite>,
    draining: bool,
}

struct Inner {
    queue: Mutex<QueueState>,
    cache: Arc<ViewCache>,
    locks: Arc<SuppressionLocks>,
    notifier: Arc<Notifier>,
}

/// FIFO executor for mutations
#[derive(Clone)]
pub struct WriteSerializer {
    inner: Arc<Inner>,
}

impl WriteSerializer {
    /// Create serializer that invalidates `cache` and notifies through
    /// `notifier` after each change
    #[must_use]
    pub fn new(cache: Arc<ViewCache>, locks: Arc<SuppressionLocks>, notifier: Arc<Notifier>) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue: Mutex::new(QueueState::default()),
                cache,
                locks,
                notifier,
            }),
        }
    }

    /// Queue `op` without waiting for it
    ///
    /// Must be called from within a Tokio runtime.
    pub fn enqueue<F, Fut>(&self, label: impl Into<String>, op: F)
    where
        F: FnOnce(WriteContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<WriteOutcome>> + Send + 'static,
    {
        self.push(label.into(), Box::new(move |ctx| Box::pin(op(ctx))), None);
    }

    /// Queue `op` and wait for its result
    ///
    /// # Errors
    /// Returns the operation's own error, [`RegistryError::WriteAborted`] if
    /// it panicked, or [`RegistryError::QueueClosed`] if the queue went away.
    pub async fn submit<F, Fut>(&self, label: impl Into<String>, op: F) -> Result<WriteOutcome>
    where
        F: FnOnce(WriteContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<WriteOutcome>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.push(label.into(), Box::new(move |ctx| Box::pin(op(ctx))), Some(tx));
        rx.await.map_err(|_| RegistryError::QueueClosed)?
    }

    /// Wait until everything queued before this call has finished
    pub async fn flush(&self) {
        let _ = self
            .submit("flush", |_| async { Ok(WriteOutcome::unchanged("flush")) })
            .await;
    }

    /// Operations waiting to run
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.queue.lock().pending.len()
    }

    /// Whether nothing is queued or running
    #[must_use]
    pub fn is_idle(&self) -> bool {
        let state = self.inner.queue.lock();
        state.pending.is_empty() && !state.draining
    }

    fn push(&self, label: String, op: WriteOp, reply: Option<oneshot::Sender<Result<WriteOutcome>>>) {
        let start = {
            let mut state = self.inner.queue.lock();
            state.pending.push_back(PendingWrite { label, op, reply });
            !std::mem::replace(&mut state.draining, true)
        };
        if start {
            tokio::spawn(Self::drain(self.inner.clone()));
        }
    }

    async fn drain(inner: Arc<Inner>) {
        loop {
            let next = {
                let mut state = inner.queue.lock();
                match state.pending.pop_front() {
                    Some(write) => write,
                    None => {
                        state.draining = false;
                        return;
                    }
                }
            };
            Self::run(&inner, next).await;
        }
    }

    async fn run(inner: &Inner, write: PendingWrite) {
        let PendingWrite { label, op, reply } = write;
        let ctx = WriteContext::new(inner.locks.clone());

        // A panicking operation must not wedge the queue
        let result = match tokio::spawn(op(ctx.clone())).await {
            Ok(result) => result,
            Err(e) => {
                warn!(operation = %label, "write task failed: {e}");
                Err(RegistryError::WriteAborted(label.clone()))
            }
        };
        ctx.release_all();

        match &result {
            Ok(outcome) if outcome.changed => {
                inner.cache.invalidate();
                inner.notifier.refreshed(RefreshCause::LocalWrite {
                    operation: outcome.operation.clone(),
                    store: outcome.store,
                });
                debug!(operation = %label, paths = ?outcome.paths, "write completed");
            }
            Ok(_) => debug!(operation = %label, "write completed without changes"),
            Err(e) => {
                warn!(operation = %label, "write failed: {e}");
                let partial = ctx.touched_paths();
                if !partial.is_empty() {
                    inner.cache.invalidate();
                    inner.notifier.refreshed(RefreshCause::LocalWrite {
                        operation: label.clone(),
                        store: None,
                    });
                    debug!(operation = %label, paths = ?partial, "failed write left partial changes");
                }
            }
        }

        if let Some(reply) = reply {
            let _ = reply.send(result);
        }
    }
}

impl fmt::Debug for WriteSerializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.queue.lock();
        f.debug_struct("WriteSerializer")
            .field("pending", &state.pending.len())
            .field("draining", &state.draining)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::MergeResolver;
    use modekit_store::StoreSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn serializer() -> (WriteSerializer, Arc<ViewCache>, Arc<SuppressionLocks>, Arc<Notifier>) {
        let cache = Arc::new(ViewCache::new(
            MergeResolver::new(StoreSet::default()),
            Duration::from_secs(60),
        ));
        let locks = Arc::new(SuppressionLocks::new(
            Duration::from_secs(5),
            Duration::from_secs(30),
        ));
        let notifier = Arc::new(Notifier::default());
        (
            WriteSerializer::new(cache.clone(), locks.clone(), notifier.clone()),
            cache,
            locks,
            notifier,
        )
    }

    #[tokio::test]
    async fn operations_run_one_at_a_time_in_order() {
        let (serializer, ..) = serializer();
        let log = Arc::new(Mutex::new(Vec::new()));
        let running = Arc::new(AtomicUsize::new(0));

        let mut tickets = Vec::new();
        for i in 0..5 {
            let log = log.clone();
            let running = running.clone();
            let serializer = serializer.clone();
            tickets.push(tokio::spawn(async move {
                serializer
                    .submit(format!("op {i}"), move |_| async move {
                        assert_eq!(running.fetch_add(1, Ordering::SeqCst), 0);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        log.lock().push(i);
                        running.fetch_sub(1, Ordering::SeqCst);
                        Ok(WriteOutcome::unchanged("op"))
                    })
                    .await
            }));
            // Keep submission order deterministic
            tokio::task::yield_now().await;
        }
        for ticket in tickets {
            ticket.await.unwrap().unwrap();
        }
        assert_eq!(*log.lock(), vec![0, 1, 2, 3, 4]);
        assert!(serializer.is_idle());
    }

    #[tokio::test]
    async fn failure_does_not_stop_the_queue() {
        let (serializer, cache, ..) = serializer();
        let first = serializer.submit("fails", |_| async {
            Err(RegistryError::UnknownMode("ghost".into()))
        });
        assert!(matches!(first.await, Err(RegistryError::UnknownMode(_))));

        let second = serializer
            .submit("works", |_| async {
                Ok(WriteOutcome::changed("works", None, Vec::new()))
            })
            .await
            .unwrap();
        assert!(second.changed);
        assert_eq!(cache.generation(), 1);
    }

    #[tokio::test]
    async fn failure_after_partial_change_still_invalidates() {
        let (serializer, cache, _, notifier) = serializer();
        let mut rx = notifier.subscribe();
        let err = serializer
            .submit("delete a", |ctx| async move {
                ctx.touched(Path::new("/m/a.yaml"));
                Err(RegistryError::UnknownMode("a".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownMode(_)));
        assert_eq!(cache.generation(), 1);
        assert!(matches!(
            rx.try_recv(),
            Ok(crate::events::RegistryEvent::Refreshed {
                cause: RefreshCause::LocalWrite { store: None, .. }
            })
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn panicking_operation_is_reported_and_queue_continues() {
        let (serializer, ..) = serializer();
        let err = serializer
            .submit("boom", |_| async {
                if true {
                    panic!("boom");
                }
                Ok(WriteOutcome::unchanged("boom"))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::WriteAborted(_)));
        serializer.flush().await;
        assert!(serializer.is_idle());
    }

    #[tokio::test]
    async fn change_invalidates_and_notifies_once() {
        let (serializer, cache, _, notifier) = serializer();
        let mut rx = notifier.subscribe();
        serializer
            .submit("upsert a", |_| async {
                Ok(WriteOutcome::changed("upsert a", None, Vec::new()))
            })
            .await
            .unwrap();
        assert_eq!(cache.generation(), 1);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());

        serializer
            .submit("noop", |_| async { Ok(WriteOutcome::unchanged("noop")) })
            .await
            .unwrap();
        assert_eq!(cache.generation(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn locks_engaged_during_write_linger_after() {
        let (serializer, _, locks, _) = serializer();
        let slug = Slug::new("a").unwrap();
        let inner_slug = slug.clone();
        let observed = serializer
            .submit("upsert a", move |ctx| async move {
                ctx.suppress(&inner_slug, Path::new("/m/a.yaml"));
                Ok(WriteOutcome::changed("upsert a", None, Vec::new()))
            })
            .await;
        assert!(observed.is_ok());
        assert!(locks.is_suppressed(&slug), "grace period still running");
        assert!(locks.suppresses_path(Path::new("/m/a.yaml")));
    }

    #[tokio::test]
    async fn enqueue_is_fire_and_forget() {
        let (serializer, cache, ..) = serializer();
        serializer.enqueue("background", |_| async {
            Ok(WriteOutcome::changed("background", None, Vec::new()))
        });
        serializer.flush().await;
        assert_eq!(cache.generation(), 1);
    }
}
