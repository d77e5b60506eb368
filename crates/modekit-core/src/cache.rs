//! Merged-view cache using moka
//!
//! Entries are keyed by an invalidation generation. A rebuild that started
//! before an invalidation lands under a generation nobody asks for anymore,
//! so a stale view can never be served after `invalidate` returns.

use crate::resolver::{MergeResolver, MergedView};
use moka::future::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Time-bounded cache of the merged view
#[derive(Debug)]
pub struct ViewCache {
    inner: Cache<u64, Arc<MergedView>>,
    generation: AtomicU64,
    resolver: MergeResolver,
    ttl: Duration,
}

impl ViewCache {
    /// Create cache whose entries expire after `ttl`
    #[must_use]
    pub fn new(resolver: MergeResolver, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder().max_capacity(4).time_to_live(ttl).build(),
            generation: AtomicU64::new(0),
            resolver,
            ttl,
        }
    }

    /// Configured entry lifetime
    #[inline]
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Resolver used on misses
    #[inline]
    #[must_use]
    pub fn resolver(&self) -> &MergeResolver {
        &self.resolver
    }

    /// Current view, rebuilding on miss or expiry
    ///
    /// Concurrent callers during a rebuild share one resolution.
    pub async fn get(&self) -> Arc<MergedView> {
        let generation = self.generation.load(Ordering::Acquire);
        self.inner
            .get_with(generation, async {
                trace!(generation, "merged view cache miss");
                Arc::new(self.resolver.resolve().await)
            })
            .await
    }

    /// Cached view, without triggering a rebuild
    pub async fn peek(&self) -> Option<Arc<MergedView>> {
        let generation = self.generation.load(Ordering::Acquire);
        self.inner.get(&generation).await
    }

    /// Drop the cached view; the next `get` rebuilds
    pub fn invalidate(&self) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.inner.invalidate_all();
        trace!(generation, "merged view invalidated");
    }

    /// Number of invalidations so far
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}
