//! Construction/destruction accounting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;

static GLOBAL: Lazy<Arc<LifecycleCounters>> = Lazy::new(|| Arc::new(LifecycleCounters::new()));

/// Monotonic counts of native constructions and destructions.
///
/// Neither count is ever decremented, so the pair cannot go negative; the
/// number of live handles is their difference.
#[derive(Debug, Default)]
pub struct LifecycleCounters {
    constructed: AtomicU64,
    destroyed: AtomicU64,
}

/// A point-in-time read of [`LifecycleCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub constructed: u64,
    pub destroyed: u64,
}

impl CounterSnapshot {
    /// Handles constructed but not yet destroyed.
    pub fn outstanding(&self) -> u64 {
        self.constructed.saturating_sub(self.destroyed)
    }

    /// Every construction has its destruction.
    pub fn is_balanced(&self) -> bool {
        self.constructed == self.destroyed
    }
}

impl LifecycleCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide instance.
    pub fn global() -> Arc<LifecycleCounters> {
        GLOBAL.clone()
    }

    pub(crate) fn record_construction(&self) {
        self.constructed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_destruction(&self) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        // Destroyed first, so a racing release can never push it past constructed.
        let destroyed = self.destroyed.load(Ordering::SeqCst);
        let constructed = self.constructed.load(Ordering::SeqCst);
        CounterSnapshot {
            constructed,
            destroyed,
        }
    }

    /// Zero both counts. Only meaningful when no handle is live.
    pub fn reset_for_tests(&self) {
        self.constructed.store(0, Ordering::SeqCst);
        self.destroyed.store(0, Ordering::SeqCst);
    }
}
