//! Native handle ownership.
//!
//! Every wrapper owns exactly one native handle and destroys it at most once,
//! whether released explicitly, dropped, or both, from any thread.

pub mod counters;
pub mod handle;

pub use counters::{CounterSnapshot, LifecycleCounters};
pub use handle::{Destructor, HandleRegistry, NativeRef, Owned, ReleaseOutcome};
