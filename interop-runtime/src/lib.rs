//! Runtime for wrapping native libraries exposed through a flat C ABI.
//!
//! Makes opaque native resources, callbacks, collections, asynchronous
//! completions and error codes usable as owned values, closures, iterators,
//! futures and typed errors, while native code keeps calling back from its
//! own threads.
//!
//! Components, leaves first:
//! - [`marshal`]: primitives, durations and strings across the boundary.
//! - [`registry`]: owned native handles, destroyed at most once.
//! - [`trampoline`]: token-addressed callbacks and their C entry points.
//! - [`bridge`]: native completions as [`Awaitable`]s.
//! - [`error`] and [`translate`]: status codes to typed errors.
//! - [`worker`]: a thread actor serializing operations on owned state.
//!
//! Plus [`config`], [`logging`] and [`diagnostics`] for the conditions the
//! runtime absorbs instead of raising.

pub mod bridge;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod logging;
pub mod marshal;
pub mod registry;
pub mod trampoline;
pub mod translate;
pub mod worker;

pub use bridge::{Awaitable, Completer, PendingSet};
pub use config::RuntimeConfig;
pub use error::{Error, NativeError, Result};
pub use registry::{HandleRegistry, Owned, ReleaseOutcome};
pub use trampoline::{CallbackArena, CallbackGuard, CallbackToken};
pub use translate::ErrorDomain;
pub use worker::WorkerActor;
