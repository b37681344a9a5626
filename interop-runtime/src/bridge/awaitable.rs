//! Consumer side of a pending operation.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use super::pending::{OperationId, PendingOperation};
use crate::error::Result;

/// The eventual result of a native or worker operation.
///
/// Await it from async code or block on [`Awaitable::wait`]. Either way the
/// result is taken once; the continuation runs on whichever thread completes
/// the operation.
#[must_use = "an awaitable does nothing unless awaited or waited on"]
pub struct Awaitable<T> {
    op: Arc<PendingOperation<T>>,
}

impl<T> Awaitable<T> {
    pub(crate) fn new(op: Arc<PendingOperation<T>>) -> Self {
        Self { op }
    }

    pub fn id(&self) -> OperationId {
        self.op.id()
    }

    /// The result is available without waiting.
    pub fn is_ready(&self) -> bool {
        self.op.is_settled()
    }

    /// Block the current thread until the operation settles.
    pub fn wait(self) -> Result<T> {
        self.op.wait_take()
    }
}

impl<T> Future for Awaitable<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.op.poll_take(cx)
    }
}

impl<T> fmt::Debug for Awaitable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Awaitable")
            .field("id", &self.id())
            .field("ready", &self.is_ready())
            .finish()
    }
}
