//! Pending operations and their completion side.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex, MutexGuard};

use super::awaitable::Awaitable;
use crate::diagnostics::{self, DiagnosticEvent};
use crate::error::{Error, Result};
use crate::marshal::{Primitive, Scalar};

static NEXT_OPERATION: AtomicU64 = AtomicU64::new(1);

/// Identifier of one pending operation, unique for the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(u64);

impl OperationId {
    fn next() -> Self {
        Self(NEXT_OPERATION.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

enum Slot<T> {
    Empty,
    Resolved(T),
    Failed(Error),
    Taken,
}

struct State<T> {
    slot: Slot<T>,
    waker: Option<Waker>,
    // Failed by shutdown; a completion arriving afterwards is expected.
    abandoned: bool,
}

/// An operation whose result arrives later, possibly on another thread.
///
/// Settles exactly once. The result is taken once, by the single
/// [`Awaitable`] consumer.
pub struct PendingOperation<T> {
    id: OperationId,
    state: Mutex<State<T>>,
    ready: Condvar,
}

impl<T> PendingOperation<T> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            id: OperationId::next(),
            state: Mutex::new(State {
                slot: Slot::Empty,
                waker: None,
                abandoned: false,
            }),
            ready: Condvar::new(),
        })
    }

    pub fn id(&self) -> OperationId {
        self.id
    }

    /// Store the result and wake the consumer.
    ///
    /// A second settlement never overwrites the first: it is a
    /// `ProtocolViolation`, unless the operation was failed by shutdown, in
    /// which case the late result is discarded and `ShuttingDown` returned.
    pub fn settle(&self, result: Result<T>) -> Result<()> {
        let mut state = self.state.lock();
        if !matches!(state.slot, Slot::Empty) {
            if state.abandoned {
                drop(state);
                diagnostics::report(DiagnosticEvent::LateCompletion {
                    operation: self.id.get(),
                });
                return Err(Error::ShuttingDown);
            }
            drop(state);
            let detail = format!("operation {} completed twice", self.id);
            diagnostics::protocol_violation(detail.clone());
            return Err(Error::ProtocolViolation(detail));
        }
        let slot = match result {
            Ok(value) => Slot::Resolved(value),
            Err(e) => Slot::Failed(e),
        };
        self.store(state, slot);
        Ok(())
    }

    /// Fail the operation if it is still empty, marking it abandoned.
    pub fn abandon(&self, error: Error) -> bool {
        let mut state = self.state.lock();
        if !matches!(state.slot, Slot::Empty) {
            return false;
        }
        state.abandoned = true;
        self.store(state, Slot::Failed(error));
        true
    }

    fn store(&self, mut state: MutexGuard<'_, State<T>>, slot: Slot<T>) {
        state.slot = slot;
        let waker = state.waker.take();
        drop(state);

        self.ready.notify_all();
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self.state.lock().slot, Slot::Empty)
    }

    pub(crate) fn poll_take(&self, cx: &mut Context<'_>) -> Poll<Result<T>> {
        let mut state = self.state.lock();
        match std::mem::replace(&mut state.slot, Slot::Taken) {
            Slot::Empty => {
                state.slot = Slot::Empty;
                match &state.waker {
                    Some(waker) if waker.will_wake(cx.waker()) => {}
                    _ => state.waker = Some(cx.waker().clone()),
                }
                Poll::Pending
            }
            Slot::Resolved(value) => Poll::Ready(Ok(value)),
            Slot::Failed(e) => Poll::Ready(Err(e)),
            Slot::Taken => Poll::Ready(Err(Error::ProtocolViolation(format!(
                "operation {} polled after its result was taken",
                self.id
            )))),
        }
    }

    pub(crate) fn wait_take(&self) -> Result<T> {
        let mut state = self.state.lock();
        loop {
            match std::mem::replace(&mut state.slot, Slot::Taken) {
                Slot::Empty => {
                    state.slot = Slot::Empty;
                    self.ready.wait(&mut state);
                }
                Slot::Resolved(value) => return Ok(value),
                Slot::Failed(e) => return Err(e),
                Slot::Taken => {
                    return Err(Error::ProtocolViolation(format!(
                        "operation {} result already taken",
                        self.id
                    )))
                }
            }
        }
    }
}

impl<T> fmt::Debug for PendingOperation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingOperation")
            .field("id", &self.id)
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// Type-erased view used by scopes and the C-ABI completion table.
pub trait Settle: Send + Sync {
    fn id(&self) -> OperationId;
    fn fail(&self, error: Error) -> Result<()>;
    fn abandon(&self, error: Error) -> bool;
    fn is_settled(&self) -> bool;
}

impl<T: Send> Settle for PendingOperation<T> {
    fn id(&self) -> OperationId {
        self.id
    }

    fn fail(&self, error: Error) -> Result<()> {
        self.settle(Err(error))
    }

    fn abandon(&self, error: Error) -> bool {
        PendingOperation::abandon(self, error)
    }

    fn is_settled(&self) -> bool {
        PendingOperation::is_settled(self)
    }
}

/// Resolution with a dynamically typed value.
pub trait ScalarSettle: Settle {
    fn resolve_scalar(&self, value: Scalar) -> Result<()>;
}

impl<T: Primitive> ScalarSettle for PendingOperation<T> {
    fn resolve_scalar(&self, value: Scalar) -> Result<()> {
        match T::from_scalar(value) {
            Some(value) => self.settle(Ok(value)),
            None => {
                let detail = format!(
                    "operation {} expects {}, completed with {}",
                    self.id,
                    T::KIND,
                    value.kind()
                );
                diagnostics::protocol_violation(detail.clone());
                let err = Error::ProtocolViolation(detail);
                // The consumer still gets an answer.
                let _ = self.settle(Err(err.clone()));
                Err(err)
            }
        }
    }
}

/// Completion side of an in-process pending operation.
///
/// Dropping it without completing fails the operation with
/// [`Error::Cancelled`].
pub struct Completer<T: Send + 'static> {
    op: Option<Arc<PendingOperation<T>>>,
}

impl<T: Send + 'static> Completer<T> {
    pub fn id(&self) -> Option<OperationId> {
        self.op.as_ref().map(|op| op.id())
    }

    pub fn complete(mut self, result: Result<T>) -> Result<()> {
        match self.op.take() {
            Some(op) => op.settle(result),
            None => Ok(()),
        }
    }

    pub fn resolve(self, value: T) -> Result<()> {
        self.complete(Ok(value))
    }

    pub fn fail(self, error: Error) -> Result<()> {
        self.complete(Err(error))
    }

    pub(crate) fn operation(&self) -> Option<Arc<PendingOperation<T>>> {
        self.op.clone()
    }
}

impl<T: Send + 'static> Drop for Completer<T> {
    fn drop(&mut self) {
        if let Some(op) = self.op.take() {
            if !op.is_settled() {
                tracing::debug!(operation = %op.id(), "completer dropped before completing");
                let _ = op.settle(Err(Error::Cancelled));
            }
        }
    }
}

impl<T: Send + 'static> fmt::Debug for Completer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completer").field("id", &self.id()).finish()
    }
}

/// A fresh pending operation: complete it through the [`Completer`], consume
/// the result through the [`Awaitable`].
pub fn pending<T: Send + 'static>() -> (Completer<T>, Awaitable<T>) {
    let op = PendingOperation::new();
    (Completer { op: Some(op.clone()) }, Awaitable::new(op))
}

/// The operations owned by one object, failed together when it shuts down.
#[derive(Clone, Default)]
pub struct PendingSet {
    ops: Arc<DashMap<u64, Arc<dyn Settle>>>,
}

impl PendingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A pending operation tracked by this set.
    pub fn pending<T: Send + 'static>(&self) -> (Completer<T>, Awaitable<T>) {
        let (completer, awaitable) = pending();
        if let Some(op) = completer.operation() {
            self.track(op);
        }
        (completer, awaitable)
    }

    pub fn track(&self, op: Arc<dyn Settle>) {
        self.ops.retain(|_, op| !op.is_settled());
        self.ops.insert(op.id().get(), op);
    }

    /// Fail every member still pending. Returns how many were failed.
    pub fn fail_all(&self, error: Error) -> usize {
        let ids: Vec<u64> = self.ops.iter().map(|entry| *entry.key()).collect();
        let mut failed = 0;
        for id in ids {
            if let Some((_, op)) = self.ops.remove(&id) {
                super::abi::forget(op.id());
                if op.abandon(error.clone()) {
                    failed += 1;
                }
            }
        }
        if failed > 0 {
            tracing::debug!(failed, "pending operations failed: {error}");
        }
        failed
    }

    /// Members not yet settled.
    pub fn len(&self) -> usize {
        self.ops.iter().filter(|entry| !entry.value().is_settled()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for PendingSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingSet").field("pending", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn completes_once() {
        let (completer, awaitable) = pending::<u32>();
        let op = completer.operation().unwrap();
        completer.resolve(7).unwrap();

        let err = op.settle(Ok(8)).unwrap_err();
        assert!(err.is_protocol_violation());
        assert_eq!(awaitable.wait(), Ok(7));
    }

    #[test]
    fn dropped_completer_cancels() {
        let (completer, awaitable) = pending::<u32>();
        drop(completer);
        assert_eq!(awaitable.wait(), Err(Error::Cancelled));
    }

    #[test]
    fn completion_from_another_thread() {
        let (completer, awaitable) = pending::<String>();
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            completer.resolve("done".to_string()).unwrap();
        });
        assert_eq!(awaitable.wait().unwrap(), "done");
        t.join().unwrap();
    }

    #[test]
    fn fail_all_abandons_pending_only() {
        let set = PendingSet::new();
        let (done, done_awaitable) = set.pending::<u32>();
        let (late, late_awaitable) = set.pending::<u32>();
        done.resolve(1).unwrap();
        assert_eq!(set.len(), 1);

        assert_eq!(set.fail_all(Error::ShuttingDown), 1);
        assert_eq!(done_awaitable.wait(), Ok(1));
        assert_eq!(late_awaitable.wait(), Err(Error::ShuttingDown));

        // The late completion is absorbed, not a violation.
        assert_eq!(late.resolve(2), Err(Error::ShuttingDown));
        assert!(set.is_empty());
    }

    #[test]
    fn scalar_resolution_checks_kind() {
        let (completer, awaitable) = pending::<u32>();
        let op = completer.operation().unwrap();
        assert!(op.resolve_scalar(Scalar::I8(1)).unwrap_err().is_protocol_violation());
        drop(completer);
        assert!(awaitable.wait().unwrap_err().is_protocol_violation());
    }
}
