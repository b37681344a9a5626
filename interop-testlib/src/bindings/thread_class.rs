use interop_runtime::bridge;
use interop_runtime::registry::{HandleRegistry, Owned, ReleaseOutcome};
use interop_runtime::trampoline::{OptionalCallback, ScalarCallback};
use interop_runtime::translate::{translate, ErrorDomain};
use interop_runtime::{Awaitable, CallbackArena, CallbackGuard, Error, PendingSet, Result};

use crate::errors::{FfiStatus, MathError};
use crate::native::thread_class::{
    self as native, testlib_thread_class_add, testlib_thread_class_destroy, testlib_thread_class_drop_next_add,
    testlib_thread_class_execute, testlib_thread_class_new, testlib_thread_class_queue_error,
    testlib_thread_class_update,
};

/// A native object that serializes its work on a thread of its own and
/// reports every value change to a listener.
///
/// Requests run in the order they were made. Dropping or
/// [shutting down](ThreadClass::shutdown) fails every unfinished
/// [`ThreadClass::add`] with [`Error::ShuttingDown`] and stops the listener.
#[derive(Debug)]
pub struct ThreadClass {
    handle: Owned<native::ThreadClass>,
    pending: PendingSet,
    listener: Option<CallbackGuard<'static>>,
}

impl ThreadClass {
    pub fn new(value: u32, listener: impl FnMut(u32) + Send + 'static) -> Result<Self> {
        Self::with_registry(&HandleRegistry::global(), value, listener)
    }

    pub fn with_registry(
        registry: &HandleRegistry,
        value: u32,
        listener: impl FnMut(u32) + Send + 'static,
    ) -> Result<Self> {
        let guard = CallbackArena::global().register_sink(listener);
        let callback = ScalarCallback::<u32>::new(&guard)?;
        let handle = registry.acquire(
            || testlib_thread_class_new(value, callback),
            testlib_thread_class_destroy,
        )?;
        Ok(Self {
            handle,
            pending: PendingSet::new(),
            listener: Some(guard),
        })
    }

    /// Set the value; the listener sees it.
    pub fn update(&self, value: u32) -> Result<()> {
        let handle = self.handle.borrow()?;
        translate::<FfiStatus>(unsafe { testlib_thread_class_update(handle.as_ptr(), value) }, || None)
    }

    /// Add `value` on the native thread. Resolves to the new value, or fails
    /// with a [`MathError`] reported by the native side.
    pub fn add(&self, value: u32) -> Awaitable<u32> {
        bridge::start::<u32, MathError>(Some(&self.pending), |completion| {
            let handle = self.handle.borrow()?;
            translate::<FfiStatus>(
                unsafe { testlib_thread_class_add(handle.as_ptr(), value, completion) },
                || None,
            )
        })
    }

    /// Run `op` on the native thread. `Some(next)` replaces the value and
    /// notifies the listener; `None` leaves both alone.
    pub fn execute(&self, op: impl FnMut(u32) -> Option<u32> + Send + 'static) -> Result<()> {
        let handle = self.handle.borrow()?;
        let guard = CallbackArena::global().register_optional_fn(op);
        let callback = OptionalCallback::<u32>::new(&guard)?;
        let code = unsafe { testlib_thread_class_execute(handle.as_ptr(), callback) };
        // Native code owns the callback now, even if it refused the request.
        guard.detach();
        translate::<FfiStatus>(code, || None)
    }

    /// Make the next [`ThreadClass::add`] fail with `error`.
    pub fn queue_error(&self, error: MathError) -> Result<()> {
        let handle = self.handle.borrow()?;
        translate::<FfiStatus>(
            unsafe { testlib_thread_class_queue_error(handle.as_ptr(), error.code()) },
            || None,
        )
    }

    /// Make the next [`ThreadClass::add`] vanish without an answer.
    pub fn drop_next_add(&self) -> Result<()> {
        let handle = self.handle.borrow()?;
        translate::<FfiStatus>(unsafe { testlib_thread_class_drop_next_add(handle.as_ptr()) }, || None)
    }

    /// Unfinished adds.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Fail unfinished adds, stop the listener and destroy the native
    /// object. Later calls are no-ops.
    pub fn shutdown(&mut self) -> ReleaseOutcome {
        if !self.handle.is_live() {
            return ReleaseOutcome::AlreadyReleased;
        }
        let failed = self.pending.fail_all(Error::ShuttingDown);
        if let Some(listener) = self.listener.take() {
            listener.unregister();
        }
        let outcome = self.handle.release();
        if outcome == ReleaseOutcome::Destroyed {
            tracing::debug!(failed, "thread class shut down");
        }
        outcome
    }
}

impl Drop for ThreadClass {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn recording(value: u32) -> (ThreadClass, Arc<Mutex<Vec<u32>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let class = ThreadClass::new(value, move |v| sink.lock().push(v)).unwrap();
        (class, seen)
    }

    #[test]
    fn add_resolves_with_the_sum() {
        let (class, seen) = recording(40);
        assert_eq!(class.add(2).wait().unwrap(), 42);
        assert_eq!(*seen.lock(), vec![42]);
    }

    #[test]
    fn queued_error_fails_the_add() {
        let (class, seen) = recording(1);
        class.queue_error(MathError::MathIsBroke).unwrap();
        let err = class.add(1).wait().unwrap_err();
        assert_eq!(err.native_kind::<MathError>(), Some(MathError::MathIsBroke));
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn dropped_add_reports_dropped() {
        let (class, _) = recording(1);
        class.drop_next_add().unwrap();
        let err = class.add(1).wait().unwrap_err();
        assert_eq!(err.native_kind::<MathError>(), Some(MathError::Dropped));
        assert_eq!(class.add(1).wait().unwrap(), 2);
    }

    #[tokio::test]
    async fn execute_runs_on_the_native_thread() {
        let (class, seen) = recording(5);
        let thread = Arc::new(Mutex::new(None));
        let name = thread.clone();
        class
            .execute(move |v| {
                *name.lock() = std::thread::current().name().map(str::to_owned);
                Some(v * 3)
            })
            .unwrap();
        assert_eq!(class.add(0).await.unwrap(), 15);
        assert_eq!(thread.lock().as_deref(), Some("testlib-thread-class"));
        assert_eq!(*seen.lock(), vec![15, 15]);
    }

    #[test]
    fn declined_execute_changes_nothing() {
        let (class, seen) = recording(8);
        let ran = Arc::new(Mutex::new(Vec::new()));
        let log = ran.clone();
        class
            .execute(move |v| {
                log.lock().push(v);
                None
            })
            .unwrap();
        assert_eq!(class.add(1).wait().unwrap(), 9);
        assert_eq!(*ran.lock(), vec![8]);
        // only the add reached the listener
        assert_eq!(*seen.lock(), vec![9]);
    }

    #[test]
    fn calls_after_shutdown_fail() {
        let (mut class, _) = recording(0);
        assert_eq!(class.shutdown(), ReleaseOutcome::Destroyed);
        assert_eq!(class.shutdown(), ReleaseOutcome::AlreadyReleased);
        assert_eq!(class.update(1).unwrap_err(), Error::HandleReleased);
        assert_eq!(class.add(1).wait().unwrap_err(), Error::HandleReleased);
    }
}
