//! Owned native handles with at-most-once destruction.

use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use super::counters::{CounterSnapshot, LifecycleCounters};
use crate::diagnostics::{self, DiagnosticEvent};
use crate::error::{Error, Result};

/// A native destructor paired with the handles of one type.
pub type Destructor<T> = unsafe extern "C" fn(*mut T);

const LIVE: u8 = 0;
const RELEASING: u8 = 1;
const RELEASED: u8 = 2;

/// Result of [`Owned::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// This call ended the handle. The native destructor has run, or runs
    /// when the last outstanding borrow ends.
    Destroyed,
    /// Someone else already released the handle; nothing happened.
    AlreadyReleased,
}

/// Creates [`Owned`] wrappers and counts their lifecycles.
#[derive(Debug, Clone)]
pub struct HandleRegistry {
    counters: Arc<LifecycleCounters>,
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleRegistry {
    /// A registry with its own counters.
    pub fn new() -> Self {
        Self {
            counters: Arc::new(LifecycleCounters::new()),
        }
    }

    /// A registry counting into [`LifecycleCounters::global`].
    pub fn global() -> Self {
        Self {
            counters: LifecycleCounters::global(),
        }
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleCounters> {
        &self.counters
    }

    /// Run a native constructor and take ownership of the handle it returns.
    ///
    /// A null handle is an error and leaves the counters untouched.
    pub fn acquire<T>(&self, ctor: impl FnOnce() -> *mut T, dtor: Destructor<T>) -> Result<Owned<T>> {
        let ptr = ctor();
        unsafe { self.adopt(ptr, dtor) }
    }

    /// Take ownership of a handle obtained some other way.
    ///
    /// # Safety
    ///
    /// `ptr` must be a live handle that `dtor` destroys, and nothing else may
    /// destroy it.
    pub unsafe fn adopt<T>(&self, ptr: *mut T, dtor: Destructor<T>) -> Result<Owned<T>> {
        let ptr = NonNull::new(ptr).ok_or(Error::InvalidAddress {
            what: "native handle",
        })?;
        self.counters.record_construction();
        tracing::debug!(handle = ?ptr, type_name = std::any::type_name::<T>(), "handle acquired");
        Ok(Owned {
            ptr,
            dtor,
            state: AtomicU8::new(LIVE),
            borrows: AtomicUsize::new(0),
            counters: self.counters.clone(),
        })
    }
}

/// Exclusive owner of one native handle.
///
/// Released exactly once: by [`Owned::release`], by [`Owned::into_raw`], or
/// on drop, whichever comes first. Concurrent release from several threads is
/// safe; all but one observe [`ReleaseOutcome::AlreadyReleased`].
///
/// A release never waits. While [`NativeRef`] borrows are outstanding the
/// destructor is deferred, and the last borrow to end runs it.
pub struct Owned<T> {
    ptr: NonNull<T>,
    dtor: Destructor<T>,
    state: AtomicU8,
    borrows: AtomicUsize,
    counters: Arc<LifecycleCounters>,
}

// Safety: the flat ABI requires wrapped objects to accept calls from any
// thread; the borrow count keeps destruction from overlapping a borrow.
unsafe impl<T> Send for Owned<T> {}
unsafe impl<T> Sync for Owned<T> {}

impl<T> Owned<T> {
    /// End the handle if nobody has yet.
    ///
    /// Safe to call from inside a native call on the same handle, such as a
    /// callback that releases its own owner.
    pub fn release(&self) -> ReleaseOutcome {
        if self
            .state
            .compare_exchange(LIVE, RELEASING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            diagnostics::report(DiagnosticEvent::DoubleRelease {
                type_name: std::any::type_name::<T>(),
            });
            return ReleaseOutcome::AlreadyReleased;
        }
        if !self.finish_if_idle() {
            tracing::debug!(handle = ?self.ptr, "handle release deferred to last borrow");
        }
        ReleaseOutcome::Destroyed
    }

    /// Run the destructor if a release is pending and no borrow is out.
    fn finish_if_idle(&self) -> bool {
        if self.borrows.load(Ordering::SeqCst) != 0 {
            return false;
        }
        if self
            .state
            .compare_exchange(RELEASING, RELEASED, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        unsafe { (self.dtor)(self.ptr.as_ptr()) };
        self.counters.record_destruction();
        tracing::debug!(handle = ?self.ptr, "handle released");
        true
    }

    fn end_borrow(&self) {
        if self.borrows.fetch_sub(1, Ordering::SeqCst) == 1 && self.state.load(Ordering::SeqCst) == RELEASING {
            self.finish_if_idle();
        }
    }

    /// Hand the handle back to native code without destroying it.
    ///
    /// Counts as a destruction for pairing purposes: the native side now
    /// owns it.
    pub fn into_raw(self) -> Result<*mut T> {
        // Taking `self` by value rules out outstanding borrows.
        self.state
            .compare_exchange(LIVE, RELEASED, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| Error::HandleReleased)?;
        self.counters.record_destruction();
        Ok(self.ptr.as_ptr())
    }

    /// Borrow the handle for one native call.
    ///
    /// Fails once a release has started; a granted borrow keeps the handle
    /// alive until it is dropped.
    pub fn borrow(&self) -> Result<NativeRef<'_, T>> {
        self.borrows.fetch_add(1, Ordering::SeqCst);
        if self.state.load(Ordering::SeqCst) != LIVE {
            self.end_borrow();
            return Err(Error::HandleReleased);
        }
        Ok(NativeRef {
            ptr: self.ptr,
            owner: Some(self),
        })
    }

    pub fn is_live(&self) -> bool {
        self.state.load(Ordering::SeqCst) == LIVE
    }

    /// Borrows currently outstanding.
    pub fn borrows(&self) -> usize {
        self.borrows.load(Ordering::SeqCst)
    }

    /// The raw handle, for identity comparisons only.
    pub fn as_ptr(&self) -> *mut T {
        self.ptr.as_ptr()
    }
}

impl<T> Drop for Owned<T> {
    fn drop(&mut self) {
        match *self.state.get_mut() {
            LIVE => {
                self.release();
            }
            RELEASING => {
                self.finish_if_idle();
            }
            _ => {}
        }
    }
}

impl<T> fmt::Debug for Owned<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Owned")
            .field("ptr", &self.ptr)
            .field("live", &self.is_live())
            .finish()
    }
}

/// A borrowed native handle.
///
/// Either a live borrow of an [`Owned`] wrapper, which defers its
/// destruction until dropped, or an unowned back-reference that native code
/// handed in for the duration of a call.
pub struct NativeRef<'a, T> {
    ptr: NonNull<T>,
    owner: Option<&'a Owned<T>>,
}

impl<'a, T> NativeRef<'a, T> {
    /// Wrap a pointer the caller does not own.
    ///
    /// # Safety
    ///
    /// `ptr` must stay valid for `'a`, and must not be destroyed through the
    /// returned reference.
    pub unsafe fn unowned(ptr: *mut T) -> Result<Self> {
        let ptr = NonNull::new(ptr).ok_or(Error::InvalidAddress {
            what: "native handle",
        })?;
        Ok(Self { ptr, owner: None })
    }

    pub fn as_ptr(&self) -> *mut T {
        self.ptr.as_ptr()
    }
}

impl<T> Drop for NativeRef<'_, T> {
    fn drop(&mut self) {
        if let Some(owner) = self.owner {
            owner.end_borrow();
        }
    }
}

impl<T> fmt::Debug for NativeRef<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeRef")
            .field("ptr", &self.ptr)
            .field("owned", &self.owner.is_some())
            .finish()
    }
}
