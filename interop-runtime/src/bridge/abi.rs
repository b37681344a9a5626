//! C-ABI completions.
//!
//! A native asynchronous function receives a `#[repr(C)]` [`Completion`] and
//! calls exactly one of its two entry points, exactly once, from any thread.
//! The context is an operation id into a global table. The entry leaves the
//! table when native code answers, when the completion is dropped unanswered,
//! or when the owner abandons the operation at shutdown. Answers for
//! abandoned operations are expected and absorbed; any other answer for a
//! missing entry is a protocol violation.

use std::collections::VecDeque;
use std::ffi::{c_char, c_void, CStr};
use std::mem::ManuallyDrop;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use super::awaitable::Awaitable;
use super::pending::{OperationId, PendingOperation, PendingSet, ScalarSettle, Settle};
use crate::diagnostics::{self, DiagnosticEvent};
use crate::error::{Error, Result};
use crate::marshal::{string, Primitive, Scalar};
use crate::translate::{translate, ErrorDomain};

/// Builds the error for a native failure code in the operation's domain.
type FailureFn = fn(code: i32, detail: Option<String>) -> Error;

const LAUNCHING: u8 = 0;
const DROPPED_WHILE_LAUNCHING: u8 = 1;
const LAUNCHED: u8 = 2;

/// Abandoned operations remembered for late answers.
const TOMBSTONES: usize = 1024;

struct Entry {
    op: Arc<dyn ScalarSettle>,
    failure: FailureFn,
    // Whether `start` is still inside the caller's closure.
    launch: AtomicU8,
}

/// Operations handed to native code and not yet answered.
static OPERATIONS: Lazy<DashMap<u64, Entry>> = Lazy::new(DashMap::new);

/// Ids removed by [`forget`], oldest first.
static ABANDONED: Lazy<Mutex<VecDeque<u64>>> = Lazy::new(|| Mutex::new(VecDeque::with_capacity(TOMBSTONES)));

/// Completion handed to a native asynchronous function.
///
/// Dropping it on the Rust side without answering cancels the operation.
#[repr(C)]
#[derive(Debug)]
pub struct Completion<T> {
    pub on_complete: extern "C" fn(ctx: *mut c_void, value: T),
    /// `detail` is an optional NUL-terminated string, read during the call.
    pub on_failure: extern "C" fn(ctx: *mut c_void, code: i32, detail: *const c_char),
    pub ctx: *mut c_void,
}

// Safety: `ctx` is an operation id, not an address.
unsafe impl<T> Send for Completion<T> {}
unsafe impl<T> Sync for Completion<T> {}

impl<T> Completion<T> {
    /// Deliver the value, as native code does.
    pub fn complete(self, value: T) {
        let this = ManuallyDrop::new(self);
        (this.on_complete)(this.ctx, value)
    }

    /// Deliver a failure code, as native code does.
    pub fn fail(self, code: i32, detail: Option<&CStr>) {
        let this = ManuallyDrop::new(self);
        let detail = detail.map_or(std::ptr::null(), CStr::as_ptr);
        (this.on_failure)(this.ctx, code, detail)
    }

    pub fn operation(&self) -> OperationId {
        operation_of(self.ctx)
    }
}

impl<T> Drop for Completion<T> {
    fn drop(&mut self) {
        let id = operation_of(self.ctx);
        let launching = match OPERATIONS.get(&id.get()) {
            Some(entry) => entry
                .launch
                .compare_exchange(LAUNCHING, DROPPED_WHILE_LAUNCHING, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok(),
            // answered or abandoned already
            None => return,
        };
        if !launching {
            cancel(id);
        }
    }
}

fn cancel(id: OperationId) {
    if let Some((_, entry)) = OPERATIONS.remove(&id.get()) {
        tracing::debug!(operation = %id, "completion dropped unanswered");
        let _ = entry.op.fail(Error::Cancelled);
    }
}

fn native_failure<D: ErrorDomain>(code: i32, detail: Option<String>) -> Error {
    match translate::<D>(code, || detail) {
        Err(e) => e,
        Ok(()) => Error::ProtocolViolation(format!(
            "{} failure reported with the success code",
            D::NAME
        )),
    }
}

/// Start a native asynchronous operation.
///
/// `call` receives the [`Completion`] to pass to the native function. If it
/// returns an error, native code is assumed never to have seen the
/// completion and the awaitable fails with that error. A completion dropped
/// unanswered fails it with [`Error::Cancelled`]. Failure codes are
/// translated in domain `D`. When `scope` is given the operation joins it,
/// so the owner's shutdown fails it.
pub fn start<T, D>(scope: Option<&PendingSet>, call: impl FnOnce(Completion<T>) -> Result<()>) -> Awaitable<T>
where
    T: Primitive,
    D: ErrorDomain,
{
    let op = PendingOperation::<T>::new();
    let id = op.id();
    OPERATIONS.insert(
        id.get(),
        Entry {
            op: op.clone(),
            failure: native_failure::<D>,
            launch: AtomicU8::new(LAUNCHING),
        },
    );
    if let Some(scope) = scope {
        scope.track(op.clone());
    }
    tracing::trace!(operation = %id, "native operation started");

    let completion = Completion {
        on_complete: complete_trampoline::<T>,
        on_failure: failure_trampoline,
        ctx: id.get() as usize as *mut c_void,
    };
    match call(completion) {
        Ok(()) => {
            let dropped = OPERATIONS.get(&id.get()).is_some_and(|entry| {
                entry
                    .launch
                    .compare_exchange(LAUNCHING, LAUNCHED, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
            });
            if dropped {
                cancel(id);
            }
        }
        Err(e) => {
            if OPERATIONS.remove(&id.get()).is_some() {
                let _ = op.settle(Err(e));
            }
        }
    }
    Awaitable::new(op)
}

/// Drop the table entry of an operation its owner abandoned, remembering
/// the id so a late native answer is recognized.
pub(crate) fn forget(id: OperationId) {
    if OPERATIONS.remove(&id.get()).is_none() {
        return;
    }
    let mut abandoned = ABANDONED.lock();
    if abandoned.len() == TOMBSTONES {
        abandoned.pop_front();
    }
    abandoned.push_back(id.get());
}

fn was_abandoned(id: OperationId) -> bool {
    let mut abandoned = ABANDONED.lock();
    match abandoned.iter().position(|raw| *raw == id.get()) {
        Some(at) => {
            abandoned.remove(at);
            true
        }
        None => false,
    }
}

fn take_entry(id: OperationId) -> Result<Entry> {
    if let Some((_, entry)) = OPERATIONS.remove(&id.get()) {
        return Ok(entry);
    }
    if was_abandoned(id) {
        diagnostics::report(DiagnosticEvent::LateCompletion { operation: id.get() });
        return Err(Error::ShuttingDown);
    }
    let detail = format!("completion for unknown or already answered operation {id}");
    diagnostics::protocol_violation(detail.clone());
    Err(Error::ProtocolViolation(detail))
}

/// Resolve a native operation by id.
pub fn complete<T: Primitive>(id: OperationId, value: T) -> Result<()> {
    complete_scalar(id, value.into_scalar())
}

fn complete_scalar(id: OperationId, value: Scalar) -> Result<()> {
    take_entry(id)?.op.resolve_scalar(value)
}

/// Fail a native operation by id.
pub fn fail(id: OperationId, error: Error) -> Result<()> {
    take_entry(id)?.op.fail(error)
}

/// Number of native operations awaiting an answer.
pub fn outstanding() -> usize {
    OPERATIONS.len()
}

/// Whether `id` is still waiting for its native answer.
pub fn is_outstanding(id: OperationId) -> bool {
    OPERATIONS.contains_key(&id.get())
}

fn operation_of(ctx: *mut c_void) -> OperationId {
    OperationId::from_raw(ctx as usize as u64)
}

extern "C" fn complete_trampoline<T: Primitive>(ctx: *mut c_void, value: T) {
    if let Err(e) = complete_scalar(operation_of(ctx), value.into_scalar()) {
        tracing::trace!("completion not delivered: {e}");
    }
}

extern "C" fn failure_trampoline(ctx: *mut c_void, code: i32, detail: *const c_char) {
    let id = operation_of(ctx);
    let entry = match take_entry(id) {
        Ok(entry) => entry,
        Err(_) => return,
    };
    let error = if detail.is_null() {
        (entry.failure)(code, None)
    } else {
        match unsafe { string::from_native(detail) } {
            Ok(text) => (entry.failure)(code, Some(text)),
            Err(e) => {
                let detail = format!("failure detail for operation {id}: {e}");
                diagnostics::protocol_violation(detail.clone());
                Error::ProtocolViolation(detail)
            }
        }
    };
    if let Err(e) = entry.op.fail(error) {
        tracing::trace!(operation = %id, "failure not delivered: {e}");
    }
}
