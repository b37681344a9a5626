//! A native object that runs every request on its own thread and reports
//! value changes to a listener.

use interop_runtime::bridge::Completion;
use interop_runtime::config::WorkerConfig;
use interop_runtime::trampoline::{OptionalCallback, ScalarCallback};
use interop_runtime::translate::ErrorDomain;
use interop_runtime::WorkerActor;

use super::{status, Held};
use crate::errors::{FfiStatus, MathError};

struct ThreadState {
    value: u32,
    error_queue: Vec<MathError>,
    drop_next_add: bool,
    listener: Held<ScalarCallback<u32>>,
}

impl ThreadState {
    fn set(&mut self, value: u32) {
        self.value = value;
        self.listener.call(value);
    }
}

/// Answers a [`Completion`] exactly once; dropping it unanswered reports
/// [`MathError::Dropped`].
struct NativePromise(Option<Completion<u32>>);

impl NativePromise {
    fn complete(mut self, result: Result<u32, MathError>) {
        if let Some(completion) = self.0.take() {
            match result {
                Ok(value) => completion.complete(value),
                Err(e) => completion.fail(e.code(), None),
            }
        }
    }
}

impl Drop for NativePromise {
    fn drop(&mut self) {
        if let Some(completion) = self.0.take() {
            completion.fail(MathError::Dropped.code(), None);
        }
    }
}

pub struct ThreadClass {
    actor: WorkerActor<ThreadState>,
}

/// Start the worker thread. Returns null if it cannot be started.
#[unsafe(no_mangle)]
pub extern "C" fn testlib_thread_class_new(value: u32, listener: ScalarCallback<u32>) -> *mut ThreadClass {
    let state = ThreadState {
        value,
        error_queue: Vec::new(),
        drop_next_add: false,
        listener: Held::new(listener),
    };
    match WorkerActor::spawn(&WorkerConfig::named("testlib-thread-class"), state) {
        Ok(actor) => Box::into_raw(Box::new(ThreadClass { actor })),
        Err(e) => {
            tracing::error!("testlib_thread_class_new: {e}");
            std::ptr::null_mut()
        }
    }
}

/// Stops the worker: the running request finishes, queued ones are dropped
/// (pending adds answer `Dropped`), and the listener is released.
///
/// # Safety
///
/// `instance` must come from `testlib_thread_class_new` and not be destroyed yet.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn testlib_thread_class_destroy(instance: *mut ThreadClass) {
    if !instance.is_null() {
        drop(unsafe { Box::from_raw(instance) });
    }
}

unsafe fn post(instance: *const ThreadClass, op: impl FnOnce(&mut ThreadState) + Send + 'static) -> i32 {
    status(match unsafe { instance.as_ref() } {
        Some(class) => class.actor.post(op).map_err(|_| FfiStatus::ShuttingDown),
        None => Err(FfiStatus::InvalidHandle),
    })
}

/// # Safety
///
/// `instance` must be null or live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn testlib_thread_class_update(instance: *const ThreadClass, value: u32) -> i32 {
    unsafe { post(instance, move |state| state.set(value)) }
}

/// Add `value` on the worker and answer `completion` with the new value,
/// unless an error was queued or the next add is to be dropped.
///
/// # Safety
///
/// `instance` must be null or live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn testlib_thread_class_add(
    instance: *const ThreadClass,
    value: u32,
    completion: Completion<u32>,
) -> i32 {
    let promise = NativePromise(Some(completion));
    let queued = move |state: &mut ThreadState| {
        if state.drop_next_add {
            state.drop_next_add = false;
            drop(promise);
        } else if let Some(err) = state.error_queue.pop() {
            promise.complete(Err(err));
        } else {
            let sum = state.value.wrapping_add(value);
            state.set(sum);
            promise.complete(Ok(sum));
        }
    };
    unsafe { post(instance, queued) }
}

/// Apply `operation` to the current value on the worker. When it declines
/// to answer the value stays and the listener is not called. The callback
/// struct is released after it runs.
///
/// # Safety
///
/// `instance` must be null or live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn testlib_thread_class_execute(
    instance: *const ThreadClass,
    operation: OptionalCallback<u32>,
) -> i32 {
    let operation = Held::new(operation);
    let queued = move |state: &mut ThreadState| {
        if let Some(next) = operation.call(state.value) {
            state.set(next);
        }
    };
    unsafe { post(instance, queued) }
}

/// Make the next add fail with `error` (a `MathError` code).
///
/// # Safety
///
/// `instance` must be null or live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn testlib_thread_class_queue_error(instance: *const ThreadClass, error: i32) -> i32 {
    let Some(error) = MathError::from_code(error) else {
        return status(Err(FfiStatus::InvalidArgument));
    };
    unsafe { post(instance, move |state| state.error_queue.push(error)) }
}

/// Make the next add drop its completion without answering.
///
/// # Safety
///
/// `instance` must be null or live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn testlib_thread_class_drop_next_add(instance: *const ThreadClass) -> i32 {
    unsafe { post(instance, |state| state.drop_next_add = true) }
}
