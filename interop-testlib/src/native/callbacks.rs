//! A native object that calls back into its user, including from threads of
//! its own.

use std::thread::{self, JoinHandle};

use interop_runtime::trampoline::ScalarCallback;
use parking_lot::Mutex;

use super::{status, Held};
use crate::errors::FfiStatus;

#[derive(Default)]
struct SourceState {
    interface: Option<Held<ScalarCallback<u32>>>,
    duration_interface: Option<Held<ScalarCallback<u64>>>,
    once: Option<Held<ScalarCallback<u32>>>,
    threads: Vec<JoinHandle<()>>,
}

pub struct CallbackSource {
    state: Mutex<SourceState>,
}

impl CallbackSource {
    fn join_threads(&self) {
        let threads = std::mem::take(&mut self.state.lock().threads);
        for t in threads {
            let _ = t.join();
        }
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn testlib_cbsource_new() -> *mut CallbackSource {
    Box::into_raw(Box::new(CallbackSource {
        state: Mutex::new(SourceState::default()),
    }))
}

/// Joins any background threads, then drops every held callback.
///
/// # Safety
///
/// `source` must come from `testlib_cbsource_new` and not be destroyed yet.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn testlib_cbsource_destroy(source: *mut CallbackSource) {
    if source.is_null() {
        return;
    }
    let source = unsafe { Box::from_raw(source) };
    source.join_threads();
}

/// Takes ownership of `callback`, replacing (and releasing) any previous one.
///
/// # Safety
///
/// `source` must be null or live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn testlib_cbsource_set_interface(
    source: *const CallbackSource,
    callback: ScalarCallback<u32>,
) -> i32 {
    let callback = Held::new(callback);
    status(match unsafe { source.as_ref() } {
        Some(source) => {
            let previous = source.state.lock().interface.replace(callback);
            drop(previous);
            Ok(())
        }
        None => Err(FfiStatus::InvalidHandle),
    })
}

/// # Safety
///
/// `source` must be null or live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn testlib_cbsource_set_duration_interface(
    source: *const CallbackSource,
    callback: ScalarCallback<u64>,
) -> i32 {
    let callback = Held::new(callback);
    status(match unsafe { source.as_ref() } {
        Some(source) => {
            let previous = source.state.lock().duration_interface.replace(callback);
            drop(previous);
            Ok(())
        }
        None => Err(FfiStatus::InvalidHandle),
    })
}

/// Pass `value` to the interface; returns its answer, or 0 without one.
///
/// # Safety
///
/// `source` must be null or live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn testlib_cbsource_set_value(source: *const CallbackSource, value: u32) -> u32 {
    let Some(source) = (unsafe { source.as_ref() }) else {
        return 0;
    };
    let callback = source.state.lock().interface.as_ref().map(|cb| **cb);
    callback.map_or(0, |cb| cb.call(value))
}

/// Milliseconds in, milliseconds out through the duration interface.
///
/// # Safety
///
/// `source` must be null or live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn testlib_cbsource_set_duration_ms(source: *const CallbackSource, ms: u64) -> u64 {
    let Some(source) = (unsafe { source.as_ref() }) else {
        return 0;
    };
    let callback = source.state.lock().duration_interface.as_ref().map(|cb| **cb);
    callback.map_or(0, |cb| cb.call(ms))
}

/// Deliver `start..start + count` to the interface, in order, from a new
/// native thread.
///
/// # Safety
///
/// `source` must be null or live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn testlib_cbsource_fire_from_thread(
    source: *const CallbackSource,
    start: u32,
    count: u32,
) -> i32 {
    let Some(source) = (unsafe { source.as_ref() }) else {
        return status(Err(FfiStatus::InvalidHandle));
    };
    let mut state = source.state.lock();
    let Some(callback) = state.interface.as_ref().map(|cb| **cb) else {
        return status(Err(FfiStatus::InvalidArgument));
    };
    let spawned = thread::Builder::new()
        .name("testlib-cbsource".into())
        .spawn(move || {
            for value in start..start.saturating_add(count) {
                callback.call(value);
            }
        });
    status(match spawned {
        Ok(handle) => {
            state.threads.push(handle);
            Ok(())
        }
        Err(e) => {
            tracing::error!("testlib_cbsource_fire_from_thread: {e}");
            Err(FfiStatus::Internal)
        }
    })
}

/// Wait for every thread started by `testlib_cbsource_fire_from_thread`.
///
/// # Safety
///
/// `source` must be null or live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn testlib_cbsource_join(source: *const CallbackSource) -> i32 {
    status(match unsafe { source.as_ref() } {
        Some(source) => {
            source.join_threads();
            Ok(())
        }
        None => Err(FfiStatus::InvalidHandle),
    })
}

/// Store a callback meant to be triggered once.
///
/// # Safety
///
/// `source` must be null or live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn testlib_cbsource_set_once(
    source: *const CallbackSource,
    callback: ScalarCallback<u32>,
) -> i32 {
    let callback = Held::new(callback);
    status(match unsafe { source.as_ref() } {
        Some(source) => {
            let previous = source.state.lock().once.replace(callback);
            drop(previous);
            Ok(())
        }
        None => Err(FfiStatus::InvalidHandle),
    })
}

/// Invoke the stored one-shot callback. The library does not forget it, so
/// repeated or concurrent triggers all reach the caller's runtime.
///
/// # Safety
///
/// `source` must be null or live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn testlib_cbsource_trigger_once(source: *const CallbackSource, value: u32) -> i32 {
    let Some(source) = (unsafe { source.as_ref() }) else {
        return status(Err(FfiStatus::InvalidHandle));
    };
    let callback = source.state.lock().once.as_ref().map(|cb| **cb);
    status(match callback {
        Some(cb) => {
            cb.call(value);
            Ok(())
        }
        None => Err(FfiStatus::InvalidArgument),
    })
}
