//! A plain native object with a live-instance count.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use super::status;
use crate::errors::FfiStatus;

static LIVE: AtomicU64 = AtomicU64::new(0);

pub struct Counter {
    value: AtomicU32,
}

#[unsafe(no_mangle)]
pub extern "C" fn testlib_counter_new(initial: u32) -> *mut Counter {
    LIVE.fetch_add(1, Ordering::SeqCst);
    Box::into_raw(Box::new(Counter {
        value: AtomicU32::new(initial),
    }))
}

/// # Safety
///
/// `counter` must come from `testlib_counter_new` and not be destroyed yet.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn testlib_counter_destroy(counter: *mut Counter) {
    if counter.is_null() {
        return;
    }
    drop(unsafe { Box::from_raw(counter) });
    LIVE.fetch_sub(1, Ordering::SeqCst);
}

/// # Safety
///
/// `counter` must be null or live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn testlib_counter_get_value(counter: *const Counter) -> u32 {
    unsafe { counter.as_ref() }.map_or(0, |c| c.value.load(Ordering::SeqCst))
}

/// # Safety
///
/// `counter` must be null or live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn testlib_counter_increment(counter: *const Counter) -> i32 {
    status(match unsafe { counter.as_ref() } {
        Some(c) => {
            c.value.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        None => Err(FfiStatus::InvalidHandle),
    })
}

/// Instances created and not yet destroyed.
#[unsafe(no_mangle)]
pub extern "C" fn testlib_counter_live_count() -> u64 {
    LIVE.load(Ordering::SeqCst)
}
