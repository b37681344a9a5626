//! Queries against a caller interface that may leave methods to their
//! defaults.

use interop_runtime::trampoline::OptionalCallback;

use super::Held;

/// The interface's `u32` value, or 0 when it gave none.
#[unsafe(no_mangle)]
pub extern "C" fn testlib_defaulted_get_u32(callback: OptionalCallback<u32>) -> u32 {
    Held::new(callback).call(0).unwrap_or(0)
}

/// The interface's duration in milliseconds, or 0 when it gave none.
#[unsafe(no_mangle)]
pub extern "C" fn testlib_defaulted_get_duration_ms(callback: OptionalCallback<u64>) -> u64 {
    Held::new(callback).call(0).unwrap_or(0)
}
