//! Strings in both directions.

use std::ffi::{c_char, CString};

use parking_lot::Mutex;

use super::read_c_str;

pub struct StringEcho {
    last: Mutex<CString>,
}

#[unsafe(no_mangle)]
pub extern "C" fn testlib_string_echo_new() -> *mut StringEcho {
    Box::into_raw(Box::new(StringEcho {
        last: Mutex::new(CString::default()),
    }))
}

/// # Safety
///
/// `echo` must come from `testlib_string_echo_new` and not be destroyed yet.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn testlib_string_echo_destroy(echo: *mut StringEcho) {
    if !echo.is_null() {
        drop(unsafe { Box::from_raw(echo) });
    }
}

/// Copy `value` into the instance and return the copy.
///
/// The returned pointer is owned by the instance and valid until the next
/// echo or its destruction. Null on a null argument.
///
/// # Safety
///
/// `echo` must be null or live; `value` null or NUL-terminated.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn testlib_string_echo_echo(
    echo: *const StringEcho,
    value: *const c_char,
) -> *const c_char {
    let Some(echo) = (unsafe { echo.as_ref() }) else {
        return std::ptr::null();
    };
    if value.is_null() {
        return std::ptr::null();
    }
    let copy = unsafe { std::ffi::CStr::from_ptr(value) }.to_owned();
    let mut last = echo.last.lock();
    *last = copy;
    last.as_ptr()
}

/// Encoded length of `value` in bytes; 0 for null or invalid UTF-8.
///
/// # Safety
///
/// `value` must be null or NUL-terminated.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn testlib_string_length(value: *const c_char) -> u32 {
    unsafe { read_c_str(value) }.map_or(0, |s| u32::try_from(s.len()).unwrap_or(u32::MAX))
}

/// Library version, allocated by the library. Free with `testlib_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn testlib_version() -> *mut c_char {
    CString::new(env!("CARGO_PKG_VERSION"))
        .map(CString::into_raw)
        .unwrap_or(std::ptr::null_mut())
}

/// # Safety
///
/// `ptr` must be null or come from a `testlib_*` function that allocates.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn testlib_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(unsafe { CString::from_raw(ptr) });
    }
}
