//! A function that fails with codes from its own error enumeration and
//! keeps a per-thread detail message.

use std::cell::RefCell;
use std::ffi::{c_char, CString};

use interop_runtime::translate::{ErrorDomain, SUCCESS};

use super::read_c_str;
use crate::errors::PasswordError;

const PASSWORD: &str = "solarwinds123";
const SPECIAL_NUMBER: u32 = 42;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn fail(kind: PasswordError, detail: &str) -> i32 {
    LAST_ERROR.with(|last| *last.borrow_mut() = CString::new(detail).ok());
    kind.code()
}

/// Write the special number to `out` if `password` is right.
///
/// # Safety
///
/// `password` must be null or NUL-terminated; `out` null or writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn testlib_special_number(password: *const c_char, out: *mut u32) -> i32 {
    let Ok(password) = (unsafe { read_c_str(password) }) else {
        return fail(PasswordError::NullArgument, "password is null or not UTF-8");
    };
    if out.is_null() {
        return fail(PasswordError::NullArgument, "output pointer is null");
    }
    if password != PASSWORD {
        return fail(PasswordError::BadPassword, "password rejected");
    }
    unsafe { out.write(SPECIAL_NUMBER) };
    SUCCESS
}

/// Detail of the last failure on this thread, or null. Owned by the
/// library; valid until the next failing call on the same thread.
#[unsafe(no_mangle)]
pub extern "C" fn testlib_last_error_detail() -> *const c_char {
    LAST_ERROR.with(|last| {
        last.borrow()
            .as_ref()
            .map_or(std::ptr::null(), |detail| detail.as_ptr())
    })
}
