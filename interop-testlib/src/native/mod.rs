//! C ABI exports of the fixture library.
//!
//! All functions are `extern "C"` and `#[unsafe(no_mangle)]`. Objects are
//! heap pointers created by a `*_new` function and freed by the matching
//! `*_destroy`; callbacks are `#[repr(C)]` structs whose destroy
//! notification fires when the library drops its copy.

pub mod callbacks;
pub mod collections;
pub mod counter;
pub mod defaults;
pub mod enums;
pub mod primitives;
pub mod special;
pub mod strings;
pub mod thread_class;

use std::ffi::{c_char, CStr};
use std::ops::Deref;

use interop_runtime::trampoline::CallbackAbi;
use interop_runtime::translate::{ErrorDomain, SUCCESS};

use crate::errors::FfiStatus;

/// A callback struct the library owns.
pub(crate) struct Held<C: CallbackAbi>(C);

impl<C: CallbackAbi> Held<C> {
    pub(crate) fn new(callback: C) -> Self {
        Self(callback)
    }
}

impl<C: CallbackAbi> Deref for Held<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.0
    }
}

impl<C: CallbackAbi> Drop for Held<C> {
    fn drop(&mut self) {
        self.0.notify_destroy();
    }
}

pub(crate) fn status(result: Result<(), FfiStatus>) -> i32 {
    match result {
        Ok(()) => SUCCESS,
        Err(status) => status.code(),
    }
}

/// Borrow a C string argument as UTF-8.
pub(crate) unsafe fn read_c_str<'a>(ptr: *const c_char) -> Result<&'a str, FfiStatus> {
    if ptr.is_null() {
        return Err(FfiStatus::InvalidArgument);
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|_| FfiStatus::InvalidArgument)
}
