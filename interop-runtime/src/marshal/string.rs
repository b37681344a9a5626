//! NUL-terminated UTF-8 strings across the boundary.
//!
//! Ownership is explicit at every call:
//! - caller allocates, native reads: [`to_native`] then pass
//!   [`NativeString::as_ptr`] for the duration of one call, or hand it over
//!   with [`NativeString::into_raw`];
//! - native allocates, caller releases: [`OwnedNativeStr`] copies the text
//!   out and calls the library's paired free function exactly once.

use std::ffi::{c_char, CStr, CString};
use std::ptr::NonNull;

use crate::error::{Error, Result};

/// A caller-allocated, NUL-terminated UTF-8 buffer.
///
/// The buffer is `byte_len() + 1` bytes long. Dropping it (or passing it to
/// [`release`]) frees it; since release consumes the value, it cannot be
/// released twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeString {
    inner: CString,
}

impl NativeString {
    /// Pointer valid for as long as `self` is alive (call-scoped borrow).
    pub fn as_ptr(&self) -> *const c_char {
        self.inner.as_ptr()
    }

    /// Encoded length in bytes, excluding the terminator.
    pub fn byte_len(&self) -> usize {
        self.inner.as_bytes().len()
    }

    /// Transfer ownership to native code.
    ///
    /// The pointer must come back through [`NativeString::from_raw`] to be freed.
    pub fn into_raw(self) -> *mut c_char {
        self.inner.into_raw()
    }

    /// Reclaim a buffer previously produced by [`NativeString::into_raw`].
    ///
    /// # Safety
    ///
    /// `ptr` must come from `into_raw` and must not have been reclaimed already.
    pub unsafe fn from_raw(ptr: *mut c_char) -> Result<Self> {
        if ptr.is_null() {
            return Err(Error::InvalidAddress { what: "string" });
        }
        Ok(Self {
            inner: unsafe { CString::from_raw(ptr) },
        })
    }

    /// The text as a Rust string.
    pub fn as_str(&self) -> &str {
        // Built from a &str in `to_native`, so always UTF-8.
        self.inner.to_str().unwrap_or_default()
    }
}

/// Encode `text` as a NUL-terminated UTF-8 buffer.
pub fn to_native(text: &str) -> Result<NativeString> {
    CString::new(text)
        .map(|inner| NativeString { inner })
        .map_err(|e| Error::InteriorNul {
            position: e.nul_position(),
        })
}

/// Free a buffer produced by [`to_native`].
pub fn release(buffer: NativeString) {
    drop(buffer);
}

/// Copy a native NUL-terminated string into a `String`.
///
/// Scans for the first zero byte; never assumes a length prefix. Does not
/// free `ptr`.
///
/// # Safety
///
/// If non-null, `ptr` must point to a NUL-terminated buffer that stays valid
/// for the duration of the call.
pub unsafe fn from_native(ptr: *const c_char) -> Result<String> {
    let cstr = unsafe { borrow_cstr(ptr)? };
    cstr.to_str()
        .map(str::to_owned)
        .map_err(|e| Error::InvalidUtf8 {
            valid_up_to: e.valid_up_to(),
        })
}

/// Encoded length in bytes of a native string (not its character count).
///
/// # Safety
///
/// Same contract as [`from_native`].
pub unsafe fn byte_length(ptr: *const c_char) -> Result<usize> {
    Ok(unsafe { borrow_cstr(ptr)? }.to_bytes().len())
}

unsafe fn borrow_cstr<'a>(ptr: *const c_char) -> Result<&'a CStr> {
    if ptr.is_null() {
        return Err(Error::InvalidAddress { what: "string" });
    }
    Ok(unsafe { CStr::from_ptr(ptr) })
}

/// The free function a native library pairs with the strings it allocates.
pub type FreeStringFn = unsafe extern "C" fn(*mut c_char);

/// A native-allocated string the caller must release.
///
/// The paired free function runs exactly once, when this value drops.
pub struct OwnedNativeStr {
    ptr: NonNull<c_char>,
    free: FreeStringFn,
}

impl OwnedNativeStr {
    /// Take ownership of a native-allocated string.
    ///
    /// # Safety
    ///
    /// `ptr` must be a NUL-terminated string allocated by the library that
    /// `free` belongs to, and nothing else may free it.
    pub unsafe fn new(ptr: *mut c_char, free: FreeStringFn) -> Result<Self> {
        let ptr = NonNull::new(ptr).ok_or(Error::InvalidAddress { what: "string" })?;
        Ok(Self { ptr, free })
    }

    /// Copy the text out, then release the native buffer.
    ///
    /// # Safety
    ///
    /// Same contract as [`OwnedNativeStr::new`].
    pub unsafe fn take(ptr: *mut c_char, free: FreeStringFn) -> Result<String> {
        let owned = unsafe { Self::new(ptr, free)? };
        owned.text()
    }

    /// Copy of the text.
    pub fn text(&self) -> Result<String> {
        unsafe { from_native(self.ptr.as_ptr()) }
    }
}

impl Drop for OwnedNativeStr {
    fn drop(&mut self) {
        unsafe { (self.free)(self.ptr.as_ptr()) };
    }
}
