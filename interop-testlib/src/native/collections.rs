//! Collections handed to a callback (a byte buffer and a cursor) and a
//! string collection the caller fills.

use std::ffi::{c_char, c_void, CStr, CString};

use interop_runtime::trampoline::{CursorCallback, ItemsCallback};

use super::{status, Held};
use crate::errors::FfiStatus;

/// Pass the bytes of `text` to `callback` in one call.
///
/// The buffer is only valid during that call; the callback struct is
/// released when this function returns.
///
/// # Safety
///
/// `text` must be null or NUL-terminated.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn testlib_invoke_characters(text: *const c_char, callback: ItemsCallback<u8>) -> i32 {
    let callback = Held::new(callback);
    if text.is_null() {
        return status(Err(FfiStatus::InvalidArgument));
    }
    let bytes = unsafe { CStr::from_ptr(text) }.to_bytes();
    callback.call(bytes);
    status(Ok(()))
}

struct Int32Range {
    next: i32,
    end: i32,
    current: i32,
}

unsafe extern "C" fn int32_range_next(iter: *mut c_void) -> *const i32 {
    let Some(range) = (unsafe { iter.cast::<Int32Range>().as_mut() }) else {
        return std::ptr::null();
    };
    if range.next >= range.end {
        return std::ptr::null();
    }
    range.current = range.next;
    range.next += 1;
    &range.current
}

/// Walk `start..end` through a cursor handed to `callback`.
///
/// Each item pointer is valid until the next step.
#[unsafe(no_mangle)]
pub extern "C" fn testlib_invoke_int32_range(start: i32, end: i32, callback: CursorCallback<i32>) -> i32 {
    let callback = Held::new(callback);
    let mut range = Int32Range {
        next: start,
        end,
        current: 0,
    };
    let iter = (&mut range as *mut Int32Range).cast::<c_void>();
    (callback.on_cursor)(callback.ctx, iter, int32_range_next);
    status(Ok(()))
}

/// Strings the caller adds one at a time; the library keeps copies.
#[derive(Debug)]
pub struct StringCollection {
    items: Vec<CString>,
    reserved: u32,
}

#[unsafe(no_mangle)]
pub extern "C" fn testlib_collection_create() -> *mut StringCollection {
    Box::into_raw(Box::new(StringCollection {
        items: Vec::new(),
        reserved: 0,
    }))
}

#[unsafe(no_mangle)]
pub extern "C" fn testlib_collection_create_with_reserve(reserve: u32) -> *mut StringCollection {
    Box::into_raw(Box::new(StringCollection {
        items: Vec::with_capacity(reserve as usize),
        reserved: reserve,
    }))
}

/// # Safety
///
/// `collection` must come from a `testlib_collection_create*` function and
/// not be destroyed yet.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn testlib_collection_destroy(collection: *mut StringCollection) {
    if !collection.is_null() {
        drop(unsafe { Box::from_raw(collection) });
    }
}

/// Copy `item` to the end. Null items are ignored.
///
/// # Safety
///
/// `collection` must be null or live; `item` null or NUL-terminated.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn testlib_collection_add(collection: *mut StringCollection, item: *const c_char) {
    let Some(collection) = (unsafe { collection.as_mut() }) else {
        return;
    };
    if !item.is_null() {
        collection.items.push(unsafe { CStr::from_ptr(item) }.to_owned());
    }
}

/// # Safety
///
/// `collection` must be null or live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn testlib_collection_size(collection: *const StringCollection) -> u32 {
    unsafe { collection.as_ref() }.map_or(0, |c| c.items.len() as u32)
}

/// The capacity asked for at creation; 0 for `testlib_collection_create`.
///
/// # Safety
///
/// `collection` must be null or live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn testlib_collection_reserved(collection: *const StringCollection) -> u32 {
    unsafe { collection.as_ref() }.map_or(0, |c| c.reserved)
}

/// Item `index`, valid until the collection is destroyed; null when out of
/// range.
///
/// # Safety
///
/// `collection` must be null or live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn testlib_collection_get(collection: *const StringCollection, index: u32) -> *const c_char {
    unsafe { collection.as_ref() }
        .and_then(|c| c.items.get(index as usize))
        .map_or(std::ptr::null(), |item| item.as_ptr())
}
