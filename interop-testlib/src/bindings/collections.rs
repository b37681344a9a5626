use std::ffi::c_char;
use std::sync::Arc;

use interop_runtime::marshal::{string, CollectionAbi, CollectionItem, NativeCollection, Primitive};
use interop_runtime::registry::ReleaseOutcome;
use interop_runtime::trampoline::{CursorCallback, ItemsCallback};
use interop_runtime::translate::translate;
use interop_runtime::{CallbackArena, CallbackGuard, Error, HandleRegistry, Result};
use parking_lot::Mutex;

use crate::errors::FfiStatus;
use crate::native::collections::{
    self as native, testlib_collection_add, testlib_collection_create, testlib_collection_create_with_reserve,
    testlib_collection_destroy, testlib_collection_get, testlib_collection_reserved, testlib_collection_size,
    testlib_invoke_characters, testlib_invoke_int32_range,
};

/// Hand the bytes of `text` to `f` as an iterator over the native buffer.
///
/// The iterator is only valid inside `f`.
pub fn invoke_characters(text: &str, f: impl FnMut(&mut dyn Iterator<Item = u8>) + Send + 'static) -> Result<()> {
    let guard = CallbackArena::global().register_lazy::<u8>(f);
    characters(text, guard)
}

/// Copy of the bytes of `text`, as native code delivers them.
pub fn collect_characters(text: &str) -> Result<Vec<u8>> {
    let (guard, slot) = collecting::<u8>();
    characters(text, guard)?;
    received(slot)
}

/// Walk `start..end` through a native cursor, handing `f` an iterator.
pub fn invoke_int32_range(
    start: i32,
    end: i32,
    f: impl FnMut(&mut dyn Iterator<Item = i32>) + Send + 'static,
) -> Result<()> {
    let guard = CallbackArena::global().register_lazy::<i32>(f);
    int32_range(start, end, guard)
}

pub fn collect_int32_range(start: i32, end: i32) -> Result<Vec<i32>> {
    let (guard, slot) = collecting::<i32>();
    int32_range(start, end, guard)?;
    received(slot)
}

fn characters(text: &str, guard: CallbackGuard<'static>) -> Result<()> {
    let input = string::to_native(text)?;
    let callback = ItemsCallback::<u8>::new(&guard)?;
    let code = unsafe { testlib_invoke_characters(input.as_ptr(), callback) };
    // The native side released the callback before returning.
    guard.detach();
    translate::<FfiStatus>(code, || None)
}

fn int32_range(start: i32, end: i32, guard: CallbackGuard<'static>) -> Result<()> {
    let callback = CursorCallback::<i32>::new(&guard)?;
    let code = testlib_invoke_int32_range(start, end, callback);
    guard.detach();
    translate::<FfiStatus>(code, || None)
}

type Slot<T> = Arc<Mutex<Option<Vec<T>>>>;

fn collecting<T: Primitive>() -> (CallbackGuard<'static>, Slot<T>) {
    let slot: Slot<T> = Arc::new(Mutex::new(None));
    let sink = slot.clone();
    let guard = CallbackArena::global().register_collected(move |items: Vec<T>| {
        *sink.lock() = Some(items);
    });
    (guard, slot)
}

fn received<T>(slot: Slot<T>) -> Result<Vec<T>> {
    slot.lock()
        .take()
        .ok_or_else(|| Error::ProtocolViolation("native call returned without delivering its items".into()))
}

const STRINGS: CollectionAbi<native::StringCollection, *const c_char> = CollectionAbi {
    create: testlib_collection_create,
    create_with_reserve: Some(testlib_collection_create_with_reserve),
    add: testlib_collection_add,
    destroy: testlib_collection_destroy,
};

/// Strings copied into a collection the library owns.
#[derive(Debug)]
pub struct StringCollection {
    inner: NativeCollection<native::StringCollection>,
}

impl StringCollection {
    pub fn new<I>(items: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: CollectionItem<Native = *const c_char>,
    {
        let inner = NativeCollection::build(&HandleRegistry::global(), &STRINGS, items)?;
        Ok(Self { inner })
    }

    /// Item count, as the library reports it.
    pub fn len(&self) -> Result<usize> {
        let collection = self.inner.borrow()?;
        Ok(unsafe { testlib_collection_size(collection.as_ptr()) } as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Capacity reserved at creation.
    pub fn reserved(&self) -> Result<usize> {
        let collection = self.inner.borrow()?;
        Ok(unsafe { testlib_collection_reserved(collection.as_ptr()) } as usize)
    }

    pub fn get(&self, index: usize) -> Result<Option<String>> {
        let Ok(index) = u32::try_from(index) else {
            return Ok(None);
        };
        let collection = self.inner.borrow()?;
        let item = unsafe { testlib_collection_get(collection.as_ptr(), index) };
        if item.is_null() {
            return Ok(None);
        }
        unsafe { string::from_native(item) }.map(Some)
    }

    /// Copies of every item, in order.
    pub fn to_vec(&self) -> Result<Vec<String>> {
        (0..self.len()?)
            .map(|i| {
                self.get(i)?
                    .ok_or_else(|| Error::ProtocolViolation(format!("collection item {i} vanished")))
            })
            .collect()
    }

    pub fn release(&self) -> ReleaseOutcome {
        self.inner.release()
    }
}
