//! Collections the caller builds for native code.
//!
//! Native code exposes a create function (optionally with a capacity hint),
//! an add function that copies one item in, and a destroy function. The
//! builder runs them in that order and owns the result through the handle
//! registry, so every created collection is destroyed exactly once, including
//! when marshaling an item fails halfway through.

use std::ffi::c_char;
use std::fmt;

use super::string;
use crate::error::Result;
use crate::registry::{Destructor, HandleRegistry, NativeRef, Owned, ReleaseOutcome};

/// The native functions of one collection type.
pub struct CollectionAbi<C, N> {
    pub create: extern "C" fn() -> *mut C,
    /// Create with room for `reserve` items.
    pub create_with_reserve: Option<extern "C" fn(reserve: u32) -> *mut C>,
    /// Copies `item` in; the item is only valid during the call.
    pub add: unsafe extern "C" fn(collection: *mut C, item: N),
    pub destroy: Destructor<C>,
}

impl<C, N> Clone for CollectionAbi<C, N> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C, N> Copy for CollectionAbi<C, N> {}

impl<C, N> fmt::Debug for CollectionAbi<C, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionAbi")
            .field("reserves", &self.create_with_reserve.is_some())
            .finish()
    }
}

/// A value that can be added to a native collection.
pub trait CollectionItem {
    /// What the add function takes.
    type Native: Copy;

    /// Marshal the item and hand the native form to `add` for one call.
    fn with_native<R>(&self, add: impl FnOnce(Self::Native) -> R) -> Result<R>;
}

impl CollectionItem for str {
    type Native = *const c_char;

    fn with_native<R>(&self, add: impl FnOnce(*const c_char) -> R) -> Result<R> {
        let text = string::to_native(self)?;
        Ok(add(text.as_ptr()))
    }
}

impl CollectionItem for String {
    type Native = *const c_char;

    fn with_native<R>(&self, add: impl FnOnce(*const c_char) -> R) -> Result<R> {
        self.as_str().with_native(add)
    }
}

impl<T: CollectionItem + ?Sized> CollectionItem for &T {
    type Native = T::Native;

    fn with_native<R>(&self, add: impl FnOnce(T::Native) -> R) -> Result<R> {
        (**self).with_native(add)
    }
}

macro_rules! by_value_items {
    ($($ty:ty),+) => {
        $(
            impl CollectionItem for $ty {
                type Native = $ty;

                fn with_native<R>(&self, add: impl FnOnce($ty) -> R) -> Result<R> {
                    Ok(add(*self))
                }
            }
        )+
    };
}

by_value_items!(bool, u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

/// A native collection filled by the caller.
#[derive(Debug)]
pub struct NativeCollection<C> {
    handle: Owned<C>,
    len: usize,
}

impl<C> NativeCollection<C> {
    /// Create the collection and add every item, in order.
    ///
    /// Uses the reserving constructor when there is one and the iterator
    /// knows a lower bound on its length.
    pub fn build<N, I>(registry: &HandleRegistry, abi: &CollectionAbi<C, N>, items: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: CollectionItem<Native = N>,
    {
        let items = items.into_iter();
        let hint = items.size_hint().0;
        let handle = match abi.create_with_reserve {
            Some(reserve) if hint > 0 => {
                let reserve_hint = u32::try_from(hint).unwrap_or(u32::MAX);
                registry.acquire(|| reserve(reserve_hint), abi.destroy)?
            }
            _ => registry.acquire(|| (abi.create)(), abi.destroy)?,
        };

        let mut len = 0;
        {
            let collection = handle.borrow()?;
            for item in items {
                item.with_native(|native| unsafe { (abi.add)(collection.as_ptr(), native) })?;
                len += 1;
            }
        }
        tracing::trace!(len, type_name = std::any::type_name::<C>(), "native collection built");
        Ok(Self { handle, len })
    }

    /// Items added while building.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Borrow the collection to pass it to a native call.
    pub fn borrow(&self) -> Result<NativeRef<'_, C>> {
        self.handle.borrow()
    }

    pub fn release(&self) -> ReleaseOutcome {
        self.handle.release()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::ffi::CStr;

    #[derive(Debug)]
    struct Texts {
        items: Vec<String>,
        reserved: usize,
    }

    extern "C" fn texts_new() -> *mut Texts {
        Box::into_raw(Box::new(Texts {
            items: Vec::new(),
            reserved: 0,
        }))
    }

    extern "C" fn texts_with_reserve(reserve: u32) -> *mut Texts {
        Box::into_raw(Box::new(Texts {
            items: Vec::with_capacity(reserve as usize),
            reserved: reserve as usize,
        }))
    }

    unsafe extern "C" fn texts_add(texts: *mut Texts, item: *const c_char) {
        let texts = unsafe { &mut *texts };
        let item = unsafe { CStr::from_ptr(item) };
        texts.items.push(item.to_string_lossy().into_owned());
    }

    unsafe extern "C" fn texts_destroy(texts: *mut Texts) {
        drop(unsafe { Box::from_raw(texts) });
    }

    const TEXTS: CollectionAbi<Texts, *const c_char> = CollectionAbi {
        create: texts_new,
        create_with_reserve: Some(texts_with_reserve),
        add: texts_add,
        destroy: texts_destroy,
    };

    fn contents(collection: &NativeCollection<Texts>) -> (Vec<String>, usize) {
        let texts = collection.borrow().unwrap();
        let texts = unsafe { &*texts.as_ptr() };
        (texts.items.clone(), texts.reserved)
    }

    #[test]
    fn items_arrive_in_order_with_a_reservation() {
        let registry = HandleRegistry::new();
        let collection = NativeCollection::build(&registry, &TEXTS, ["alpha", "βeta", "gamma"]).unwrap();
        assert_eq!(collection.len(), 3);
        assert_eq!(contents(&collection), (vec!["alpha".into(), "βeta".into(), "gamma".into()], 3));

        assert_eq!(collection.release(), ReleaseOutcome::Destroyed);
        assert!(registry.counters().is_balanced());
    }

    #[test]
    fn without_a_size_hint_the_plain_constructor_runs() {
        let registry = HandleRegistry::new();
        let owned: Vec<String> = vec!["x".into(), "y".into()];
        let lazy = owned.iter().filter(|s| !s.is_empty());
        let collection = NativeCollection::build(&registry, &TEXTS, lazy).unwrap();
        assert_eq!(contents(&collection), (owned, 0));

        let empty = NativeCollection::build(&registry, &TEXTS, Vec::<String>::new()).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn failed_item_still_destroys_the_collection() {
        let registry = HandleRegistry::new();
        let err = NativeCollection::build(&registry, &TEXTS, ["fine", "bad\0text", "never"]).unwrap_err();
        assert_eq!(err, Error::InteriorNul { position: 3 });
        assert_eq!(registry.counters().constructed, 1);
        assert!(registry.counters().is_balanced());
    }
}
