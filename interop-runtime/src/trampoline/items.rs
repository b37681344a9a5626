//! Forward-only views over native collections.

use std::fmt;
use std::marker::PhantomData;

use crate::error::{Error, Result};
use crate::marshal::{Primitive, Scalar, ScalarKind};

type ReadFn = unsafe fn(*const u8) -> Scalar;

unsafe fn read_as<T: Primitive>(ptr: *const u8) -> Scalar {
    unsafe { T::read_raw(ptr.cast::<T>()) }.into_scalar()
}

enum Source<'a> {
    Buffer {
        next: *const u8,
        stride: usize,
        remaining: usize,
        read: ReadFn,
    },
    Cursor(&'a mut dyn FnMut() -> Option<Scalar>),
    Slice(std::slice::Iter<'a, Scalar>),
}

/// A lazy sequence of native values, valid only inside the call that
/// produced it.
///
/// Items are copied out of native memory as they are read. The sequence is
/// consumed once; there is no way to restart it.
pub struct Items<'a> {
    kind: ScalarKind,
    source: Source<'a>,
    done: bool,
    _borrow: PhantomData<&'a [u8]>,
}

impl<'a> Items<'a> {
    /// View `count` contiguous values starting at `ptr`.
    ///
    /// A null pointer is accepted only for an empty buffer.
    ///
    /// # Safety
    ///
    /// When non-null, `ptr` must be readable for `count` values for `'a`.
    pub unsafe fn from_buffer<T: Primitive>(ptr: *const T, count: usize) -> Result<Self> {
        if ptr.is_null() && count > 0 {
            return Err(Error::ProtocolViolation(format!(
                "null {} buffer with {count} items",
                T::KIND
            )));
        }
        Ok(Self {
            kind: T::KIND,
            source: Source::Buffer {
                next: ptr.cast(),
                stride: std::mem::size_of::<T>(),
                remaining: count,
                read: read_as::<T>,
            },
            done: count == 0,
            _borrow: PhantomData,
        })
    }

    /// Pull values from a native cursor until it reports the end.
    pub fn from_cursor(kind: ScalarKind, next: &'a mut dyn FnMut() -> Option<Scalar>) -> Self {
        Self {
            kind,
            source: Source::Cursor(next),
            done: false,
            _borrow: PhantomData,
        }
    }

    /// Values already in Rust memory.
    pub fn from_slice(kind: ScalarKind, values: &'a [Scalar]) -> Self {
        Self {
            kind,
            source: Source::Slice(values.iter()),
            done: false,
            _borrow: PhantomData,
        }
    }

    pub fn kind(&self) -> ScalarKind {
        self.kind
    }

    /// Iterate as `T`, failing up front if the element kind differs.
    pub fn typed<T: Primitive>(&mut self) -> Result<Typed<'_, 'a, T>> {
        if self.kind != T::KIND {
            return Err(Error::ProtocolViolation(format!(
                "expected {} items, native sent {}",
                T::KIND,
                self.kind
            )));
        }
        Ok(Typed {
            items: self,
            _marker: PhantomData,
        })
    }
}

impl Iterator for Items<'_> {
    type Item = Scalar;

    fn next(&mut self) -> Option<Scalar> {
        if self.done {
            return None;
        }
        let item = match &mut self.source {
            Source::Buffer {
                next,
                stride,
                remaining,
                read,
            } => {
                if *remaining == 0 {
                    None
                } else {
                    let value = unsafe { read(*next) };
                    *next = next.wrapping_add(*stride);
                    *remaining -= 1;
                    Some(value)
                }
            }
            Source::Cursor(pull) => pull(),
            Source::Slice(iter) => iter.next().copied(),
        };
        if item.is_none() {
            self.done = true;
        }
        item
    }
}

impl std::iter::FusedIterator for Items<'_> {}

impl fmt::Debug for Items<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Items")
            .field("kind", &self.kind)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

/// Typed view returned by [`Items::typed`].
pub struct Typed<'i, 'a, T> {
    items: &'i mut Items<'a>,
    _marker: PhantomData<T>,
}

impl<T: Primitive> Iterator for Typed<'_, '_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.items.next().and_then(T::from_scalar)
    }
}
