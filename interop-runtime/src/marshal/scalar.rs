//! Fixed-width scalar values as a tagged variant.
//!
//! Callback payloads cross the trampoline as [`Scalar`] so a registration can
//! check the payload kind before any caller code runs.

use std::fmt;

/// Kind tag of a [`Scalar`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Bool,
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

impl ScalarKind {
    /// Lower-case type name, as used in log output.
    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::Bool => "bool",
            ScalarKind::U8 => "u8",
            ScalarKind::I8 => "i8",
            ScalarKind::U16 => "u16",
            ScalarKind::I16 => "i16",
            ScalarKind::U32 => "u32",
            ScalarKind::I32 => "i32",
            ScalarKind::U64 => "u64",
            ScalarKind::I64 => "i64",
            ScalarKind::F32 => "f32",
            ScalarKind::F64 => "f64",
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single fixed-width value read from or destined for native memory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Bool(bool),
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl Scalar {
    /// The kind tag of this value.
    pub fn kind(&self) -> ScalarKind {
        match self {
            Scalar::Bool(_) => ScalarKind::Bool,
            Scalar::U8(_) => ScalarKind::U8,
            Scalar::I8(_) => ScalarKind::I8,
            Scalar::U16(_) => ScalarKind::U16,
            Scalar::I16(_) => ScalarKind::I16,
            Scalar::U32(_) => ScalarKind::U32,
            Scalar::I32(_) => ScalarKind::I32,
            Scalar::U64(_) => ScalarKind::U64,
            Scalar::I64(_) => ScalarKind::I64,
            Scalar::F32(_) => ScalarKind::F32,
            Scalar::F64(_) => ScalarKind::F64,
        }
    }

    /// Extract a typed value; `None` on a kind mismatch.
    pub fn get<T: Primitive>(self) -> Option<T> {
        T::from_scalar(self)
    }
}

mod sealed {
    pub trait Sealed {}
}

/// A type with a fixed-width native representation.
///
/// Sealed: only the scalar types of the C ABI implement it.
pub trait Primitive: sealed::Sealed + Copy + Default + Send + Sync + 'static {
    /// Kind tag for this type.
    const KIND: ScalarKind;

    /// Wrap in a [`Scalar`].
    fn into_scalar(self) -> Scalar;

    /// Unwrap from a [`Scalar`] of the same kind.
    fn from_scalar(value: Scalar) -> Option<Self>;

    /// Bit-copy a value out of native memory.
    ///
    /// # Safety
    ///
    /// `ptr` must be non-null and valid for a read of `size_of::<Self>()`
    /// bytes. No alignment is required.
    #[doc(hidden)]
    unsafe fn read_raw(ptr: *const Self) -> Self {
        unsafe { std::ptr::read_unaligned(ptr) }
    }
}

macro_rules! primitive {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}

            impl Primitive for $ty {
                const KIND: ScalarKind = ScalarKind::$variant;

                fn into_scalar(self) -> Scalar {
                    Scalar::$variant(self)
                }

                fn from_scalar(value: Scalar) -> Option<Self> {
                    match value {
                        Scalar::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            }

            impl From<$ty> for Scalar {
                fn from(value: $ty) -> Self {
                    Scalar::$variant(value)
                }
            }
        )+
    };
}

primitive! {
    u8 => U8,
    i8 => I8,
    u16 => U16,
    i16 => I16,
    u32 => U32,
    i32 => I32,
    u64 => U64,
    i64 => I64,
    f32 => F32,
    f64 => F64,
}

impl sealed::Sealed for bool {}

impl Primitive for bool {
    const KIND: ScalarKind = ScalarKind::Bool;

    fn into_scalar(self) -> Scalar {
        Scalar::Bool(self)
    }

    fn from_scalar(value: Scalar) -> Option<Self> {
        match value {
            Scalar::Bool(v) => Some(v),
            _ => None,
        }
    }

    // Native code may store any byte in a boolean slot.
    unsafe fn read_raw(ptr: *const Self) -> Self {
        unsafe { std::ptr::read_unaligned(ptr.cast::<u8>()) != 0 }
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(Scalar::from(5u8).kind(), ScalarKind::U8);
        assert_eq!(Scalar::from(-5i16).kind(), ScalarKind::I16);
        assert_eq!(Scalar::from(true).kind(), ScalarKind::Bool);
        assert_eq!(Scalar::from(1.5f64).kind(), ScalarKind::F64);
    }

    #[test]
    fn get_rejects_other_kinds() {
        assert_eq!(Scalar::U32(7).get::<u32>(), Some(7));
        assert_eq!(Scalar::U32(7).get::<u64>(), None);
        assert_eq!(Scalar::I32(-1).get::<u32>(), None);
    }

    #[test]
    fn bool_reads_any_nonzero_byte_as_true() {
        let raw: u8 = 0x80;
        let value = unsafe { bool::read_raw((&raw as *const u8).cast::<bool>()) };
        assert!(value);
    }
}
