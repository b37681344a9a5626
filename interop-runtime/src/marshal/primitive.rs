//! Reads and writes of fixed-width scalars through native pointers.
//!
//! Every read is an exact bit copy (IEEE-754 for floats, two's complement
//! for signed integers); nothing is rounded or range-checked. The only
//! failure is a null address.

use crate::error::{Error, Result};
use crate::marshal::scalar::Primitive;

/// Read a value of type `T` from native memory.
///
/// # Safety
///
/// If non-null, `ptr` must be valid for reads of `size_of::<T>()` bytes.
/// Alignment is not required.
pub unsafe fn read<T: Primitive>(ptr: *const T) -> Result<T> {
    if ptr.is_null() {
        return Err(Error::InvalidAddress {
            what: T::KIND.name(),
        });
    }
    Ok(unsafe { T::read_raw(ptr) })
}

/// Write a value of type `T` into native memory (out-parameters).
///
/// # Safety
///
/// If non-null, `ptr` must be valid for writes of `size_of::<T>()` bytes.
pub unsafe fn write<T: Primitive>(ptr: *mut T, value: T) -> Result<()> {
    if ptr.is_null() {
        return Err(Error::InvalidAddress {
            what: T::KIND.name(),
        });
    }
    unsafe { std::ptr::write_unaligned(ptr, value) };
    Ok(())
}

macro_rules! read_fns {
    ($($name:ident => $ty:ty),+ $(,)?) => {
        $(
            #[doc = concat!("Read a `", stringify!($ty), "` from native memory.")]
            ///
            /// # Safety
            ///
            /// See [`read`].
            #[inline]
            pub unsafe fn $name(ptr: *const $ty) -> Result<$ty> {
                unsafe { read(ptr) }
            }
        )+
    };
}

read_fns! {
    read_bool => bool,
    read_u8 => u8,
    read_i8 => i8,
    read_u16 => u16,
    read_i16 => i16,
    read_u32 => u32,
    read_i32 => i32,
    read_u64 => u64,
    read_i64 => i64,
    read_f32 => f32,
    read_f64 => f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo<T: Primitive + PartialEq + std::fmt::Debug>(value: T) -> T {
        let mut slot = T::default();
        unsafe {
            write(&mut slot, value).unwrap();
            read(&slot).unwrap()
        }
    }

    #[test]
    fn unsigned_byte_boundaries() {
        for v in [0u8, 1, 254, 255] {
            assert_eq!(echo(v), v);
        }
    }

    #[test]
    fn signed_boundaries() {
        assert_eq!(echo(i8::MIN), i8::MIN);
        assert_eq!(echo(i8::MAX), i8::MAX);
        assert_eq!(echo(i16::MIN), i16::MIN);
        assert_eq!(echo(i16::MAX), i16::MAX);
        assert_eq!(echo(i32::MIN), i32::MIN);
        assert_eq!(echo(i64::MAX), i64::MAX);
        assert_eq!(echo(u16::MAX), u16::MAX);
        assert_eq!(echo(u32::MAX), u32::MAX);
        assert_eq!(echo(u64::MAX), u64::MAX);
    }

    #[test]
    fn floats_keep_bit_patterns() {
        let nan = f32::from_bits(0x7fc0_0001);
        assert_eq!(echo(nan).to_bits(), 0x7fc0_0001);
        assert_eq!(echo(-0.0f64).to_bits(), (-0.0f64).to_bits());
        assert_eq!(echo(f64::MIN_POSITIVE), f64::MIN_POSITIVE);
        assert_eq!(echo(f32::INFINITY), f32::INFINITY);
    }

    #[test]
    fn null_is_invalid_address() {
        let err = unsafe { read_u16(std::ptr::null()) }.unwrap_err();
        assert_eq!(err, Error::InvalidAddress { what: "u16" });

        let err = unsafe { write::<f64>(std::ptr::null_mut(), 1.0) }.unwrap_err();
        assert_eq!(err, Error::InvalidAddress { what: "f64" });
    }

    #[test]
    fn unaligned_reads() {
        let bytes = [0u8, 0x78, 0x56, 0x34, 0x12];
        let ptr = unsafe { bytes.as_ptr().add(1) }.cast::<u32>();
        assert_eq!(unsafe { read_u32(ptr) }.unwrap(), u32::from_ne_bytes([0x78, 0x56, 0x34, 0x12]));
    }

    #[test]
    fn bool_reads() {
        assert!(unsafe { read_bool(&true) }.unwrap());
        assert!(!unsafe { read_bool(&false) }.unwrap());
    }
}
