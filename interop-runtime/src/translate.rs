//! Native status codes to typed failures.
//!
//! Every native error enumeration gets its own [`ErrorDomain`] impl (usually
//! through [`error_domain!`](crate::error_domain)). Translation keeps the
//! domain and the exact code, so failures from different enumerations never
//! collapse into one generic error.

use std::fmt;

use crate::error::{Error, NativeError, Result};

/// The status code every domain uses for success.
pub const SUCCESS: i32 = 0;

/// A native error enumeration.
pub trait ErrorDomain: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    /// Enumeration name, used to tag translated errors.
    const NAME: &'static str;

    /// Map a non-zero native code to a variant.
    fn from_code(code: i32) -> Option<Self>;

    /// The native code of this variant.
    fn code(self) -> i32;

    /// Variant name.
    fn name(self) -> &'static str;
}

/// Build the typed failure for a non-success `code`.
pub fn native_error<D: ErrorDomain>(code: i32, detail: Option<String>) -> NativeError {
    NativeError {
        domain: D::NAME,
        code,
        name: D::from_code(code).map(D::name),
        detail,
    }
}

/// Build a failure from a typed variant.
pub fn error_from_kind<D: ErrorDomain>(kind: D) -> Error {
    Error::Native(native_error::<D>(kind.code(), None))
}

/// Translate a status code: `SUCCESS` is `Ok`, anything else a typed failure.
///
/// `detail` is only consulted on failure, so it may read native
/// thread-local error state.
pub fn translate<D: ErrorDomain>(code: i32, detail: impl FnOnce() -> Option<String>) -> Result<()> {
    if code == SUCCESS {
        return Ok(());
    }
    let err = native_error::<D>(code, detail());
    if err.name.is_none() {
        tracing::warn!(domain = D::NAME, code, "native code outside its enumeration");
    }
    Err(Error::Native(err))
}

/// Call a native function that returns a status code and writes its value
/// through an out-parameter.
///
/// Exactly one of "value returned" or "failure signaled" holds: the out
/// value is only read when the call reports success.
pub fn call_with_out<D, T>(
    call: impl FnOnce(*mut T) -> i32,
    detail: impl FnOnce() -> Option<String>,
) -> Result<T>
where
    D: ErrorDomain,
    T: Copy + Default,
{
    let mut out = T::default();
    let code = call(&mut out);
    translate::<D>(code, detail)?;
    Ok(out)
}

/// Define a native error enumeration and its [`ErrorDomain`] impl.
///
/// ```
/// interop_runtime::error_domain! {
///     /// Errors from the math routines.
///     pub enum MathError as "MathError" {
///         /// Something overflowed.
///         Overflow = 1,
///         DivideByZero = 2,
///     }
/// }
/// # use interop_runtime::translate::ErrorDomain;
/// assert_eq!(MathError::from_code(2), Some(MathError::DivideByZero));
/// ```
#[macro_export]
macro_rules! error_domain {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident as $label:literal {
            $( $(#[$vmeta:meta])* $variant:ident = $code:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i32)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $( $(#[$vmeta])* $variant = $code ),+
        }

        impl $crate::translate::ErrorDomain for $name {
            const NAME: &'static str = $label;

            fn from_code(code: i32) -> Option<Self> {
                match code {
                    $( $code => Some(Self::$variant), )+
                    _ => None,
                }
            }

            fn code(self) -> i32 {
                self as i32
            }

            fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => stringify!($variant), )+
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::error_domain! {
        enum Alpha as "Alpha" {
            Broken = 1,
            Dropped = 2,
        }
    }

    crate::error_domain! {
        enum Beta as "Beta" {
            Broken = 1,
        }
    }

    #[test]
    fn success_is_ok() {
        assert!(translate::<Alpha>(SUCCESS, || panic!("detail read on success")).is_ok());
    }

    #[test]
    fn codes_keep_their_domain() {
        let err = translate::<Alpha>(1, || None).unwrap_err();
        assert_eq!(err.native_kind::<Alpha>(), Some(Alpha::Broken));
        assert_eq!(err.native_kind::<Beta>(), None);

        let other = translate::<Beta>(1, || None).unwrap_err();
        assert_ne!(err, other);
    }

    #[test]
    fn distinct_codes_stay_distinct() {
        let a = translate::<Alpha>(1, || None).unwrap_err();
        let b = translate::<Alpha>(2, || None).unwrap_err();
        assert_eq!(b.native_kind::<Alpha>(), Some(Alpha::Dropped));
        assert_ne!(a, b);
    }

    #[test]
    fn unknown_code_is_preserved() {
        let err = translate::<Alpha>(99, || Some("mystery".into())).unwrap_err();
        match err {
            Error::Native(native) => {
                assert_eq!(native.code, 99);
                assert_eq!(native.name, None);
                assert_eq!(native.detail.as_deref(), Some("mystery"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn out_value_only_on_success() {
        let ok = call_with_out::<Alpha, u32>(
            |out| {
                unsafe { *out = 42 };
                SUCCESS
            },
            || None,
        );
        assert_eq!(ok, Ok(42));

        let failed = call_with_out::<Alpha, u32>(
            |out| {
                unsafe { *out = 7 };
                2
            },
            || Some("dropped".into()),
        );
        let err = failed.unwrap_err();
        assert_eq!(err.native_kind::<Alpha>(), Some(Alpha::Dropped));
        assert_eq!(err.native_detail(), Some("dropped"));
    }

    #[test]
    fn error_from_kind_round_trips() {
        let err = error_from_kind(Beta::Broken);
        assert_eq!(err.native_kind::<Beta>(), Some(Beta::Broken));
    }
}
