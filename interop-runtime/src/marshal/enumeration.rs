//! Native enumerations crossing as `i32` discriminants.
//!
//! A discriminant is only turned into a variant after a checked lookup;
//! values outside the declared set are protocol violations, never
//! transmuted.

use std::fmt;

use crate::diagnostics;
use crate::error::{Error, Result};

/// A plain (non-error) native enumeration.
pub trait NativeEnum: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    const NAME: &'static str;

    /// Every variant, in declaration order.
    const VARIANTS: &'static [Self];

    fn from_raw(raw: i32) -> Option<Self>;

    fn to_raw(self) -> i32;

    fn name(self) -> &'static str;

    /// Checked conversion of a discriminant native code handed over.
    fn from_native(raw: i32) -> Result<Self> {
        Self::from_raw(raw).ok_or_else(|| {
            let detail = format!("{raw} is not a {} discriminant", Self::NAME);
            diagnostics::protocol_violation(detail.clone());
            Error::ProtocolViolation(detail)
        })
    }
}

/// Define a native enumeration and its [`NativeEnum`] impl.
///
/// Discriminants may be sparse and declared in any order.
///
/// ```
/// use interop_runtime::marshal::NativeEnum;
///
/// interop_runtime::native_enum! {
///     pub enum Switch as "Switch" {
///         Off = 0,
///         On = 5,
///     }
/// }
///
/// assert_eq!(Switch::from_native(5), Ok(Switch::On));
/// assert!(Switch::from_native(1).is_err());
/// ```
#[macro_export]
macro_rules! native_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident as $label:literal {
            $( $(#[$vmeta:meta])* $variant:ident = $value:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i32)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $( $(#[$vmeta])* $variant = $value ),+
        }

        impl $crate::marshal::NativeEnum for $name {
            const NAME: &'static str = $label;
            const VARIANTS: &'static [Self] = &[ $( Self::$variant ),+ ];

            fn from_raw(raw: i32) -> Option<Self> {
                match raw {
                    $( $value => Some(Self::$variant), )+
                    _ => None,
                }
            }

            fn to_raw(self) -> i32 {
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
