//! A small native library and its bindings.
//!
//! [`native`] is the library itself: `testlib_*` functions with a flat C ABI,
//! raw pointers, function-pointer callbacks and integer status codes.
//! [`bindings`] wraps it the way generated code would, one runtime call and
//! one native call per method, with every conversion going through
//! `interop_runtime`.

pub mod bindings;
pub mod enums;
pub mod errors;
pub mod native;

pub use bindings::{
    collect_characters, collect_int32_range, echo_disjoint, echo_one_to_six, echo_single,
    echo_zero_to_five, get_duration_value, get_u32_value, invoke_characters, invoke_int32_range,
    next_one_to_six, special_number, string_length, version, CallbackSource, Counter,
    DefaultedInterface, PrimitivePointers, StringCollection, StringEcho, ThreadClass,
};
pub use enums::{EnumDisjoint, EnumOneToSix, EnumSingle, EnumZeroToFive};
pub use errors::{FfiStatus, MathError, PasswordError};
