//! Enumerations crossing as raw `i32` discriminants.
//!
//! The library does not validate what it echoes; checking is the caller's
//! side of the contract.

#[unsafe(no_mangle)]
pub extern "C" fn testlib_enum_zero_to_five_echo(value: i32) -> i32 {
    value
}

#[unsafe(no_mangle)]
pub extern "C" fn testlib_enum_one_to_six_echo(value: i32) -> i32 {
    value
}

/// The discriminant after `value`, whether or not it names a variant.
#[unsafe(no_mangle)]
pub extern "C" fn testlib_enum_one_to_six_next(value: i32) -> i32 {
    value.wrapping_add(1)
}

#[unsafe(no_mangle)]
pub extern "C" fn testlib_enum_disjoint_echo(value: i32) -> i32 {
    value
}

#[unsafe(no_mangle)]
pub extern "C" fn testlib_enum_single_echo(value: i32) -> i32 {
    value
}
