use interop_runtime::marshal::NativeEnum;
use interop_runtime::Result;

use crate::enums::{EnumDisjoint, EnumOneToSix, EnumSingle, EnumZeroToFive};
use crate::native::enums::{
    testlib_enum_disjoint_echo, testlib_enum_one_to_six_echo, testlib_enum_one_to_six_next,
    testlib_enum_single_echo, testlib_enum_zero_to_five_echo,
};

fn through<E: NativeEnum>(native: extern "C" fn(i32) -> i32, value: E) -> Result<E> {
    E::from_native(native(value.to_raw()))
}

pub fn echo_zero_to_five(value: EnumZeroToFive) -> Result<EnumZeroToFive> {
    through(testlib_enum_zero_to_five_echo, value)
}

pub fn echo_one_to_six(value: EnumOneToSix) -> Result<EnumOneToSix> {
    through(testlib_enum_one_to_six_echo, value)
}

/// The variant after `value`. There is none after `Six`, which surfaces as
/// a protocol violation.
pub fn next_one_to_six(value: EnumOneToSix) -> Result<EnumOneToSix> {
    through(testlib_enum_one_to_six_next, value)
}

pub fn echo_disjoint(value: EnumDisjoint) -> Result<EnumDisjoint> {
    through(testlib_enum_disjoint_echo, value)
}

pub fn echo_single(value: EnumSingle) -> Result<EnumSingle> {
    through(testlib_enum_single_echo, value)
}
