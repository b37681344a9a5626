//! Values returned by pointer into the instance.

#[derive(Default)]
pub struct PrimitivePointers {
    bool_value: bool,
    u8_value: u8,
    i16_value: i16,
    f32_value: f32,
    f64_value: f64,
}

#[unsafe(no_mangle)]
pub extern "C" fn testlib_primitives_new() -> *mut PrimitivePointers {
    Box::into_raw(Box::default())
}

/// # Safety
///
/// `instance` must come from `testlib_primitives_new` and not be destroyed yet.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn testlib_primitives_destroy(instance: *mut PrimitivePointers) {
    if !instance.is_null() {
        drop(unsafe { Box::from_raw(instance) });
    }
}

macro_rules! pointer_getter {
    ($name:ident, $field:ident, $ty:ty) => {
        /// Store `value` in the instance and return a pointer to the stored
        /// copy, valid until the next call or destruction. Null for a null
        /// instance.
        ///
        /// # Safety
        ///
        /// `instance` must be null or live.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $name(instance: *mut PrimitivePointers, value: $ty) -> *const $ty {
            match unsafe { instance.as_mut() } {
                Some(instance) => {
                    instance.$field = value;
                    &instance.$field
                }
                None => std::ptr::null(),
            }
        }
    };
}

pointer_getter!(testlib_primitives_get_bool, bool_value, bool);
pointer_getter!(testlib_primitives_get_u8, u8_value, u8);
pointer_getter!(testlib_primitives_get_i16, i16_value, i16);
pointer_getter!(testlib_primitives_get_f32, f32_value, f32);
pointer_getter!(testlib_primitives_get_f64, f64_value, f64);
