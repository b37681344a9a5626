use interop_runtime::marshal::primitive;
use interop_runtime::registry::{HandleRegistry, Owned};
use interop_runtime::Result;

use crate::native::primitives::{
    self as native, testlib_primitives_destroy, testlib_primitives_get_bool, testlib_primitives_get_f32,
    testlib_primitives_get_f64, testlib_primitives_get_i16, testlib_primitives_get_u8, testlib_primitives_new,
};

/// Round-trips scalars through native memory: each getter stores its
/// argument natively and reads it back through the returned pointer.
#[derive(Debug)]
pub struct PrimitivePointers {
    handle: Owned<native::PrimitivePointers>,
}

macro_rules! getter {
    ($name:ident, $native:ident, $ty:ty) => {
        pub fn $name(&self, value: $ty) -> Result<$ty> {
            let handle = self.handle.borrow()?;
            unsafe { primitive::read($native(handle.as_ptr(), value)) }
        }
    };
}

impl PrimitivePointers {
    pub fn new() -> Result<Self> {
        let handle = HandleRegistry::global().acquire(|| testlib_primitives_new(), testlib_primitives_destroy)?;
        Ok(Self { handle })
    }

    getter!(get_bool, testlib_primitives_get_bool, bool);
    getter!(get_u8, testlib_primitives_get_u8, u8);
    getter!(get_i16, testlib_primitives_get_i16, i16);
    getter!(get_f32, testlib_primitives_get_f32, f32);
    getter!(get_f64, testlib_primitives_get_f64, f64);
}
