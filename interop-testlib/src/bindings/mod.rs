//! Safe wrappers over [`crate::native`].
//!
//! Each wrapper owns its native object through the runtime's handle
//! registry; callbacks go through the global callback arena, completions
//! through the async bridge, status codes through the error translator.

mod callbacks;
mod collections;
mod counter;
mod defaults;
mod enums;
mod primitives;
mod special;
mod strings;
mod thread_class;

pub use callbacks::CallbackSource;
pub use collections::{
    collect_characters, collect_int32_range, invoke_characters, invoke_int32_range, StringCollection,
};
pub use counter::Counter;
pub use defaults::{get_duration_value, get_u32_value, DefaultedInterface, DEFAULT_DURATION, DEFAULT_U32_VALUE};
pub use enums::{echo_disjoint, echo_one_to_six, echo_single, echo_zero_to_five, next_one_to_six};
pub use primitives::PrimitivePointers;
pub use special::special_number;
pub use strings::{string_length, version, StringEcho};
pub use thread_class::ThreadClass;
