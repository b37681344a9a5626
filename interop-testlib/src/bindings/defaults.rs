use std::time::Duration;

use interop_runtime::marshal::{DurationMapping, Primitive};
use interop_runtime::trampoline::OptionalCallback;
use interop_runtime::{CallbackArena, Result};

use crate::native::defaults::{testlib_defaulted_get_duration_ms, testlib_defaulted_get_u32};

pub const DEFAULT_U32_VALUE: u32 = 42;
pub const DEFAULT_DURATION: Duration = Duration::from_millis(42);

const MILLIS: DurationMapping = DurationMapping::Milliseconds;

/// A caller interface whose methods all have defaults; implement only the
/// ones that should differ.
pub trait DefaultedInterface: Send + 'static {
    fn get_u32_value(&mut self) -> u32 {
        DEFAULT_U32_VALUE
    }

    /// Crosses as whole milliseconds.
    fn get_duration(&mut self) -> Duration {
        DEFAULT_DURATION
    }
}

/// Let native code query `interface` for its value.
pub fn get_u32_value(mut interface: impl DefaultedInterface) -> Result<u32> {
    let guard = CallbackArena::global().register_optional_fn(move |_: u32| Some(interface.get_u32_value()));
    let callback = OptionalCallback::<u32>::new(&guard)?;
    let value = testlib_defaulted_get_u32(callback);
    // The native side released the callback before returning.
    guard.detach();
    Ok(value)
}

pub fn get_duration_value(mut interface: impl DefaultedInterface) -> Result<Duration> {
    let guard = CallbackArena::global()
        .register_scalar(Box::new(move |_| Ok(Some(MILLIS.to_native(interface.get_duration())))));
    let callback = OptionalCallback::<u64>::new(&guard)?;
    let ms = testlib_defaulted_get_duration_ms(callback);
    guard.detach();
    MILLIS.from_native(ms.into_scalar())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Untouched;

    impl DefaultedInterface for Untouched {}

    struct Counting(u32);

    impl DefaultedInterface for Counting {
        fn get_u32_value(&mut self) -> u32 {
            self.0 += 1;
            self.0
        }
    }

    #[test]
    fn unimplemented_methods_use_their_defaults() {
        assert_eq!(get_u32_value(Untouched).unwrap(), DEFAULT_U32_VALUE);
        assert_eq!(get_duration_value(Untouched).unwrap(), DEFAULT_DURATION);
    }

    #[test]
    fn overridden_method_wins_and_the_other_keeps_its_default() {
        assert_eq!(get_u32_value(Counting(6)).unwrap(), 7);
        assert_eq!(get_duration_value(Counting(6)).unwrap(), DEFAULT_DURATION);
    }
}
