use std::time::Duration;

use interop_runtime::marshal::{DurationMapping, Primitive};
use interop_runtime::registry::{HandleRegistry, Owned, ReleaseOutcome};
use interop_runtime::trampoline::ScalarCallback;
use interop_runtime::translate::translate;
use interop_runtime::{CallbackArena, CallbackGuard, CallbackToken, Error, Result};
use parking_lot::Mutex;

use crate::errors::FfiStatus;
use crate::native::callbacks::{
    self as native, testlib_cbsource_destroy, testlib_cbsource_fire_from_thread, testlib_cbsource_join,
    testlib_cbsource_new, testlib_cbsource_set_duration_interface, testlib_cbsource_set_duration_ms,
    testlib_cbsource_set_interface, testlib_cbsource_set_once, testlib_cbsource_set_value,
    testlib_cbsource_trigger_once,
};

const MILLIS: DurationMapping = DurationMapping::Milliseconds;

/// A native object that calls registered Rust closures.
///
/// The native side owns every callback struct it is given and announces
/// when it drops one; the guards kept here end registrations the native
/// side never got to see.
#[derive(Debug)]
pub struct CallbackSource {
    handle: Owned<native::CallbackSource>,
    interface: Mutex<Option<CallbackGuard<'static>>>,
    duration_interface: Mutex<Option<CallbackGuard<'static>>>,
}

impl CallbackSource {
    pub fn new() -> Result<Self> {
        let handle = HandleRegistry::global().acquire(|| testlib_cbsource_new(), testlib_cbsource_destroy)?;
        Ok(Self {
            handle,
            interface: Mutex::new(None),
            duration_interface: Mutex::new(None),
        })
    }

    /// Install the value interface, replacing any previous one.
    pub fn set_interface(&self, f: impl FnMut(u32) -> u32 + Send + 'static) -> Result<()> {
        let handle = self.handle.borrow()?;
        let guard = CallbackArena::global().register_scalar_fn(f);
        let callback = ScalarCallback::<u32>::new(&guard)?;
        translate::<FfiStatus>(
            unsafe { testlib_cbsource_set_interface(handle.as_ptr(), callback) },
            || None,
        )?;
        *self.interface.lock() = Some(guard);
        Ok(())
    }

    /// Install an interface that works in durations; native code sees whole
    /// milliseconds.
    pub fn set_duration_interface(&self, mut f: impl FnMut(Duration) -> Duration + Send + 'static) -> Result<()> {
        let handle = self.handle.borrow()?;
        let guard = CallbackArena::global().register_scalar(Box::new(move |value| {
            let duration = MILLIS.from_native(value)?;
            Ok(Some(MILLIS.to_native(f(duration))))
        }));
        let callback = ScalarCallback::<u64>::new(&guard)?;
        translate::<FfiStatus>(
            unsafe { testlib_cbsource_set_duration_interface(handle.as_ptr(), callback) },
            || None,
        )?;
        *self.duration_interface.lock() = Some(guard);
        Ok(())
    }

    /// Token of the current value interface.
    pub fn interface_token(&self) -> Option<CallbackToken> {
        self.interface.lock().as_ref().map(CallbackGuard::token)
    }

    /// Ask native code to pass `value` through the interface. Native code
    /// answers 0 when no interface is installed.
    pub fn set_value(&self, value: u32) -> Result<u32> {
        let handle = self.handle.borrow()?;
        Ok(unsafe { testlib_cbsource_set_value(handle.as_ptr(), value) })
    }

    pub fn set_duration(&self, value: Duration) -> Result<Duration> {
        let handle = self.handle.borrow()?;
        let ms = MILLIS
            .to_native(value)
            .get::<u64>()
            .ok_or_else(|| Error::InvalidDuration(format!("{value:?} as milliseconds")))?;
        let out = unsafe { testlib_cbsource_set_duration_ms(handle.as_ptr(), ms) };
        MILLIS.from_native(out.into_scalar())
    }

    /// Deliver `start..start + count` to the interface from a native thread.
    pub fn fire_from_thread(&self, start: u32, count: u32) -> Result<()> {
        let handle = self.handle.borrow()?;
        translate::<FfiStatus>(
            unsafe { testlib_cbsource_fire_from_thread(handle.as_ptr(), start, count) },
            || None,
        )
    }

    /// Wait for the native threads started by [`CallbackSource::fire_from_thread`].
    pub fn join(&self) -> Result<()> {
        let handle = self.handle.borrow()?;
        translate::<FfiStatus>(unsafe { testlib_cbsource_join(handle.as_ptr()) }, || None)
    }

    /// Install a callback that runs at most once, however often native code
    /// triggers it.
    pub fn set_once(&self, f: impl FnOnce(u32) + Send + 'static) -> Result<()> {
        let handle = self.handle.borrow()?;
        let guard = CallbackArena::global().register_once_fn(f);
        let callback = ScalarCallback::<u32>::new(&guard)?;
        translate::<FfiStatus>(unsafe { testlib_cbsource_set_once(handle.as_ptr(), callback) }, || None)?;
        guard.detach();
        Ok(())
    }

    pub fn trigger_once(&self, value: u32) -> Result<()> {
        let handle = self.handle.borrow()?;
        translate::<FfiStatus>(unsafe { testlib_cbsource_trigger_once(handle.as_ptr(), value) }, || None)
    }

    /// Destroy the native object. Registrations it still held end with it.
    pub fn release(&self) -> ReleaseOutcome {
        self.handle.release()
    }
}
