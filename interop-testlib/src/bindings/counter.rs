use interop_runtime::registry::{HandleRegistry, Owned, ReleaseOutcome};
use interop_runtime::translate::translate;
use interop_runtime::Result;

use crate::errors::FfiStatus;
use crate::native::counter::{
    self as native, testlib_counter_destroy, testlib_counter_get_value, testlib_counter_increment,
    testlib_counter_new,
};

/// A native counter.
#[derive(Debug)]
pub struct Counter {
    handle: Owned<native::Counter>,
}

impl Counter {
    pub fn new(initial: u32) -> Result<Self> {
        Self::with_registry(&HandleRegistry::global(), initial)
    }

    /// Count the construction in `registry` instead of the global counters.
    pub fn with_registry(registry: &HandleRegistry, initial: u32) -> Result<Self> {
        let handle = registry.acquire(|| testlib_counter_new(initial), testlib_counter_destroy)?;
        Ok(Self { handle })
    }

    pub fn value(&self) -> Result<u32> {
        let handle = self.handle.borrow()?;
        Ok(unsafe { testlib_counter_get_value(handle.as_ptr()) })
    }

    pub fn increment(&self) -> Result<()> {
        let handle = self.handle.borrow()?;
        translate::<FfiStatus>(unsafe { testlib_counter_increment(handle.as_ptr()) }, || None)
    }

    /// Destroy the native counter now. Safe to call more than once.
    pub fn release(&self) -> ReleaseOutcome {
        self.handle.release()
    }
}
