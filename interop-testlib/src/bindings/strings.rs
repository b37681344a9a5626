use interop_runtime::marshal::string::{self, OwnedNativeStr};
use interop_runtime::registry::{HandleRegistry, Owned, ReleaseOutcome};
use interop_runtime::{Error, Result};

use crate::native::strings::{
    self as native, testlib_free_string, testlib_string_echo_destroy, testlib_string_echo_echo,
    testlib_string_echo_new, testlib_string_length, testlib_version,
};

/// Echoes strings through a native buffer.
#[derive(Debug)]
pub struct StringEcho {
    handle: Owned<native::StringEcho>,
}

impl StringEcho {
    pub fn new() -> Result<Self> {
        let handle = HandleRegistry::global().acquire(|| testlib_string_echo_new(), testlib_string_echo_destroy)?;
        Ok(Self { handle })
    }

    /// Send `text` to the native side and copy back what it returns.
    pub fn echo(&self, text: &str) -> Result<String> {
        let handle = self.handle.borrow()?;
        let input = string::to_native(text)?;
        // The returned buffer belongs to the instance; copy it out while
        // the borrow keeps the instance alive.
        let out = unsafe { testlib_string_echo_echo(handle.as_ptr(), input.as_ptr()) };
        let echoed = unsafe { string::from_native(out) };
        string::release(input);
        echoed
    }

    pub fn release(&self) -> ReleaseOutcome {
        self.handle.release()
    }
}

/// Byte length of `text` as measured by the native side.
pub fn string_length(text: &str) -> Result<u32> {
    let input = string::to_native(text)?;
    let len = unsafe { testlib_string_length(input.as_ptr()) };
    if len == 0 && input.byte_len() != 0 {
        return Err(Error::ProtocolViolation(format!(
            "native length 0 for a {}-byte string",
            input.byte_len()
        )));
    }
    Ok(len)
}

/// Version string allocated by the library and freed with its own allocator.
pub fn version() -> Result<String> {
    unsafe { OwnedNativeStr::take(testlib_version(), testlib_free_string) }
}
