use interop_runtime::marshal::string;
use interop_runtime::translate::call_with_out;
use interop_runtime::Result;

use crate::errors::PasswordError;
use crate::native::special::{testlib_last_error_detail, testlib_special_number};

/// The special number, if `password` is right.
///
/// Failures carry a [`PasswordError`] and the library's detail message.
pub fn special_number(password: &str) -> Result<u32> {
    let password = string::to_native(password)?;
    call_with_out::<PasswordError, u32>(
        |out| unsafe { testlib_special_number(password.as_ptr(), out) },
        || unsafe { string::from_native(testlib_last_error_detail()) }.ok(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn right_password() {
        assert_eq!(special_number("solarwinds123").unwrap(), 42);
    }

    #[test]
    fn wrong_password_carries_kind_and_detail() {
        let err = special_number("hunter2").unwrap_err();
        assert_eq!(err.native_kind::<PasswordError>(), Some(PasswordError::BadPassword));
        assert_eq!(err.native_detail(), Some("password rejected"));
    }
}
