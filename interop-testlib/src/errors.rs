//! Native error enumerations.

interop_runtime::error_domain! {
    /// Status codes returned by `testlib_*` functions that can only fail on
    /// bad arguments or lifecycle errors. `0` is success.
    pub enum FfiStatus as "FfiStatus" {
        /// A null or destroyed instance pointer.
        InvalidHandle = 1,
        /// A required argument was null or not valid UTF-8.
        InvalidArgument = 2,
        /// The instance's worker no longer accepts work.
        ShuttingDown = 3,
        Internal = 4,
    }
}

interop_runtime::error_domain! {
    /// Failures of the thread class arithmetic.
    pub enum MathError as "MathError" {
        MathIsBroke = 1,
        /// The operation was dropped without an answer.
        Dropped = 2,
    }
}

interop_runtime::error_domain! {
    pub enum PasswordError as "PasswordError" {
        BadPassword = 1,
        NullArgument = 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use interop_runtime::translate::{translate, ErrorDomain};

    #[test]
    fn same_code_different_domains() {
        let math = translate::<MathError>(1, || None).unwrap_err();
        let password = translate::<PasswordError>(1, || None).unwrap_err();
        assert_ne!(math, password);
        assert_eq!(math.native_kind::<MathError>(), Some(MathError::MathIsBroke));
        assert_eq!(math.native_kind::<PasswordError>(), None);
        assert_eq!(password.native_kind::<PasswordError>(), Some(PasswordError::BadPassword));
    }

    #[test]
    fn names() {
        assert_eq!(MathError::Dropped.name(), "Dropped");
        assert_eq!(FfiStatus::from_code(3), Some(FfiStatus::ShuttingDown));
        assert_eq!(FfiStatus::from_code(0), None);
    }
}
