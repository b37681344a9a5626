//! Error types shared by every runtime component.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for runtime operations.
///
/// Double release has no variant: it is absorbed by the handle registry and
/// reported as [`ReleaseOutcome::AlreadyReleased`](crate::registry::ReleaseOutcome).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A null native address reached a marshaling read, write, or constructor.
    #[error("invalid address: null {what}")]
    InvalidAddress {
        /// What the address was supposed to point at.
        what: &'static str,
    },

    /// A native string was not valid UTF-8.
    #[error("native string is not valid UTF-8 (valid up to byte {valid_up_to})")]
    InvalidUtf8 {
        /// Length of the valid prefix.
        valid_up_to: usize,
    },

    /// Text with an embedded NUL cannot cross as a NUL-terminated string.
    #[error("string contains an interior NUL at byte {position}")]
    InteriorNul {
        /// Byte offset of the NUL.
        position: usize,
    },

    /// The wrapper's native handle was already released.
    #[error("native handle already released")]
    HandleReleased,

    /// The callback registration targeted by an invocation no longer exists.
    #[error("stale callback token {token}")]
    StaleCallback {
        /// Token the native side presented.
        token: u64,
    },

    /// A caller-supplied callback panicked; the panic was contained.
    #[error("callback {token} panicked")]
    CallbackPanicked {
        /// Token of the registration whose handler panicked.
        token: u64,
    },

    /// The native/runtime contract itself was broken.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Failure reported by the wrapped library's own status code.
    #[error(transparent)]
    Native(#[from] NativeError),

    /// The owning actor is stopping.
    #[error("owning actor is shutting down")]
    ShuttingDown,

    /// The completion was dropped before delivering a result.
    #[error("operation was dropped before it completed")]
    Cancelled,

    /// A duration could not be represented on the other side.
    #[error("duration out of range: {0}")]
    InvalidDuration(String),

    /// A worker thread could not be started.
    #[error("failed to spawn worker thread: {0}")]
    ThreadSpawn(String),

    /// Configuration could not be parsed or applied.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Recover the typed native error kind, if this error came from domain `D`.
    pub fn native_kind<D: crate::translate::ErrorDomain>(&self) -> Option<D> {
        match self {
            Error::Native(err) if err.domain == D::NAME => D::from_code(err.code),
            _ => None,
        }
    }

    /// Check if this error was produced by actor shutdown.
    pub fn is_shutting_down(&self) -> bool {
        matches!(self, Error::ShuttingDown)
    }

    /// Check if this is a protocol violation.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Error::ProtocolViolation(_))
    }

    /// Detail payload attached by the native library, if any.
    pub fn native_detail(&self) -> Option<&str> {
        match self {
            Error::Native(err) => err.detail.as_deref(),
            _ => None,
        }
    }
}

/// A native status code, tagged with the enumeration it belongs to.
///
/// The code is kept verbatim, including codes the domain does not recognise,
/// so two native failures are only equal when domain and code match.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{domain} failure {code} ({}){}", label(.name), suffix(.detail))]
pub struct NativeError {
    /// Name of the native error enumeration.
    pub domain: &'static str,
    /// Raw native code.
    pub code: i32,
    /// Variant name when the domain recognises the code.
    pub name: Option<&'static str>,
    /// Optional detail payload copied out of native memory.
    pub detail: Option<String>,
}

fn label(name: &Option<&'static str>) -> &'static str {
    name.unwrap_or("unrecognized code")
}

fn suffix(detail: &Option<String>) -> String {
    detail
        .as_deref()
        .map(|d| format!(": {d}"))
        .unwrap_or_default()
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_error_display_includes_detail() {
        let err = Error::Native(NativeError {
            domain: "PasswordError",
            code: 1,
            name: Some("BadPassword"),
            detail: Some("rejected".to_string()),
        });
        assert_eq!(
            err.to_string(),
            "PasswordError failure 1 (BadPassword): rejected"
        );
        assert_eq!(err.native_detail(), Some("rejected"));
    }

    #[test]
    fn native_error_display_unknown_code() {
        let err = NativeError {
            domain: "MathError",
            code: 77,
            name: None,
            detail: None,
        };
        assert_eq!(err.to_string(), "MathError failure 77 (unrecognized code)");
    }

    #[test]
    fn predicates() {
        assert!(Error::ShuttingDown.is_shutting_down());
        assert!(!Error::Cancelled.is_shutting_down());
        assert!(Error::ProtocolViolation("x".into()).is_protocol_violation());
    }
}
