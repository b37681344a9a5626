//! Asynchronous completions as futures.

pub mod abi;
pub mod awaitable;
pub mod pending;

pub use abi::{complete, fail, start, Completion};
pub use awaitable::Awaitable;
pub use pending::{pending, Completer, OperationId, PendingOperation, PendingSet, Settle};
