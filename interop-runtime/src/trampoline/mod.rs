//! Native-to-caller callback dispatch.

pub mod abi;
pub mod arena;
pub mod items;

pub use abi::{CallbackAbi, CursorCallback, ItemsCallback, OptionalCallback, ScalarCallback};
pub use arena::{CallbackArena, CallbackGuard, CallbackToken, CollectionShape, RegistrationKind};
pub use items::Items;
