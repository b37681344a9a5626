//! Conversions between native memory and Rust values.

pub mod collection;
pub mod duration;
pub mod enumeration;
pub mod primitive;
pub mod scalar;
pub mod string;

pub use collection::{CollectionAbi, CollectionItem, NativeCollection};
pub use duration::DurationMapping;
pub use enumeration::NativeEnum;
pub use scalar::{Primitive, Scalar, ScalarKind};
pub use string::{from_native, to_native, NativeString, OwnedNativeStr};
