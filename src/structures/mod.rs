//! Container library shared by every subsystem.
//!
//! - [`TaggedValue`]: reference-counted, type-tagged value handle
//! - [`DynamicArray`]: ordered sequence of shared values
//! - [`AssociativeMap`]: string-keyed open-addressing map with
//!   insertion-ordered iteration

mod array;
mod map;
mod value;

pub use array::DynamicArray;
pub use map::{increment_capacity, AssociativeMap};
pub use value::{SharedObject, TaggedValue, ValueKind};
