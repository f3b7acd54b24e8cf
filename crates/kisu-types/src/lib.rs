//! Foundation types for Kisu storage.
//!
//! This crate provides the value types shared by every storage crate. The
//! host runtime owns the real objects; these are the serializable shapes the
//! storage layer reads from and writes into host substrates.
//!
//! # Key Types
//!
//! - [`ItemStack`] -- An opaque, cloneable game item (type id, amount, metadata)
//! - [`ItemList`] -- A list of container slots, each holding a stack or nothing
//! - [`DynamicValue`] -- A scalar value accepted by the dynamic property substrate
//! - [`Vector3`] -- A world coordinate

pub mod error;
pub mod item;
pub mod location;
pub mod value;

pub use error::TypeError;
pub use item::{ItemList, ItemStack, MAX_STACK_AMOUNT};
pub use location::Vector3;
pub use value::DynamicValue;
