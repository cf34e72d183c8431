//! Value object trait: equality by value, not identity.
//!
//! Value objects are immutable and defined entirely by their attribute values;
//! two value objects with the same values are equal. `Money { cents: 100 }` is
//! a value object, `Product { id, .. }` is an entity.

/// Marker trait for value objects.
///
/// Implementations should be immutable: to "modify" a value object, construct
/// a new one with the new values.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
