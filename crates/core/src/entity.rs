//! Entity trait: things with identity that persist across state changes.
//!
//! A `Product` keeps being the same product while its stock moves; an `Order`
//! keeps being the same order while its status advances. Equality of entities
//! is equality of identifiers, never of field values.

/// Marker + minimal interface for domain entities.
pub trait Entity {
    /// Strongly-typed identifier, unique within the entity's kind.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;
}
