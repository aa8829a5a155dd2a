//! Value object trait: equality by value, not identity.
//!
//! Value objects have **no identity**; two value objects with the same
//! attributes are interchangeable. `Money` and `Currency` are the main ones in
//! this workspace.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. To "modify" one,
/// build a new one (e.g. `Money::checked_sub` returns a fresh `Money`).
///
/// ```ignore
/// let a = Money::new(dec!(100), Currency::usd())?;
/// let b = Money::new(dec!(100.00), Currency::usd())?;
/// assert_eq!(a, b); // equal by value
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
