//! `arrears-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives shared by every collection
//! module: identifiers, money, the error taxonomy and the aggregate traits.
//! No infrastructure concerns live here.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod money;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::AggregateId;
pub use money::{Currency, Money};
pub use value_object::ValueObject;
