//! `rentease-core`: domain building blocks shared by the billing and leasing crates.
//!
//! Nothing in here performs IO. Aggregates decide, events record, infrastructure stores.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, PortfolioId, UserId};
pub use value_object::ValueObject;
