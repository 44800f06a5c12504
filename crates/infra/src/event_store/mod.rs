//! Append-only event store boundary.
//!
//! Streams are keyed by `(portfolio, aggregate)`. Nothing here assumes a storage
//! engine; the in-memory implementation backs the application and the tests.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
