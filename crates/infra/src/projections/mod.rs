//! Read model builders.
//!
//! Each projection consumes published envelopes, skips redeliveries via per-stream
//! cursors, and can be rebuilt from the event store at any time.

pub mod cursor;
pub mod invoices;
pub mod properties;
pub mod tenants;

pub use cursor::{ProjectionError, StreamCursors};
pub use invoices::{InvoiceView, InvoicesProjection};
pub use properties::{PropertiesProjection, PropertyView, occupancy_rate};
pub use tenants::{TenantDirectoryProjection, TenantFilter, TenantView};
