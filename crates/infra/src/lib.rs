//! Infrastructure: event storage, command dispatch, read models, configuration.

pub mod command_dispatcher;
pub mod config;
pub mod event_store;
pub mod invoice_sequence;
pub mod projections;
pub mod read_model;


pub use command_dispatcher::{CommandDispatcher, DispatchError};
pub use config::{BillingConfig, ConfigError};
pub use invoice_sequence::{InvoiceSequence, SequenceError};
