//! Aggregate traits for the event-sourced landlord records (invoices, tenants, properties).
//!
//! ## Model
//!
//! Every record the landlord changes over time is an aggregate whose state is the fold of
//! its own event stream:
//!
//! ```text
//! state_n = apply(apply(empty, e1), ... en)
//! ```
//!
//! - **Decisions are pure**: `handle` sees the current state and a command and answers
//!   with events or a [`DomainError`]. It never reads a clock, a store or the environment;
//!   "now" and every policy arrive inside the command.
//! - **Evolution is total**: `apply` cannot fail. An event is a fact that was already
//!   accepted, so rejecting it on replay would make the stream unreadable.
//! - **Version = events applied**: a fresh aggregate is at 0, and the dispatcher appends
//!   with `ExpectedVersion::Exact(version)` so two writers cannot both extend a stream.
//!
//! A command that changes nothing (paying an invoice again with the same payment,
//! setting a tenant's status to what it already is) returns an empty event list
//! rather than an error.

use crate::error::{DomainError, DomainResult};

/// Identity and version of an aggregate root, usable without naming command or event types.
pub trait AggregateRoot {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// Number of events applied so far. Zero means the record was never created.
    fn version(&self) -> u64;
}

/// Optimistic concurrency expectation for an append.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// No check. Only for appends that cannot race, such as fixtures and rebuilds.
    Any,
    /// The stream must be at exactly this version.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "stale record version (expected: {self:?}, actual: {actual})"
            )))
        }
    }
}

/// Pure decide/evolve pair.
///
/// `handle` inspects the current state and returns the events a command produces,
/// without mutating anything. `apply` folds one event into the state and bumps the
/// version by one. Replaying the same events always yields the same state.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    fn apply(&mut self, event: &Self::Event);

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;
}
