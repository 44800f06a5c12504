//! Command execution pipeline for the event-sourced aggregates.
//!
//! Invoices, tenants and properties all go through the same five steps, so the
//! application layer only builds commands and never touches streams directly.
//!
//! ## Flow
//!
//! ```text
//! command
//!   -> load stream (portfolio-scoped)
//!   -> rehydrate aggregate
//!   -> handle (pure decision, yields events)
//!   -> append with ExpectedVersion::Exact(current)
//!   -> publish committed envelopes
//! ```
//!
//! ## Guarantees
//!
//! - **Store first, bus second**: publishing happens only after a successful append.
//!   A failed publish returns [`DispatchError::Publish`] with the events already
//!   stored; a projection rebuild picks them up.
//! - **Portfolio isolation**: every loaded event must carry the portfolio the command
//!   was dispatched for. A mismatch aborts with [`DispatchError::PortfolioIsolation`]
//!   before the aggregate sees any state.
//! - **Optimistic concurrency**: a stream that moved between load and append yields
//!   [`DispatchError::Concurrency`]; nothing is written and the caller may retry.
//! - **No-ops are silent**: an empty event list from `handle` appends and publishes
//!   nothing, and `dispatch` returns an empty `Vec`.
//!
//! ## What does not live here
//!
//! Authorization, invoice numbering and read-model updates belong to the application
//! layer. The dispatcher only knows streams, aggregates and the bus.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use rentease_core::{Aggregate, AggregateId, DomainError, ExpectedVersion, PortfolioId};
use rentease_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Stream version moved between load and append.
    #[error("concurrent modification: {0}")]
    Concurrency(String),

    #[error("portfolio isolation violation: {0}")]
    PortfolioIsolation(String),

    /// The aggregate rejected the command.
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),

    #[error("event store failure: {0}")]
    Store(EventStoreError),

    /// Append succeeded but publication did not; read models can be rebuilt from the store.
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            EventStoreError::PortfolioIsolation(msg) => DispatchError::PortfolioIsolation(msg),
            other => DispatchError::Store(other),
        }
    }
}

/// Runs commands against aggregates stored in `S`, publishing to `B`.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Executes `command` against the aggregate `aggregate_id`.
    ///
    /// Returns the committed events; empty when the command was a no-op
    /// (an identical payment resubmission, for example).
    pub fn dispatch<A>(
        &self,
        portfolio_id: PortfolioId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: rentease_events::Event + Serialize + DeserializeOwned,
    {
        let history = self.store.load_stream(portfolio_id, aggregate_id)?;
        validate_loaded_stream(portfolio_id, aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        let mut aggregate = make_aggregate(aggregate_id);
        apply_history(&mut aggregate, &history)?;

        let decided = aggregate.handle(&command)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        let aggregate_type = aggregate_type.into();
        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    portfolio_id,
                    aggregate_id,
                    aggregate_type.clone(),
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;

        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        Ok(committed)
    }

    /// Rehydrates an aggregate without executing anything.
    ///
    /// An unknown stream yields the aggregate returned by `make_aggregate` untouched.
    pub fn load<A>(
        &self,
        portfolio_id: PortfolioId,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(portfolio_id, aggregate_id)?;
        validate_loaded_stream(portfolio_id, aggregate_id, &history)?;

        let mut aggregate = make_aggregate(aggregate_id);
        apply_history(&mut aggregate, &history)?;
        Ok(aggregate)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    portfolio_id: PortfolioId,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.portfolio_id != portfolio_id {
            return Err(DispatchError::PortfolioIsolation(format!(
                "loaded stream contains a foreign portfolio at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::PortfolioIsolation(format!(
                "loaded stream contains a foreign aggregate at index {idx}"
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }
    Ok(())
}
