//! Per-stream checkpoints shared by the projections.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;

use rentease_core::{AggregateId, PortfolioId};
use rentease_events::EventEnvelope;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("failed to deserialize event: {0}")]
    Deserialize(String),

    #[error("portfolio isolation violation: {0}")]
    PortfolioIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    portfolio_id: PortfolioId,
    aggregate_id: AggregateId,
}

/// Last applied sequence number per `(portfolio, aggregate)` stream.
#[derive(Debug, Default)]
pub struct StreamCursors {
    positions: RwLock<HashMap<CursorKey, u64>>,
}

impl StreamCursors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self, portfolio_id: PortfolioId, aggregate_id: AggregateId) -> u64 {
        self.positions
            .read()
            .ok()
            .and_then(|p| p.get(&CursorKey { portfolio_id, aggregate_id }).copied())
            .unwrap_or(0)
    }

    /// `Ok(true)` when the envelope is the next one for its stream, `Ok(false)` when it
    /// was already applied (redelivery). Gaps are errors.
    pub fn admit(&self, envelope: &EventEnvelope<JsonValue>) -> Result<bool, ProjectionError> {
        let last = self.position(envelope.portfolio_id(), envelope.aggregate_id());
        let found = envelope.sequence_number();
        if found == 0 {
            return Err(ProjectionError::NonMonotonicSequence { last, found });
        }
        if found <= last {
            return Ok(false);
        }
        if found != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence { last, found });
        }
        Ok(true)
    }

    pub fn advance(&self, envelope: &EventEnvelope<JsonValue>) {
        if let Ok(mut positions) = self.positions.write() {
            positions.insert(
                CursorKey {
                    portfolio_id: envelope.portfolio_id(),
                    aggregate_id: envelope.aggregate_id(),
                },
                envelope.sequence_number(),
            );
        }
    }

    pub fn clear(&self, portfolio_id: PortfolioId) {
        if let Ok(mut positions) = self.positions.write() {
            positions.retain(|k, _| k.portfolio_id != portfolio_id);
        }
    }
}

pub(crate) fn decode<E: DeserializeOwned>(
    envelope: &EventEnvelope<JsonValue>,
) -> Result<E, ProjectionError> {
    serde_json::from_value(envelope.payload().clone())
        .map_err(|e| ProjectionError::Deserialize(e.to_string()))
}

/// Checks that the ids inside a payload agree with the envelope that carried it.
pub(crate) fn ensure_same_stream(
    envelope: &EventEnvelope<JsonValue>,
    portfolio_id: PortfolioId,
    aggregate_id: AggregateId,
) -> Result<(), ProjectionError> {
    if portfolio_id != envelope.portfolio_id() {
        return Err(ProjectionError::PortfolioIsolation(
            "event portfolio_id does not match envelope".to_string(),
        ));
    }
    if aggregate_id != envelope.aggregate_id() {
        return Err(ProjectionError::PortfolioIsolation(
            "event aggregate id does not match envelope".to_string(),
        ));
    }
    Ok(())
}

/// Distinct portfolios in a replay batch, followed by the batch in stream order.
pub(crate) fn replay_order(
    envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
) -> (Vec<PortfolioId>, Vec<EventEnvelope<JsonValue>>) {
    let mut envs: Vec<_> = envelopes.into_iter().collect();

    let mut portfolios: Vec<PortfolioId> = envs.iter().map(|e| e.portfolio_id()).collect();
    portfolios.sort_by_key(|p| *p.as_uuid().as_bytes());
    portfolios.dedup();

    envs.sort_by_key(|e| {
        (
            *e.portfolio_id().as_uuid().as_bytes(),
            *e.aggregate_id().as_uuid().as_bytes(),
            e.sequence_number(),
        )
    });
    (portfolios, envs)
}
