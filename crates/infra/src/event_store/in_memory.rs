use std::collections::HashMap;
use std::sync::RwLock;

use rentease_core::{AggregateId, ExpectedVersion, PortfolioId};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct StreamKey {
    portfolio_id: PortfolioId,
    aggregate_id: AggregateId,
}

/// Append-only store held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<StreamKey, Vec<StoredEvent>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }

    /// Single-stream check for a batch; returns the stream key it targets.
    fn batch_key(events: &[UncommittedEvent]) -> Result<(StreamKey, &str), EventStoreError> {
        let first = events
            .first()
            .ok_or_else(|| EventStoreError::InvalidAppend("empty batch".to_string()))?;

        for (idx, e) in events.iter().enumerate() {
            if e.portfolio_id != first.portfolio_id {
                return Err(EventStoreError::PortfolioIsolation(format!(
                    "batch mixes portfolios (index {idx})"
                )));
            }
            if e.aggregate_id != first.aggregate_id {
                return Err(EventStoreError::InvalidAppend(format!(
                    "batch mixes aggregates (index {idx})"
                )));
            }
            if e.aggregate_type != first.aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "batch mixes aggregate types (index {idx})"
                )));
            }
        }

        Ok((
            StreamKey {
                portfolio_id: first.portfolio_id,
                aggregate_id: first.aggregate_id,
            },
            first.aggregate_type.as_str(),
        ))
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }
        let (key, aggregate_type) = Self::batch_key(&events)?;
        let aggregate_type = aggregate_type.to_string();

        let mut streams = self.streams.write().map_err(|_| EventStoreError::Poisoned)?;
        let stream = streams.entry(key).or_default();
        let current = Self::current_version(stream);

        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current}"
            )));
        }
        if let Some(existing) = stream.first() {
            if existing.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream holds '{}', append attempted with '{aggregate_type}'",
                    existing.aggregate_type
                )));
            }
        }

        let committed: Vec<StoredEvent> = events
            .into_iter()
            .zip(current + 1..)
            .map(|(e, sequence_number)| StoredEvent {
                event_id: e.event_id,
                portfolio_id: e.portfolio_id,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type,
                sequence_number,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            })
            .collect();

        stream.extend(committed.iter().cloned());
        Ok(committed)
    }

    fn load_stream(
        &self,
        portfolio_id: PortfolioId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let key = StreamKey {
            portfolio_id,
            aggregate_id,
        };
        let streams = self.streams.read().map_err(|_| EventStoreError::Poisoned)?;
        Ok(streams.get(&key).cloned().unwrap_or_default())
    }

    fn load_by_type(
        &self,
        portfolio_id: PortfolioId,
        aggregate_type: &str,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let streams = self.streams.read().map_err(|_| EventStoreError::Poisoned)?;

        let mut matching: Vec<&Vec<StoredEvent>> = streams
            .iter()
            .filter(|(key, stream)| {
                key.portfolio_id == portfolio_id
                    && stream.first().is_some_and(|e| e.aggregate_type == aggregate_type)
            })
            .map(|(_, stream)| stream)
            .collect();
        // v7 ids sort by creation time
        matching.sort_by_key(|stream| stream.first().map(|e| *e.aggregate_id.as_uuid().as_bytes()));

        Ok(matching.into_iter().flatten().cloned().collect())
    }
}
