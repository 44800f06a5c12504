use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use rentease_core::PortfolioId;
use rentease_events::EventEnvelope;
use rentease_leasing::{PROPERTY_AGGREGATE, PropertyEvent, PropertyId, PropertyKind};

use crate::projections::cursor::{
    ProjectionError, StreamCursors, decode, ensure_same_stream, replay_order,
};
use crate::read_model::PortfolioStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyView {
    pub property_id: PropertyId,
    pub name: String,
    pub address: String,
    pub kind: PropertyKind,
    pub total_units: u32,
    pub occupied_units: u32,
}

impl PropertyView {
    /// Occupied share of units as a percentage with one decimal, e.g. `75.0`.
    pub fn occupancy_rate(&self) -> Decimal {
        occupancy_rate(self.occupied_units, self.total_units)
    }
}

pub fn occupancy_rate(occupied: u32, total: u32) -> Decimal {
    if total == 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(occupied) * Decimal::ONE_HUNDRED / Decimal::from(total)).round_dp(1)
}

#[derive(Debug)]
pub struct PropertiesProjection<S>
where
    S: PortfolioStore<PropertyId, PropertyView>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> PropertiesProjection<S>
where
    S: PortfolioStore<PropertyId, PropertyView>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, portfolio_id: PortfolioId, property_id: &PropertyId) -> Option<PropertyView> {
        self.store.get(portfolio_id, property_id)
    }

    /// Properties sorted by name.
    pub fn list(&self, portfolio_id: PortfolioId) -> Vec<PropertyView> {
        let mut all = self.store.list(portfolio_id);
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != PROPERTY_AGGREGATE {
            return Ok(());
        }
        if !self.cursors.admit(envelope)? {
            return Ok(());
        }

        let ev: PropertyEvent = decode(envelope)?;
        let (portfolio_id, property_id) = ev.portfolio_and_property();
        ensure_same_stream(envelope, portfolio_id, property_id.0)?;

        match ev {
            PropertyEvent::PropertyRegistered(e) => {
                self.store.upsert(
                    portfolio_id,
                    property_id,
                    PropertyView {
                        property_id,
                        name: e.name,
                        address: e.address,
                        kind: e.kind,
                        total_units: e.total_units,
                        occupied_units: 0,
                    },
                );
            }
            PropertyEvent::PropertyUpdated(e) => {
                if let Some(mut view) = self.store.get(portfolio_id, &property_id) {
                    view.name = e.name;
                    view.address = e.address;
                    view.kind = e.kind;
                    view.total_units = e.total_units;
                    self.store.upsert(portfolio_id, property_id, view);
                }
            }
            PropertyEvent::UnitOccupied(e) => {
                self.set_occupied(portfolio_id, property_id, e.occupied_units);
            }
            PropertyEvent::UnitVacated(e) => {
                self.set_occupied(portfolio_id, property_id, e.occupied_units);
            }
        }

        self.cursors.advance(envelope);
        Ok(())
    }

    fn set_occupied(&self, portfolio_id: PortfolioId, property_id: PropertyId, occupied: u32) {
        if let Some(mut view) = self.store.get(portfolio_id, &property_id) {
            view.occupied_units = occupied;
            self.store.upsert(portfolio_id, property_id, view);
        }
    }

    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        let (portfolios, envs) = replay_order(envelopes);
        for p in portfolios {
            self.store.clear_portfolio(p);
            self.cursors.clear(p);
        }
        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn occupancy_rate_is_a_rounded_percentage() {
        assert_eq!(occupancy_rate(3, 4), dec!(75.0));
        assert_eq!(occupancy_rate(1, 3), dec!(33.3));
        assert_eq!(occupancy_rate(0, 0), dec!(0));
    }
}
