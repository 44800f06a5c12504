use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use rentease_core::PortfolioId;
use rentease_events::EventEnvelope;
use rentease_leasing::{
    ContactInfo, Lease, PropertyId, TENANT_AGGREGATE, TenancyStatus, TenantEvent, TenantId,
};

use crate::projections::cursor::{
    ProjectionError, StreamCursors, decode, ensure_same_stream, replay_order,
};
use crate::read_model::PortfolioStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantView {
    pub tenant_id: TenantId,
    pub name: String,
    pub contact: ContactInfo,
    pub property_id: PropertyId,
    pub unit: String,
    pub rent_amount: Decimal,
    pub lease: Lease,
    pub status: TenancyStatus,
}

/// Tenant list filters. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantFilter {
    /// Matched against name (case-insensitive), email and phone.
    pub search: Option<String>,
    pub property_id: Option<PropertyId>,
    pub status: Option<TenancyStatus>,
}

impl TenantFilter {
    pub fn matches(&self, tenant: &TenantView) -> bool {
        let search_ok = match self.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(q) => {
                tenant.name.to_lowercase().contains(&q.to_lowercase()) || tenant.contact.matches(q)
            }
        };
        search_ok
            && self.property_id.is_none_or(|p| p == tenant.property_id)
            && self.status.is_none_or(|s| s == tenant.status)
    }
}

/// Current (non-removed) tenants of each portfolio.
#[derive(Debug)]
pub struct TenantDirectoryProjection<S>
where
    S: PortfolioStore<TenantId, TenantView>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> TenantDirectoryProjection<S>
where
    S: PortfolioStore<TenantId, TenantView>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, portfolio_id: PortfolioId, tenant_id: &TenantId) -> Option<TenantView> {
        self.store.get(portfolio_id, tenant_id)
    }

    /// Matching tenants sorted by name.
    pub fn search(&self, portfolio_id: PortfolioId, filter: &TenantFilter) -> Vec<TenantView> {
        let mut found: Vec<TenantView> = self
            .store
            .list(portfolio_id)
            .into_iter()
            .filter(|t| filter.matches(t))
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }

    pub fn list(&self, portfolio_id: PortfolioId) -> Vec<TenantView> {
        self.search(portfolio_id, &TenantFilter::default())
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != TENANT_AGGREGATE {
            return Ok(());
        }
        if !self.cursors.admit(envelope)? {
            return Ok(());
        }

        let ev: TenantEvent = decode(envelope)?;
        let (portfolio_id, tenant_id) = ev.portfolio_and_tenant();
        ensure_same_stream(envelope, portfolio_id, tenant_id.0)?;

        match ev {
            TenantEvent::TenantRegistered(e) => {
                self.store.upsert(
                    portfolio_id,
                    tenant_id,
                    TenantView {
                        tenant_id,
                        name: e.name,
                        contact: e.contact,
                        property_id: e.property_id,
                        unit: e.unit,
                        rent_amount: e.rent_amount,
                        lease: e.lease,
                        status: e.status,
                    },
                );
            }
            TenantEvent::TenantUpdated(e) => {
                if let Some(mut view) = self.store.get(portfolio_id, &tenant_id) {
                    view.name = e.name;
                    view.contact = e.contact;
                    view.property_id = e.property_id;
                    view.unit = e.unit;
                    view.rent_amount = e.rent_amount;
                    view.lease = e.lease;
                    self.store.upsert(portfolio_id, tenant_id, view);
                }
            }
            TenantEvent::TenantStatusChanged(e) => {
                if let Some(mut view) = self.store.get(portfolio_id, &tenant_id) {
                    view.status = e.to;
                    self.store.upsert(portfolio_id, tenant_id, view);
                }
            }
            TenantEvent::TenantRemoved(_) => {
                self.store.remove(portfolio_id, &tenant_id);
            }
        }

        self.cursors.advance(envelope);
        Ok(())
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
