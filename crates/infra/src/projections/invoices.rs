use std::collections::HashMap;
use std::sync::RwLock;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use rentease_billing::{
    BillingPeriod, INVOICE_AGGREGATE, InvoiceEvent, InvoiceId, InvoiceItem, InvoiceNumber,
    InvoiceStatus, Payment,
};
use rentease_core::PortfolioId;
use rentease_events::EventEnvelope;
use rentease_leasing::{PropertyId, TenantId};

use crate::projections::cursor::{
    ProjectionError, StreamCursors, decode, ensure_same_stream, replay_order,
};
use crate::read_model::PortfolioStore;

/// Queryable invoice: header, resolved lines and payment.
///
/// Status is not stored; ask [`InvoiceView::status_on`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceView {
    pub invoice_id: InvoiceId,
    pub number: InvoiceNumber,
    pub tenant_id: TenantId,
    pub property_id: PropertyId,
    pub unit: String,
    pub period: BillingPeriod,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub items: Vec<InvoiceItem>,
    pub total: Decimal,
    pub payment: Option<Payment>,
    pub void_reason: Option<String>,
    pub voided: bool,
}

impl InvoiceView {
    pub fn status_on(&self, today: NaiveDate) -> InvoiceStatus {
        InvoiceStatus::derive(self.voided, self.payment.is_some(), self.due_date, today)
    }

    pub fn paid_amount(&self) -> Decimal {
        self.payment.as_ref().map_or(Decimal::ZERO, |p| p.paid_amount)
    }

    /// Outstanding amount; zero once voided.
    pub fn balance(&self) -> Decimal {
        if self.voided {
            Decimal::ZERO
        } else {
            self.total - self.paid_amount()
        }
    }

    /// Paid no later than the due date.
    pub fn paid_on_time(&self) -> bool {
        self.payment
            .as_ref()
            .is_some_and(|p| p.paid_date <= self.due_date)
    }
}

/// Builds [`InvoiceView`]s and a number -> id index from invoice events.
#[derive(Debug)]
pub struct InvoicesProjection<S>
where
    S: PortfolioStore<InvoiceId, InvoiceView>,
{
    store: S,
    by_number: RwLock<HashMap<(PortfolioId, InvoiceNumber), InvoiceId>>,
    cursors: StreamCursors,
}

impl<S> InvoicesProjection<S>
where
    S: PortfolioStore<InvoiceId, InvoiceView>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            by_number: RwLock::new(HashMap::new()),
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, portfolio_id: PortfolioId, invoice_id: &InvoiceId) -> Option<InvoiceView> {
        self.store.get(portfolio_id, invoice_id)
    }

    pub fn get_by_number(
        &self,
        portfolio_id: PortfolioId,
        number: InvoiceNumber,
    ) -> Option<InvoiceView> {
        let id = *self.by_number.read().ok()?.get(&(portfolio_id, number))?;
        self.store.get(portfolio_id, &id)
    }

    /// All invoices of a portfolio, ordered by invoice number.
    pub fn list(&self, portfolio_id: PortfolioId) -> Vec<InvoiceView> {
        let mut all = self.store.list(portfolio_id);
        all.sort_by_key(|v| v.number);
        all
    }

    pub fn list_for_tenant(&self, portfolio_id: PortfolioId, tenant_id: TenantId) -> Vec<InvoiceView> {
        let mut mine = self.list(portfolio_id);
        mine.retain(|v| v.tenant_id == tenant_id);
        mine
    }

    /// Highest sequence issued so far in `year`, 0 when none.
    pub fn last_sequence(&self, portfolio_id: PortfolioId, year: i32) -> u32 {
        self.by_number
            .read()
            .map(|index| {
                index
                    .keys()
                    .filter(|(p, n)| *p == portfolio_id && n.year() == year)
                    .map(|(_, n)| n.sequence())
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != INVOICE_AGGREGATE {
            return Ok(());
        }
        if !self.cursors.admit(envelope)? {
            return Ok(());
        }

        let ev: InvoiceEvent = decode(envelope)?;
        let (portfolio_id, invoice_id) = ev.portfolio_and_invoice();
        ensure_same_stream(envelope, portfolio_id, invoice_id.0)?;

        match ev {
            InvoiceEvent::InvoiceIssued(e) => {
                let header = e.header;
                if let Ok(mut index) = self.by_number.write() {
                    index.insert((portfolio_id, header.number), invoice_id);
                }
                self.store.upsert(
                    portfolio_id,
                    invoice_id,
                    InvoiceView {
                        invoice_id,
                        number: header.number,
                        tenant_id: header.tenant_id,
                        property_id: header.property_id,
                        unit: header.unit,
                        period: header.period,
                        issue_date: header.issue_date,
                        due_date: header.due_date,
                        items: e.items,
                        total: e.total,
                        payment: None,
                        void_reason: None,
                        voided: false,
                    },
                );
            }
            InvoiceEvent::InvoicePaid(e) => {
                if let Some(mut view) = self.store.get(portfolio_id, &invoice_id) {
                    view.payment = Some(e.payment);
                    self.store.upsert(portfolio_id, invoice_id, view);
                }
            }
            InvoiceEvent::InvoiceVoided(e) => {
                if let Some(mut view) = self.store.get(portfolio_id, &invoice_id) {
                    view.voided = true;
                    view.void_reason = e.reason;
                    self.store.upsert(portfolio_id, invoice_id, view);
                }
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
            if let Ok(mut index) = self.by_number.write() {
                index.retain(|(owner, _), _| *owner != p);
            }
        }
        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}
