//! Turns a set of charge components into an `IssueInvoice` command.

use std::collections::BTreeSet;

use chrono::{DateTime, Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use rentease_core::{DomainError, DomainResult, PortfolioId};
use rentease_leasing::{PropertyId, Tenant, TenantId};

use crate::charge::{ChargeComponent, ChargeVariables, resolve};
use crate::invoice::{InvoiceHeader, InvoiceId, InvoiceItem, IssueInvoice};
use crate::number::InvoiceNumber;
use crate::period::BillingPeriod;

/// The tenant, property and unit an invoice is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillTo {
    pub tenant_id: TenantId,
    pub property_id: PropertyId,
    pub unit: String,
}

impl TryFrom<&Tenant> for BillTo {
    type Error = DomainError;

    fn try_from(tenant: &Tenant) -> Result<Self, Self::Error> {
        if !tenant.can_be_billed() {
            return Err(DomainError::validation(format!(
                "tenant {} is not an active tenant",
                tenant.id_typed()
            )));
        }
        let property_id = tenant
            .property_id()
            .ok_or_else(|| DomainError::validation("tenant has no property"))?;
        Ok(Self {
            tenant_id: tenant.id_typed(),
            property_id,
            unit: tenant.unit().to_string(),
        })
    }
}

/// Everything needed to issue an invoice except its number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceDraft {
    pub bill_to: BillTo,
    pub period: BillingPeriod,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub components: Vec<ChargeComponent>,
}

impl InvoiceDraft {
    /// Draft due `due_in_days` after `issue_date`, with no components yet.
    pub fn new(
        bill_to: BillTo,
        period: BillingPeriod,
        issue_date: NaiveDate,
        due_in_days: u32,
    ) -> DomainResult<Self> {
        let due_date = issue_date
            .checked_add_days(Days::new(u64::from(due_in_days)))
            .ok_or_else(|| DomainError::validation("due date out of range"))?;
        Ok(Self {
            bill_to,
            period,
            issue_date,
            due_date,
            components: Vec::new(),
        })
    }

    /// Replaces the default due date. It may not precede the issue date.
    pub fn due_on(mut self, due_date: NaiveDate) -> DomainResult<Self> {
        if due_date < self.issue_date {
            return Err(DomainError::validation(format!(
                "due date {due_date} precedes issue date {}",
                self.issue_date
            )));
        }
        self.due_date = due_date;
        Ok(self)
    }

    pub fn with_component(mut self, component: ChargeComponent) -> Self {
        self.components.push(component);
        self
    }

    pub fn with_components(mut self, components: impl IntoIterator<Item = ChargeComponent>) -> Self {
        self.components.extend(components);
        self
    }
}

/// Line items and total shown by the rent calculator before anything is issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentPreview {
    pub items: Vec<InvoiceItem>,
    pub total: Decimal,
}

/// Resolves every component, in order. Component ids must be unique.
pub fn resolve_items(
    components: &[ChargeComponent],
    variables: &ChargeVariables,
) -> DomainResult<Vec<InvoiceItem>> {
    let mut seen = BTreeSet::new();
    components
        .iter()
        .map(|component| {
            if !seen.insert(component.id) {
                return Err(DomainError::validation(format!(
                    "duplicate charge component {}",
                    component.id
                )));
            }
            Ok(InvoiceItem {
                component: component.clone(),
                amount: resolve(component, variables)?,
            })
        })
        .collect()
}

fn sum(items: &[InvoiceItem]) -> DomainResult<Decimal> {
    items.iter().try_fold(Decimal::ZERO, |acc, item| {
        acc.checked_add(item.amount)
            .ok_or_else(|| DomainError::invariant("invoice total overflow"))
    })
}

pub fn preview(
    components: &[ChargeComponent],
    variables: &ChargeVariables,
) -> DomainResult<RentPreview> {
    let items = resolve_items(components, variables)?;
    let total = sum(&items)?;
    Ok(RentPreview { items, total })
}

/// Resolves the draft and produces the command that issues it as invoice `number`.
pub fn build_invoice(
    portfolio_id: PortfolioId,
    invoice_id: InvoiceId,
    number: InvoiceNumber,
    draft: &InvoiceDraft,
    variables: &ChargeVariables,
    occurred_at: DateTime<Utc>,
) -> DomainResult<IssueInvoice> {
    if draft.components.is_empty() {
        return Err(DomainError::validation("invoice needs at least one charge"));
    }

    let RentPreview { items, total } = preview(&draft.components, variables)?;
    if total <= Decimal::ZERO {
        return Err(DomainError::validation(format!(
            "invoice total must be positive, got {total}"
        )));
    }

    tracing::debug!(
        %number,
        tenant_id = %draft.bill_to.tenant_id,
        items = items.len(),
        %total,
        "invoice draft resolved"
    );

    Ok(IssueInvoice {
        portfolio_id,
        invoice_id,
        header: InvoiceHeader {
            number,
            tenant_id: draft.bill_to.tenant_id,
            property_id: draft.bill_to.property_id,
            unit: draft.bill_to.unit.clone(),
            period: draft.period,
            issue_date: draft.issue_date,
            due_date: draft.due_date,
        },
        items,
        occurred_at,
    })
}
