//! Dashboard figures computed from the read models.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use rentease_billing::{
    BillingPeriod, InvoiceItem, InvoiceNumber, InvoiceStatus, PaymentMethod, round_to_cents,
};
use rentease_core::{DomainError, DomainResult};
use rentease_infra::projections::{InvoiceView, PropertyView, TenantView, occupancy_rate};
use rentease_leasing::TenancyStatus;

/// Sums money without the panic `Decimal`'s `Sum` has on overflow.
fn checked_total(amounts: impl IntoIterator<Item = Decimal>, what: &str) -> DomainResult<Decimal> {
    amounts.into_iter().try_fold(Decimal::ZERO, |acc, amount| {
        acc.checked_add(amount)
            .ok_or_else(|| DomainError::validation(format!("{what} overflows")))
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandlordDashboard {
    pub property_count: usize,
    pub total_units: u32,
    pub occupied_units: u32,
    /// Percentage, one decimal.
    pub occupancy_rate: Decimal,
    pub active_tenants: usize,
    /// Sum of the rent of active tenants.
    pub expected_monthly_rent: Decimal,
    pub collected: Decimal,
    /// Unpaid totals plus any balance left on paid invoices. Void invoices count for nothing.
    pub outstanding: Decimal,
    pub overdue_count: usize,
}

impl LandlordDashboard {
    pub fn compute(
        properties: &[PropertyView],
        tenants: &[TenantView],
        invoices: &[InvoiceView],
        today: NaiveDate,
    ) -> DomainResult<Self> {
        let units = |field: fn(&PropertyView) -> u32| {
            properties
                .iter()
                .try_fold(0u32, |acc, p| acc.checked_add(field(p)))
                .ok_or_else(|| DomainError::validation("unit count overflows"))
        };
        let total_units = units(|p| p.total_units)?;
        let occupied_units = units(|p| p.occupied_units)?;
        let active: Vec<&TenantView> = tenants
            .iter()
            .filter(|t| t.status == TenancyStatus::Active)
            .collect();

        let live = invoices.iter().filter(|i| !i.voided);
        let collected = checked_total(live.clone().map(InvoiceView::paid_amount), "amount collected")?;
        let outstanding = checked_total(
            live.clone().map(|i| i.balance().max(Decimal::ZERO)),
            "amount outstanding",
        )?;
        let overdue_count = live
            .filter(|i| i.status_on(today) == InvoiceStatus::Overdue)
            .count();

        Ok(Self {
            property_count: properties.len(),
            total_units,
            occupied_units,
            occupancy_rate: occupancy_rate(occupied_units, total_units),
            active_tenants: active.len(),
            expected_monthly_rent: checked_total(
                active.iter().map(|t| t.rent_amount),
                "expected monthly rent",
            )?,
            collected,
            outstanding,
            overdue_count,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub number: InvoiceNumber,
    pub period: BillingPeriod,
    pub total: Decimal,
    pub due_date: NaiveDate,
    pub status: InvoiceStatus,
    pub paid_amount: Option<Decimal>,
    pub paid_date: Option<NaiveDate>,
    pub method: Option<PaymentMethod>,
    pub reference: Option<String>,
}

/// One tenant's invoices with payment totals, optionally restricted to a year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentHistory {
    pub year: Option<i32>,
    pub records: Vec<PaymentRecord>,
    pub total_paid: Decimal,
    pub paid_count: usize,
    pub average_payment: Decimal,
    /// Paid on or before the due date.
    pub on_time_count: usize,
}

impl PaymentHistory {
    /// `invoices` must already be restricted to one tenant.
    pub fn compute(
        invoices: &[InvoiceView],
        year: Option<i32>,
        today: NaiveDate,
    ) -> DomainResult<Self> {
        let mut selected: Vec<&InvoiceView> = invoices
            .iter()
            .filter(|i| year.is_none_or(|y| i.period.year() == y))
            .collect();
        // newest first
        selected.sort_by(|a, b| b.number.cmp(&a.number));

        let paid: Vec<&&InvoiceView> = selected
            .iter()
            .filter(|i| i.status_on(today) == InvoiceStatus::Paid)
            .collect();
        let total_paid = checked_total(paid.iter().map(|i| i.paid_amount()), "total paid")?;
        let average_payment = if paid.is_empty() {
            Decimal::ZERO
        } else {
            round_to_cents(total_paid / Decimal::from(paid.len()))
        };

        Ok(Self {
            year,
            records: selected
                .iter()
                .map(|i| {
                    let payment = i.payment.as_ref();
                    PaymentRecord {
                        number: i.number,
                        period: i.period,
                        total: i.total,
                        due_date: i.due_date,
                        status: i.status_on(today),
                        paid_amount: payment.map(|p| p.paid_amount),
                        paid_date: payment.map(|p| p.paid_date),
                        method: payment.map(|p| p.method),
                        reference: payment.and_then(|p| p.reference.clone()),
                    }
                })
                .collect(),
            total_paid,
            paid_count: paid.len(),
            average_payment,
            on_time_count: paid.iter().filter(|i| i.paid_on_time()).count(),
        })
    }
}

/// What a tenant owes for one month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentSummary {
    pub period: BillingPeriod,
    pub number: InvoiceNumber,
    pub items: Vec<InvoiceItem>,
    pub total: Decimal,
    pub due_date: NaiveDate,
    pub status: InvoiceStatus,
    pub paid: Decimal,
    pub due: Decimal,
}

impl RentSummary {
    /// Latest non-void invoice of `period`, if any.
    pub fn for_period(
        invoices: &[InvoiceView],
        period: BillingPeriod,
        today: NaiveDate,
    ) -> Option<Self> {
        let invoice = invoices
            .iter()
            .filter(|i| i.period == period && !i.voided)
            .max_by_key(|i| i.number)?;

        Some(Self {
            period,
            number: invoice.number,
            items: invoice.items.clone(),
            total: invoice.total,
            due_date: invoice.due_date,
            status: invoice.status_on(today),
            paid: invoice.paid_amount(),
            due: invoice.balance().max(Decimal::ZERO),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rentease_billing::{ChargeComponent, ComponentId, InvoiceId, Payment};
    use rentease_core::AggregateId;
    use rentease_leasing::{ContactInfo, Lease, PropertyId, PropertyKind, TenantId};
    use rust_decimal_macros::dec;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn invoice(seq: u32, month: u32, total: Decimal) -> InvoiceView {
        let issue = date(month, 1);
        InvoiceView {
            invoice_id: InvoiceId::new(AggregateId::new()),
            number: InvoiceNumber::new(2024, seq).unwrap(),
            tenant_id: TenantId::new(AggregateId::new()),
            property_id: PropertyId::new(AggregateId::new()),
            unit: "4B".to_string(),
            period: BillingPeriod::new(2024, month).unwrap(),
            issue_date: issue,
            due_date: date(month, 16),
            items: vec![InvoiceItem {
                component: ChargeComponent::fixed(ComponentId(1), "Base Rent", total),
                amount: total,
            }],
            total,
            payment: None,
            void_reason: None,
            voided: false,
        }
    }

    fn paid(mut view: InvoiceView, amount: Decimal, on: NaiveDate) -> InvoiceView {
        view.payment = Some(Payment {
            paid_amount: amount,
            paid_date: on,
            method: PaymentMethod::Upi,
            reference: Some(format!("TXN{}", view.number.sequence())),
        });
        view
    }

    fn tenant(rent: Decimal, status: TenancyStatus) -> TenantView {
        TenantView {
            tenant_id: TenantId::new(AggregateId::new()),
            name: "Sarah Johnson".to_string(),
            contact: ContactInfo::default(),
            property_id: PropertyId::new(AggregateId::new()),
            unit: "4B".to_string(),
            rent_amount: rent,
            lease: Lease::new(date(1, 1), date(12, 31)).unwrap(),
            status,
        }
    }

    fn property(total: u32, occupied: u32) -> PropertyView {
        PropertyView {
            property_id: PropertyId::new(AggregateId::new()),
            name: "Sunset Apartments".to_string(),
            address: "123 Main St".to_string(),
            kind: PropertyKind::Apartment,
            total_units: total,
            occupied_units: occupied,
        }
    }

    #[test]
    fn dashboard_totals() {
        let mut void = invoice(4, 3, dec!(900));
        void.voided = true;
        let invoices = vec![
            paid(invoice(1, 1, dec!(1368)), dec!(1368), date(1, 10)),
            paid(invoice(2, 2, dec!(1268)), dec!(1200), date(2, 20)),
            invoice(3, 3, dec!(1250)),
            void,
        ];
        let tenants = vec![
            tenant(dec!(1200), TenancyStatus::Active),
            tenant(dec!(950), TenancyStatus::Active),
            tenant(dec!(800), TenancyStatus::Pending),
        ];
        let properties = vec![property(12, 10), property(8, 6)];

        let d = LandlordDashboard::compute(&properties, &tenants, &invoices, date(3, 20)).unwrap();
        assert_eq!(d.property_count, 2);
        assert_eq!((d.total_units, d.occupied_units), (20, 16));
        assert_eq!(d.occupancy_rate, dec!(80.0));
        assert_eq!(d.active_tenants, 2);
        assert_eq!(d.expected_monthly_rent, dec!(2150));
        assert_eq!(d.collected, dec!(2568));
        assert_eq!(d.outstanding, dec!(1318));
        assert_eq!(d.overdue_count, 1);
    }

    #[test]
    fn payment_history_counts_on_time_payments() {
        let invoices = vec![
            paid(invoice(1, 1, dec!(1250)), dec!(1250), date(1, 14)),
            paid(invoice(2, 2, dec!(1250)), dec!(1250), date(2, 20)),
            invoice(3, 3, dec!(1268)),
        ];
        let h = PaymentHistory::compute(&invoices, Some(2024), date(3, 5)).unwrap();
        assert_eq!(h.records.len(), 3);
        assert_eq!(h.records[0].number.to_string(), "INV-2024-003");
        assert_eq!(h.total_paid, dec!(2500));
        assert_eq!(h.paid_count, 2);
        assert_eq!(h.average_payment, dec!(1250.00));
        assert_eq!(h.on_time_count, 1);
        assert_eq!(h.records[1].method, Some(PaymentMethod::Upi));
        assert_eq!(h.records[1].reference.as_deref(), Some("TXN2"));
        assert_eq!(h.records[0].method, None);

        let none = PaymentHistory::compute(&invoices, Some(2023), date(3, 5)).unwrap();
        assert!(none.records.is_empty());
        assert_eq!(none.average_payment, Decimal::ZERO);
    }

    #[test]
    fn huge_payments_fail_instead_of_overflowing() {
        let invoices = vec![
            paid(invoice(1, 1, dec!(1250)), Decimal::MAX, date(1, 14)),
            paid(invoice(2, 2, dec!(1250)), Decimal::MAX, date(2, 14)),
        ];
        assert!(matches!(
            PaymentHistory::compute(&invoices, None, date(3, 5)),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            LandlordDashboard::compute(&[], &[], &invoices, date(3, 5)),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn rent_summary_skips_void_and_reports_due() {
        let mut void = invoice(1, 1, dec!(1368));
        void.voided = true;
        let invoices = vec![void, invoice(2, 1, dec!(1268))];

        let s = RentSummary::for_period(&invoices, BillingPeriod::new(2024, 1).unwrap(), date(1, 5))
            .unwrap();
        assert_eq!(s.number.to_string(), "INV-2024-002");
        assert_eq!(s.status, InvoiceStatus::Pending);
        assert_eq!((s.paid, s.due), (Decimal::ZERO, dec!(1268)));

        assert!(
            RentSummary::for_period(&invoices, BillingPeriod::new(2024, 2).unwrap(), date(1, 5))
                .is_none()
        );
    }
}
