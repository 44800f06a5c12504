use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use rentease_core::{Aggregate, AggregateId, AggregateRoot, DomainError, PortfolioId};
use rentease_events::Event;
use rentease_leasing::{PropertyId, TenantId};

use crate::charge::{ChargeComponent, round_to_cents};
use crate::number::InvoiceNumber;
use crate::period::BillingPeriod;

/// Stream type name used by the event store and projections.
pub const INVOICE_AGGREGATE: &str = "billing.invoice";

/// Invoice stream identifier. The human-facing key is [`InvoiceNumber`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(pub AggregateId);

impl InvoiceId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Reported status. `Overdue` is never stored; see [`Invoice::status_on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Pending,
    Paid,
    Overdue,
    Void,
}

impl InvoiceStatus {
    /// Void wins over paid, paid over overdue. Overdue starts the day after `due_date`.
    pub fn derive(voided: bool, paid: bool, due_date: NaiveDate, today: NaiveDate) -> Self {
        if voided {
            InvoiceStatus::Void
        } else if paid {
            InvoiceStatus::Paid
        } else if today > due_date {
            InvoiceStatus::Overdue
        } else {
            InvoiceStatus::Pending
        }
    }
}

/// A resolved line: the component as billed and its amount in cents precision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub component: ChargeComponent,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    Upi,
    Card,
    Cheque,
}

impl core::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            PaymentMethod::Cash => "Cash",
            PaymentMethod::BankTransfer => "Bank Transfer",
            PaymentMethod::Upi => "UPI",
            PaymentMethod::Card => "Card",
            PaymentMethod::Cheque => "Cheque",
        })
    }
}

/// A settled payment. `reference` is the transaction id given by the payer's bank or app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub paid_amount: Decimal,
    pub paid_date: NaiveDate,
    pub method: PaymentMethod,
    #[serde(default)]
    pub reference: Option<String>,
}

/// How a payment that differs from the invoice total is treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentPolicy {
    /// Any positive amount settles the invoice; the difference stays as the balance.
    #[default]
    AcceptAny,
    RequireExact,
    RejectOverpayment,
}

impl PaymentPolicy {
    pub fn check(self, total: Decimal, paid_amount: Decimal) -> Result<(), DomainError> {
        match self {
            PaymentPolicy::AcceptAny => Ok(()),
            PaymentPolicy::RequireExact if paid_amount != total => Err(DomainError::validation(
                format!("payment of {paid_amount} must equal the invoice total {total}"),
            )),
            PaymentPolicy::RejectOverpayment if paid_amount > total => {
                Err(DomainError::validation(format!(
                    "payment of {paid_amount} exceeds the invoice total {total}"
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Who and what an invoice bills.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceHeader {
    pub number: InvoiceNumber,
    pub tenant_id: TenantId,
    pub property_id: PropertyId,
    pub unit: String,
    pub period: BillingPeriod,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
}

/// Aggregate root: one invoice from issue to payment (or void).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    id: InvoiceId,
    portfolio_id: Option<PortfolioId>,
    header: Option<InvoiceHeader>,
    items: Vec<InvoiceItem>,
    total: Decimal,
    payment: Option<Payment>,
    void_reason: Option<String>,
    voided: bool,
    version: u64,
    created: bool,
}

impl Invoice {
    pub fn empty(id: InvoiceId) -> Self {
        Self {
            id,
            portfolio_id: None,
            header: None,
            items: Vec::new(),
            total: Decimal::ZERO,
            payment: None,
            void_reason: None,
            voided: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> InvoiceId {
        self.id
    }

    pub fn portfolio_id(&self) -> Option<PortfolioId> {
        self.portfolio_id
    }

    pub fn header(&self) -> Option<&InvoiceHeader> {
        self.header.as_ref()
    }

    pub fn number(&self) -> Option<InvoiceNumber> {
        self.header.as_ref().map(|h| h.number)
    }

    pub fn items(&self) -> &[InvoiceItem] {
        &self.items
    }

    pub fn total(&self) -> Decimal {
        self.total
    }

    pub fn payment(&self) -> Option<&Payment> {
        self.payment.as_ref()
    }

    pub fn void_reason(&self) -> Option<&str> {
        self.void_reason.as_deref()
    }

    /// Status as seen on `today`.
    pub fn status_on(&self, today: NaiveDate) -> InvoiceStatus {
        let due_date = self.header.as_ref().map_or(today, |h| h.due_date);
        InvoiceStatus::derive(self.voided, self.payment.is_some(), due_date, today)
    }

    /// Total minus what was paid. Negative after an overpayment.
    pub fn balance(&self) -> Decimal {
        self.total - self.payment.as_ref().map_or(Decimal::ZERO, |p| p.paid_amount)
    }
}

impl AggregateRoot for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueInvoice {
    pub portfolio_id: PortfolioId,
    pub invoice_id: InvoiceId,
    pub header: InvoiceHeader,
    pub items: Vec<InvoiceItem>,
    pub occurred_at: DateTime<Utc>,
}

/// Records a payment. "Today" for date checks is `occurred_at`'s calendar day (UTC).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkPaid {
    pub portfolio_id: PortfolioId,
    pub invoice_id: InvoiceId,
    pub paid_amount: Decimal,
    pub paid_date: NaiveDate,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub policy: PaymentPolicy,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidInvoice {
    pub portfolio_id: PortfolioId,
    pub invoice_id: InvoiceId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceCommand {
    IssueInvoice(IssueInvoice),
    MarkPaid(MarkPaid),
    VoidInvoice(VoidInvoice),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceIssued {
    pub portfolio_id: PortfolioId,
    pub invoice_id: InvoiceId,
    pub header: InvoiceHeader,
    pub items: Vec<InvoiceItem>,
    pub total: Decimal,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoicePaid {
    pub portfolio_id: PortfolioId,
    pub invoice_id: InvoiceId,
    pub payment: Payment,
    pub balance: Decimal,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceVoided {
    pub portfolio_id: PortfolioId,
    pub invoice_id: InvoiceId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceEvent {
    InvoiceIssued(InvoiceIssued),
    InvoicePaid(InvoicePaid),
    InvoiceVoided(InvoiceVoided),
}

impl InvoiceEvent {
    pub fn portfolio_and_invoice(&self) -> (PortfolioId, InvoiceId) {
        match self {
            InvoiceEvent::InvoiceIssued(e) => (e.portfolio_id, e.invoice_id),
            InvoiceEvent::InvoicePaid(e) => (e.portfolio_id, e.invoice_id),
            InvoiceEvent::InvoiceVoided(e) => (e.portfolio_id, e.invoice_id),
        }
    }
}

impl Event for InvoiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InvoiceEvent::InvoiceIssued(_) => "billing.invoice.issued",
            InvoiceEvent::InvoicePaid(_) => "billing.invoice.paid",
            InvoiceEvent::InvoiceVoided(_) => "billing.invoice.voided",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InvoiceEvent::InvoiceIssued(e) => e.occurred_at,
            InvoiceEvent::InvoicePaid(e) => e.occurred_at,
            InvoiceEvent::InvoiceVoided(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Invoice {
    type Command = InvoiceCommand;
    type Event = InvoiceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InvoiceEvent::InvoiceIssued(e) => {
                self.id = e.invoice_id;
                self.portfolio_id = Some(e.portfolio_id);
                self.header = Some(e.header.clone());
                self.items = e.items.clone();
                self.total = e.total;
                self.payment = None;
                self.created = true;
            }
            InvoiceEvent::InvoicePaid(e) => {
                self.payment = Some(e.payment.clone());
            }
            InvoiceEvent::InvoiceVoided(e) => {
                self.voided = true;
                self.void_reason = e.reason.clone();
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InvoiceCommand::IssueInvoice(cmd) => self.handle_issue(cmd),
            InvoiceCommand::MarkPaid(cmd) => self.handle_mark_paid(cmd),
            InvoiceCommand::VoidInvoice(cmd) => self.handle_void(cmd),
        }
    }
}

impl Invoice {
    fn ensure_issued(
        &self,
        portfolio_id: PortfolioId,
        invoice_id: InvoiceId,
    ) -> Result<&InvoiceHeader, DomainError> {
        let header = match (&self.header, self.created) {
            (Some(h), true) => h,
            _ => return Err(DomainError::not_found()),
        };
        if self.portfolio_id != Some(portfolio_id) {
            return Err(DomainError::invariant("portfolio mismatch"));
        }
        if self.id != invoice_id {
            return Err(DomainError::invariant("invoice_id mismatch"));
        }
        Ok(header)
    }

    fn handle_issue(&self, cmd: &IssueInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("invoice already exists"));
        }
        let header = &cmd.header;

        if cmd.items.is_empty() {
            return Err(DomainError::validation("cannot issue an invoice without items"));
        }
        if header.unit.trim().is_empty() {
            return Err(DomainError::validation("invoice unit cannot be empty"));
        }
        if header.number.year() != header.period.year() {
            return Err(DomainError::invariant(format!(
                "invoice number {} does not belong to billing year {}",
                header.number,
                header.period.year()
            )));
        }
        if header.due_date < header.issue_date {
            return Err(DomainError::validation(format!(
                "due date {} precedes issue date {}",
                header.due_date, header.issue_date
            )));
        }

        let mut total = Decimal::ZERO;
        for item in &cmd.items {
            if item.amount < Decimal::ZERO {
                return Err(DomainError::validation(format!(
                    "item {:?} has a negative amount",
                    item.component.name
                )));
            }
            if round_to_cents(item.amount) != item.amount {
                return Err(DomainError::invariant(format!(
                    "item {:?} is not rounded to cents",
                    item.component.name
                )));
            }
            total = total
                .checked_add(item.amount)
                .ok_or_else(|| DomainError::invariant("invoice total overflow"))?;
        }
        if total <= Decimal::ZERO {
            return Err(DomainError::validation("invoice total must be positive"));
        }

        Ok(vec![InvoiceEvent::InvoiceIssued(InvoiceIssued {
            portfolio_id: cmd.portfolio_id,
            invoice_id: cmd.invoice_id,
            header: header.clone(),
            items: cmd.items.clone(),
            total,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_paid(&self, cmd: &MarkPaid) -> Result<Vec<InvoiceEvent>, DomainError> {
        let header = self.ensure_issued(cmd.portfolio_id, cmd.invoice_id)?;

        if self.voided {
            return Err(DomainError::invariant("a void invoice cannot be paid"));
        }
        let reference = match cmd.reference.as_deref().map(str::trim) {
            Some("") => return Err(DomainError::validation("payment reference cannot be blank")),
            other => other.map(str::to_string),
        };
        let payment = Payment {
            paid_amount: cmd.paid_amount,
            paid_date: cmd.paid_date,
            method: cmd.method,
            reference,
        };

        if let Some(existing) = &self.payment {
            if *existing == payment {
                return Ok(vec![]);
            }
            return Err(DomainError::conflict(format!(
                "invoice {} was already paid {} by {} on {}",
                header.number, existing.paid_amount, existing.method, existing.paid_date
            )));
        }

        if cmd.paid_amount <= Decimal::ZERO {
            return Err(DomainError::validation("paid amount must be positive"));
        }
        let today = cmd.occurred_at.date_naive();
        if cmd.paid_date > today {
            return Err(DomainError::validation(format!(
                "paid date {} is in the future",
                cmd.paid_date
            )));
        }
        if cmd.paid_date < header.issue_date {
            return Err(DomainError::validation(format!(
                "paid date {} precedes issue date {}",
                cmd.paid_date, header.issue_date
            )));
        }
        cmd.policy.check(self.total, cmd.paid_amount)?;

        Ok(vec![InvoiceEvent::InvoicePaid(InvoicePaid {
            portfolio_id: cmd.portfolio_id,
            invoice_id: cmd.invoice_id,
            payment,
            balance: self.total - cmd.paid_amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_void(&self, cmd: &VoidInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_issued(cmd.portfolio_id, cmd.invoice_id)?;

        if self.voided {
            return Err(DomainError::conflict("invoice is already void"));
        }
        if self.payment.is_some() {
            return Err(DomainError::invariant("a paid invoice cannot be voided"));
        }

        Ok(vec![InvoiceEvent::InvoiceVoided(InvoiceVoided {
            portfolio_id: cmd.portfolio_id,
            invoice_id: cmd.invoice_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charge::ComponentId;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn item(id: u32, name: &str, amount: Decimal) -> InvoiceItem {
        InvoiceItem {
            component: ChargeComponent::fixed(ComponentId(id), name, amount),
            amount,
        }
    }

    struct Fixture {
        portfolio_id: PortfolioId,
        invoice_id: InvoiceId,
        invoice: Invoice,
    }

    fn issue_cmd(portfolio_id: PortfolioId, invoice_id: InvoiceId) -> IssueInvoice {
        IssueInvoice {
            portfolio_id,
            invoice_id,
            header: InvoiceHeader {
                number: InvoiceNumber::new(2024, 1).unwrap(),
                tenant_id: TenantId::new(AggregateId::new()),
                property_id: PropertyId::new(AggregateId::new()),
                unit: "4B".to_string(),
                period: BillingPeriod::new(2024, 1).unwrap(),
                issue_date: date(2024, 1, 1),
                due_date: date(2024, 1, 15),
            },
            items: vec![
                item(1, "Base Rent", dec!(1200)),
                item(2, "Electricity", dec!(118)),
                item(3, "Water", dec!(50)),
            ],
            occurred_at: at(2024, 1, 1),
        }
    }

    fn issued() -> Fixture {
        let portfolio_id = PortfolioId::new();
        let invoice_id = InvoiceId::new(AggregateId::new());
        let mut invoice = Invoice::empty(invoice_id);
        let events = invoice
            .handle(&InvoiceCommand::IssueInvoice(issue_cmd(portfolio_id, invoice_id)))
            .unwrap();
        for e in &events {
            invoice.apply(e);
        }
        Fixture {
            portfolio_id,
            invoice_id,
            invoice,
        }
    }

    fn pay(f: &Fixture, amount: Decimal, paid: NaiveDate, policy: PaymentPolicy) -> InvoiceCommand {
        InvoiceCommand::MarkPaid(MarkPaid {
            portfolio_id: f.portfolio_id,
            invoice_id: f.invoice_id,
            paid_amount: amount,
            paid_date: paid,
            method: PaymentMethod::Upi,
            reference: Some("TXN123456789".to_string()),
            policy,
            occurred_at: at(2024, 1, 20),
        })
    }

    fn run(invoice: &mut Invoice, cmd: InvoiceCommand) -> Result<Vec<InvoiceEvent>, DomainError> {
        let events = invoice.handle(&cmd)?;
        for e in &events {
            invoice.apply(e);
        }
        Ok(events)
    }

    #[test]
    fn issue_sums_items_and_starts_pending() {
        let f = issued();
        assert_eq!(f.invoice.total(), dec!(1368));
        assert_eq!(f.invoice.version(), 1);
        assert_eq!(f.invoice.status_on(date(2024, 1, 10)), InvoiceStatus::Pending);
        assert_eq!(f.invoice.number().unwrap().to_string(), "INV-2024-001");
    }

    #[test]
    fn issue_rejects_empty_zero_and_unrounded_items() {
        let portfolio_id = PortfolioId::new();
        let invoice_id = InvoiceId::new(AggregateId::new());
        let invoice = Invoice::empty(invoice_id);

        let mut cmd = issue_cmd(portfolio_id, invoice_id);
        cmd.items.clear();
        assert!(matches!(
            invoice.handle(&InvoiceCommand::IssueInvoice(cmd)),
            Err(DomainError::Validation(_))
        ));

        let mut cmd = issue_cmd(portfolio_id, invoice_id);
        cmd.items = vec![item(1, "Nothing", dec!(0))];
        assert!(matches!(
            invoice.handle(&InvoiceCommand::IssueInvoice(cmd)),
            Err(DomainError::Validation(_))
        ));

        let mut cmd = issue_cmd(portfolio_id, invoice_id);
        cmd.items = vec![item(1, "Gas", dec!(1.005))];
        assert!(matches!(
            invoice.handle(&InvoiceCommand::IssueInvoice(cmd)),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    #[test]
    fn issue_rejects_number_from_another_year_and_due_before_issue() {
        let portfolio_id = PortfolioId::new();
        let invoice_id = InvoiceId::new(AggregateId::new());
        let invoice = Invoice::empty(invoice_id);

        let mut cmd = issue_cmd(portfolio_id, invoice_id);
        cmd.header.number = InvoiceNumber::new(2023, 9).unwrap();
        assert!(invoice.handle(&InvoiceCommand::IssueInvoice(cmd)).is_err());

        let mut cmd = issue_cmd(portfolio_id, invoice_id);
        cmd.header.due_date = date(2023, 12, 31);
        assert!(invoice.handle(&InvoiceCommand::IssueInvoice(cmd)).is_err());
    }

    #[test]
    fn cannot_issue_twice() {
        let f = issued();
        let err = f
            .invoice
            .handle(&InvoiceCommand::IssueInvoice(issue_cmd(f.portfolio_id, f.invoice_id)))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn overdue_is_derived_from_the_date() {
        let f = issued();
        assert_eq!(f.invoice.status_on(date(2024, 1, 15)), InvoiceStatus::Pending);
        assert_eq!(f.invoice.status_on(date(2024, 1, 16)), InvoiceStatus::Overdue);
        assert_eq!(f.invoice.version(), 1);
    }

    #[test]
    fn mark_paid_sets_both_payment_fields() {
        let mut f = issued();
        let cmd = pay(&f, dec!(1368), date(2024, 1, 14), PaymentPolicy::AcceptAny);
        let events = run(&mut f.invoice, cmd).unwrap();
        assert_eq!(events.len(), 1);

        let payment = f.invoice.payment().unwrap();
        assert_eq!(payment.paid_amount, dec!(1368));
        assert_eq!(payment.paid_date, date(2024, 1, 14));
        assert_eq!(payment.method, PaymentMethod::Upi);
        assert_eq!(payment.reference.as_deref(), Some("TXN123456789"));
        assert_eq!(f.invoice.status_on(date(2024, 3, 1)), InvoiceStatus::Paid);
        assert_eq!(f.invoice.balance(), dec!(0));
    }

    #[test]
    fn overdue_invoice_can_be_paid() {
        let mut f = issued();
        assert_eq!(f.invoice.status_on(date(2024, 1, 20)), InvoiceStatus::Overdue);
        let cmd = pay(&f, dec!(1368), date(2024, 1, 20), PaymentPolicy::AcceptAny);
        run(&mut f.invoice, cmd).unwrap();
        assert_eq!(f.invoice.status_on(date(2024, 1, 20)), InvoiceStatus::Paid);
    }

    #[test]
    fn identical_resubmission_is_idempotent() {
        let mut f = issued();
        let cmd = pay(&f, dec!(1368), date(2024, 1, 14), PaymentPolicy::AcceptAny);
        run(&mut f.invoice, cmd.clone()).unwrap();
        let version = f.invoice.version();

        assert!(run(&mut f.invoice, cmd).unwrap().is_empty());
        assert_eq!(f.invoice.version(), version);
    }

    #[test]
    fn different_resubmission_conflicts() {
        let mut f = issued();
        let first = pay(&f, dec!(1368), date(2024, 1, 14), PaymentPolicy::AcceptAny);
        run(&mut f.invoice, first).unwrap();

        let second = pay(&f, dec!(1000), date(2024, 1, 14), PaymentPolicy::AcceptAny);
        assert!(matches!(
            f.invoice.handle(&second),
            Err(DomainError::Conflict(_))
        ));

        let mut by_cash = pay(&f, dec!(1368), date(2024, 1, 14), PaymentPolicy::AcceptAny);
        if let InvoiceCommand::MarkPaid(cmd) = &mut by_cash {
            cmd.method = PaymentMethod::Cash;
            cmd.reference = None;
        }
        assert!(matches!(
            f.invoice.handle(&by_cash),
            Err(DomainError::Conflict(_))
        ));
    }

    #[test]
    fn reference_is_trimmed_and_blank_is_rejected() {
        let mut f = issued();
        let mut padded = pay(&f, dec!(1368), date(2024, 1, 14), PaymentPolicy::AcceptAny);
        let mut blank = padded.clone();
        if let InvoiceCommand::MarkPaid(cmd) = &mut padded {
            cmd.reference = Some("  TXN987654321 ".to_string());
        }
        if let InvoiceCommand::MarkPaid(cmd) = &mut blank {
            cmd.reference = Some("   ".to_string());
        }

        assert!(matches!(f.invoice.handle(&blank), Err(DomainError::Validation(_))));
        run(&mut f.invoice, padded.clone()).unwrap();
        assert_eq!(
            f.invoice.payment().and_then(|p| p.reference.as_deref()),
            Some("TXN987654321")
        );
        assert!(run(&mut f.invoice, padded).unwrap().is_empty());
    }

    #[test]
    fn payment_dates_are_checked() {
        let f = issued();
        let future = pay(&f, dec!(1368), date(2024, 1, 21), PaymentPolicy::AcceptAny);
        assert!(matches!(f.invoice.handle(&future), Err(DomainError::Validation(_))));

        let before_issue = pay(&f, dec!(1368), date(2023, 12, 31), PaymentPolicy::AcceptAny);
        assert!(matches!(
            f.invoice.handle(&before_issue),
            Err(DomainError::Validation(_))
        ));

        let zero = pay(&f, dec!(0), date(2024, 1, 10), PaymentPolicy::AcceptAny);
        assert!(matches!(f.invoice.handle(&zero), Err(DomainError::Validation(_))));
    }

    #[test]
    fn payment_policy_governs_partial_and_over_payment() {
        let f = issued();
        let partial = pay(&f, dec!(1000), date(2024, 1, 10), PaymentPolicy::RequireExact);
        assert!(f.invoice.handle(&partial).is_err());

        let over = pay(&f, dec!(1400), date(2024, 1, 10), PaymentPolicy::RejectOverpayment);
        assert!(f.invoice.handle(&over).is_err());

        let partial_ok = pay(&f, dec!(1000), date(2024, 1, 10), PaymentPolicy::RejectOverpayment);
        match &f.invoice.handle(&partial_ok).unwrap()[0] {
            InvoiceEvent::InvoicePaid(e) => assert_eq!(e.balance, dec!(368)),
            other => panic!("expected InvoicePaid, got {other:?}"),
        }

        let over_ok = pay(&f, dec!(1400), date(2024, 1, 10), PaymentPolicy::AcceptAny);
        match &f.invoice.handle(&over_ok).unwrap()[0] {
            InvoiceEvent::InvoicePaid(e) => assert_eq!(e.balance, dec!(-32)),
            other => panic!("expected InvoicePaid, got {other:?}"),
        }
    }

    #[test]
    fn void_blocks_payment_and_paid_blocks_void() {
        let mut f = issued();
        let void = InvoiceCommand::VoidInvoice(VoidInvoice {
            portfolio_id: f.portfolio_id,
            invoice_id: f.invoice_id,
            reason: Some("issued to wrong unit".into()),
            occurred_at: at(2024, 1, 2),
        });
        run(&mut f.invoice, void.clone()).unwrap();
        assert_eq!(f.invoice.status_on(date(2024, 2, 1)), InvoiceStatus::Void);
        assert_eq!(f.invoice.void_reason(), Some("issued to wrong unit"));

        let cmd = pay(&f, dec!(1368), date(2024, 1, 10), PaymentPolicy::AcceptAny);
        assert!(matches!(
            f.invoice.handle(&cmd),
            Err(DomainError::InvariantViolation(_))
        ));
        assert!(matches!(f.invoice.handle(&void), Err(DomainError::Conflict(_))));

        let mut paid = issued();
        let cmd = pay(&paid, dec!(1368), date(2024, 1, 10), PaymentPolicy::AcceptAny);
        run(&mut paid.invoice, cmd).unwrap();
        let void = InvoiceCommand::VoidInvoice(VoidInvoice {
            portfolio_id: paid.portfolio_id,
            invoice_id: paid.invoice_id,
            reason: None,
            occurred_at: at(2024, 1, 11),
        });
        assert!(paid.invoice.handle(&void).is_err());
    }

    #[test]
    fn unknown_invoice_and_foreign_portfolio_are_rejected() {
        let invoice_id = InvoiceId::new(AggregateId::new());
        let empty = Invoice::empty(invoice_id);
        let cmd = InvoiceCommand::VoidInvoice(VoidInvoice {
            portfolio_id: PortfolioId::new(),
            invoice_id,
            reason: None,
            occurred_at: at(2024, 1, 2),
        });
        assert_eq!(empty.handle(&cmd).unwrap_err(), DomainError::NotFound);

        let f = issued();
        let foreign = InvoiceCommand::MarkPaid(MarkPaid {
            portfolio_id: PortfolioId::new(),
            invoice_id: f.invoice_id,
            paid_amount: dec!(1368),
            paid_date: date(2024, 1, 10),
            method: PaymentMethod::Cash,
            reference: None,
            policy: PaymentPolicy::AcceptAny,
            occurred_at: at(2024, 1, 20),
        });
        assert!(matches!(
            f.invoice.handle(&foreign),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    #[test]
    fn replay_rebuilds_identical_state() {
        let mut f = issued();
        let cmd = pay(&f, dec!(1368), date(2024, 1, 14), PaymentPolicy::AcceptAny);
        run(&mut f.invoice, cmd).unwrap();

        let mut history = vec![InvoiceEvent::InvoiceIssued(InvoiceIssued {
            portfolio_id: f.portfolio_id,
            invoice_id: f.invoice_id,
            header: f.invoice.header().unwrap().clone(),
            items: f.invoice.items().to_vec(),
            total: f.invoice.total(),
            occurred_at: at(2024, 1, 1),
        })];
        history.push(InvoiceEvent::InvoicePaid(InvoicePaid {
            portfolio_id: f.portfolio_id,
            invoice_id: f.invoice_id,
            payment: f.invoice.payment().unwrap().clone(),
            balance: dec!(0),
            occurred_at: at(2024, 1, 20),
        }));

        let mut replayed = Invoice::empty(f.invoice_id);
        for e in &history {
            replayed.apply(e);
        }
        assert_eq!(replayed, f.invoice);
    }

    #[test]
    fn event_type_names_are_namespaced() {
        let f = issued();
        let cmd = pay(&f, dec!(1368), date(2024, 1, 14), PaymentPolicy::AcceptAny);
        let events = f.invoice.handle(&cmd).unwrap();
        assert_eq!(events[0].event_type(), "billing.invoice.paid");
        assert_eq!(events[0].occurred_at(), at(2024, 1, 20));
    }
}
