//! Billing engine (event-sourced).
//!
//! Resolves charge components into amounts, aggregates them into invoices, and
//! tracks each invoice from issue to payment. Deterministic domain logic only:
//! no IO, no clocks. Callers pass `today` and timestamps in.

pub mod aggregator;
pub mod charge;
pub mod invoice;
pub mod meter;
pub mod number;
pub mod period;

pub use aggregator::{BillTo, InvoiceDraft, RentPreview, build_invoice, preview, resolve_items};
pub use charge::{
    ChargeComponent, ChargeKind, ChargeVariables, ComponentId, FormulaFallback, FormulaKind,
    resolve, round_to_cents,
};
pub use invoice::{
    Invoice, InvoiceCommand, InvoiceEvent, InvoiceHeader, InvoiceId, InvoiceIssued, InvoiceItem,
    InvoicePaid, InvoiceStatus, InvoiceVoided, IssueInvoice, MarkPaid, Payment, PaymentMethod, PaymentPolicy,
    VoidInvoice, INVOICE_AGGREGATE,
};
pub use meter::{MeterCharges, MeterReading, MeterSheet, MeterSheetId, SheetStatus};
pub use number::InvoiceNumber;
pub use period::BillingPeriod;
