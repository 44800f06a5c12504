use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value as JsonValue;

use rentease_billing::{
    BillTo, BillingPeriod, ChargeComponent, ChargeVariables, ComponentId, FormulaKind,
    INVOICE_AGGREGATE, Invoice, InvoiceCommand, InvoiceDraft, InvoiceId, InvoiceNumber, MarkPaid,
    MeterReading, PaymentMethod, PaymentPolicy, build_invoice, preview,
};
use rentease_core::{AggregateId, PortfolioId};
use rentease_events::{EventEnvelope, InMemoryEventBus};
use rentease_infra::command_dispatcher::CommandDispatcher;
use rentease_infra::event_store::{EventStore, InMemoryEventStore};
use rentease_infra::projections::InvoicesProjection;
use rentease_infra::read_model::InMemoryPortfolioStore;
use rentease_leasing::{PropertyId, TenantId};

type Dispatcher =
    CommandDispatcher<InMemoryEventStore, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

fn setup() -> (Dispatcher, PortfolioId) {
    let bus = Arc::new(InMemoryEventBus::new());
    (CommandDispatcher::new(InMemoryEventStore::new(), bus), PortfolioId::new())
}

fn components(n: u32) -> Vec<ChargeComponent> {
    let mut out = vec![ChargeComponent::fixed(ComponentId(0), "Base Rent", dec!(1200))];
    for i in 1..n {
        if i % 2 == 0 {
            out.push(ChargeComponent::calculated(
                ComponentId(i),
                format!("Meter {i}"),
                FormulaKind::MeteredConsumption,
            ));
        } else {
            out.push(ChargeComponent::variable(ComponentId(i), format!("Fee {i}"), dec!(49.99)));
        }
    }
    out
}

fn reading() -> ChargeVariables {
    ChargeVariables::from_reading(MeterReading::new(dec!(1000), dec!(1150), dec!(0.12)).unwrap())
}

fn draft(n: u32) -> InvoiceDraft {
    InvoiceDraft::new(
        BillTo {
            tenant_id: TenantId::new(AggregateId::new()),
            property_id: PropertyId::new(AggregateId::new()),
            unit: "4B".to_string(),
        },
        BillingPeriod::new(2024, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        15,
    )
    .unwrap()
    .with_components(components(n))
}

fn issue(dispatcher: &Dispatcher, portfolio_id: PortfolioId, sequence: u32) -> InvoiceId {
    let invoice_id = InvoiceId::new(AggregateId::new());
    let cmd = build_invoice(
        portfolio_id,
        invoice_id,
        InvoiceNumber::new(2024, sequence).unwrap(),
        &draft(3),
        &reading(),
        Utc::now(),
    )
    .unwrap();
    dispatcher
        .dispatch(
            portfolio_id,
            invoice_id.0,
            INVOICE_AGGREGATE,
            InvoiceCommand::IssueInvoice(cmd),
            |id| Invoice::empty(InvoiceId::new(id)),
        )
        .unwrap();
    invoice_id
}

fn bench_charge_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("charge_resolution");
    let vars = reading();

    for n in [3u32, 10, 50].iter() {
        let comps = components(*n);
        group.throughput(Throughput::Elements(u64::from(*n)));
        group.bench_with_input(BenchmarkId::new("preview", n), n, |b, _| {
            b.iter(|| {
                let p = preview(black_box(&comps), black_box(&vars)).unwrap();
                black_box(p.total)
            });
        });
    }

    group.finish();
}

fn bench_invoice_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("invoice_dispatch");
    group.sample_size(500);

    group.bench_function("issue_fresh", |b| {
        let (dispatcher, portfolio_id) = setup();
        let mut sequence = 0u32;
        b.iter(|| {
            sequence += 1;
            black_box(issue(&dispatcher, portfolio_id, sequence))
        });
    });

    group.bench_function("issue_then_mark_paid", |b| {
        let (dispatcher, portfolio_id) = setup();
        let mut sequence = 0u32;
        b.iter(|| {
            sequence += 1;
            let invoice_id = issue(&dispatcher, portfolio_id, sequence);
            let committed = dispatcher
                .dispatch(
                    portfolio_id,
                    invoice_id.0,
                    INVOICE_AGGREGATE,
                    InvoiceCommand::MarkPaid(MarkPaid {
                        portfolio_id,
                        invoice_id,
                        paid_amount: dec!(1268),
                        paid_date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
                        method: PaymentMethod::Upi,
                        reference: None,
                        policy: PaymentPolicy::AcceptAny,
                        occurred_at: Utc::now(),
                    }),
                    |id| Invoice::empty(InvoiceId::new(id)),
                )
                .unwrap();
            black_box(committed.len())
        });
    });

    group.finish();
}

fn bench_projection_rebuild_speed(c: &mut Criterion) {
    let mut group = c.benchmark_group("projection_rebuild_speed");

    for count in [10u32, 100, 1000].iter() {
        let (dispatcher, portfolio_id) = setup();
        for seq in 1..=*count {
            issue(&dispatcher, portfolio_id, seq);
        }
        let envelopes: Vec<EventEnvelope<JsonValue>> = dispatcher
            .store()
            .load_by_type(portfolio_id, INVOICE_AGGREGATE)
            .unwrap()
            .iter()
            .map(|e| e.to_envelope())
            .collect();

        group.throughput(Throughput::Elements(u64::from(*count)));
        group.bench_with_input(BenchmarkId::new("invoices", count), count, |b, _| {
            b.iter(|| {
                let projection = InvoicesProjection::new(InMemoryPortfolioStore::new());
                projection.rebuild_from_scratch(envelopes.clone()).unwrap();
                let outstanding: Decimal = projection
                    .list(portfolio_id)
                    .iter()
                    .map(|v| v.balance())
                    .sum();
                black_box(outstanding)
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_charge_resolution,
    bench_invoice_dispatch,
    bench_projection_rebuild_speed
);
criterion_main!(benches);
