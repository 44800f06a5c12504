use anyhow::Context;
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;

use rentease_app::app::dto::{
    ChargeInput, CreateInvoiceRequest, NewProperty, NewTenant, RecordPayment,
};
use rentease_app::{RentEase, Session};
use rentease_billing::{BillingPeriod, MeterReading, PaymentMethod};
use rentease_core::{PortfolioId, UserId};
use rentease_infra::BillingConfig;
use rentease_leasing::{ContactInfo, PropertyKind, TenancyStatus};

/// Walks one landlord through a month of billing and prints the resulting dashboard.
fn main() -> anyhow::Result<()> {
    rentease_observability::init();

    let config = BillingConfig::from_env().context("invalid billing configuration")?;
    tracing::info!(?config, "starting rentease");

    let service = RentEase::new(config);
    let landlord = Session::landlord(UserId::new(), PortfolioId::new());

    let property = service.register_property(
        &landlord,
        NewProperty {
            name: "Sunset Apartments".to_string(),
            address: "123 Main St, City".to_string(),
            kind: PropertyKind::Apartment,
            total_units: 12,
        },
    )?;

    let today = service.today();
    let lease_start = NaiveDate::from_ymd_opt(today.year(), 1, 1).context("lease start")?;
    let lease_end = NaiveDate::from_ymd_opt(today.year(), 12, 31).context("lease end")?;
    let tenant = service.register_tenant(
        &landlord,
        NewTenant {
            name: "Sarah Johnson".to_string(),
            contact: ContactInfo {
                email: Some("sarah.johnson@email.com".to_string()),
                phone: Some("+1 (555) 123-4567".to_string()),
            },
            property_id: property.property_id,
            unit: "4B".to_string(),
            rent_amount: Decimal::new(1200, 0),
            lease_start,
            lease_end,
            status: TenancyStatus::Active,
        },
    )?;

    let request = CreateInvoiceRequest::new(BillingPeriod::containing(today))
        .with_base_rent()
        .with_charge(ChargeInput::formula(
            "Electricity",
            "(currentReading - previousReading) * unitRate",
        ))
        .with_charge(ChargeInput::variable("Water", Decimal::new(50, 0)))
        .with_reading(MeterReading::new(
            Decimal::new(1000, 0),
            Decimal::new(1150, 0),
            Decimal::new(12, 2),
        )?);
    let invoice = service.create_invoice(&landlord, tenant.tenant_id, request)?;
    println!("issued {} for {} (due {})", invoice.number, invoice.total, invoice.due_date);

    let payment = RecordPayment::new(invoice.total, today, PaymentMethod::Upi).with_reference("TXN123456789");
    let paid = service.mark_paid(&landlord, invoice.number, payment)?;
    println!("{} is {:?}", paid.number, paid.status_on(today));

    let dashboard = service.landlord_dashboard(&landlord)?;
    println!("{}", serde_json::to_string_pretty(&dashboard)?);
    Ok(())
}
