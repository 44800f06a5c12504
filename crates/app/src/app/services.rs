//! In-process RentEase backend.
//!
//! Commands go through the event-sourced [`CommandDispatcher`]; after every successful
//! dispatch the published envelopes are drained into the projections, so queries made
//! right after a command observe it.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use rentease_billing::{
    BillTo, BillingPeriod, ChargeComponent, ChargeVariables, ComponentId, INVOICE_AGGREGATE,
    Invoice, InvoiceCommand, InvoiceDraft, InvoiceId, InvoiceNumber, MarkPaid, MeterSheet,
    MeterSheetId, RentPreview, VoidInvoice, build_invoice, preview, resolve,
};
use rentease_core::{Aggregate, AggregateId, DomainError, PortfolioId};
use rentease_events::{Event, EventBus, EventEnvelope, InMemoryEventBus, Subscription};
use rentease_infra::command_dispatcher::CommandDispatcher;
use rentease_infra::event_store::{EventStore, InMemoryEventStore};
use rentease_infra::projections::{
    InvoiceView, InvoicesProjection, PropertiesProjection, PropertyView,
    TenantDirectoryProjection, TenantFilter, TenantView,
};
use rentease_infra::read_model::{InMemoryPortfolioStore, PortfolioStore};
use rentease_infra::{BillingConfig, InvoiceSequence};
use rentease_leasing::{
    ChangeTenantStatus, OccupyUnit, PROPERTY_AGGREGATE, Property, PropertyCommand, PropertyId,
    RegisterProperty, RegisterTenant, RemoveTenant, TENANT_AGGREGATE, TenancyStatus, Tenant,
    TenantChanges, TenantCommand, TenantId, UpdateProperty, UpdateTenant, VacateUnit,
};

use crate::app::dto::{
    CreateInvoiceRequest, InvoiceFilter, MeterSheetChanges, NewMeterSheet, NewProperty,
    NewTenant, PropertyChanges, RecordPayment, components_from_inputs,
};
use crate::app::errors::AppError;
use crate::app::reports::{LandlordDashboard, PaymentHistory, RentSummary};
use crate::authz::{require_landlord, require_tenant_access};
use crate::context::Session;

type Envelope = EventEnvelope<JsonValue>;
type Bus = Arc<InMemoryEventBus<Envelope>>;
type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Bus>;

/// Source of the current time. A plain function so tests can pin the date.
pub type Clock = fn() -> DateTime<Utc>;

pub struct RentEase {
    dispatcher: Dispatcher,
    subscription: Mutex<Subscription<Envelope>>,
    invoices: InvoicesProjection<InMemoryPortfolioStore<InvoiceId, InvoiceView>>,
    tenants: TenantDirectoryProjection<InMemoryPortfolioStore<TenantId, TenantView>>,
    properties: PropertiesProjection<InMemoryPortfolioStore<PropertyId, PropertyView>>,
    meter_sheets: InMemoryPortfolioStore<MeterSheetId, MeterSheet>,
    sequence: InvoiceSequence,
    config: BillingConfig,
    clock: Clock,
}

impl std::fmt::Debug for RentEase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RentEase")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RentEase {
    pub fn new(config: BillingConfig) -> Self {
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let subscription = bus.subscribe();
        Self {
            dispatcher: CommandDispatcher::new(Arc::new(InMemoryEventStore::new()), bus),
            subscription: Mutex::new(subscription),
            invoices: InvoicesProjection::new(InMemoryPortfolioStore::new()),
            tenants: TenantDirectoryProjection::new(InMemoryPortfolioStore::new()),
            properties: PropertiesProjection::new(InMemoryPortfolioStore::new()),
            meter_sheets: InMemoryPortfolioStore::new(),
            sequence: InvoiceSequence::new(),
            config,
            clock: Utc::now,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &BillingConfig {
        &self.config
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    // ---- plumbing ---------------------------------------------------------

    fn dispatch<A>(
        &self,
        portfolio_id: PortfolioId,
        aggregate_id: AggregateId,
        aggregate_type: &'static str,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<usize, AppError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: Event + Serialize + DeserializeOwned,
    {
        let committed = self
            .dispatcher
            .dispatch(portfolio_id, aggregate_id, aggregate_type, command, make_aggregate)
            .inspect_err(|e| {
                tracing::warn!(%portfolio_id, %aggregate_id, aggregate_type, error = %e, "command rejected");
            })?;
        self.sync()?;
        Ok(committed.len())
    }

    /// Applies every envelope published so far to the projections.
    fn sync(&self) -> Result<(), AppError> {
        let pending = self
            .subscription
            .lock()
            .map_err(|_| AppError::Poisoned("event subscription"))?
            .drain();
        for envelope in &pending {
            self.invoices.apply_envelope(envelope)?;
            self.tenants.apply_envelope(envelope)?;
            self.properties.apply_envelope(envelope)?;
        }
        Ok(())
    }

    fn load_tenant(&self, portfolio_id: PortfolioId, tenant_id: TenantId) -> Result<Tenant, AppError> {
        let tenant = self
            .dispatcher
            .load(portfolio_id, tenant_id.0, |id| Tenant::empty(TenantId::new(id)))?;
        if tenant.portfolio_id() != Some(portfolio_id) || tenant.is_removed() {
            return Err(AppError::not_found(format!("tenant {tenant_id}")));
        }
        Ok(tenant)
    }

    fn load_property(
        &self,
        portfolio_id: PortfolioId,
        property_id: PropertyId,
    ) -> Result<Property, AppError> {
        let property = self
            .dispatcher
            .load(portfolio_id, property_id.0, |id| Property::empty(PropertyId::new(id)))?;
        if property.portfolio_id() != Some(portfolio_id) {
            return Err(AppError::not_found(format!("property {property_id}")));
        }
        Ok(property)
    }

    fn invoice_by_number(
        &self,
        portfolio_id: PortfolioId,
        number: InvoiceNumber,
    ) -> Result<InvoiceView, AppError> {
        self.invoices
            .get_by_number(portfolio_id, number)
            .ok_or_else(|| AppError::not_found(format!("invoice {number}")))
    }

    fn occupy(&self, portfolio_id: PortfolioId, property_id: PropertyId, unit: &str) -> Result<(), AppError> {
        self.dispatch(
            portfolio_id,
            property_id.0,
            PROPERTY_AGGREGATE,
            PropertyCommand::OccupyUnit(OccupyUnit {
                portfolio_id,
                property_id,
                unit: unit.to_string(),
                occurred_at: self.now(),
            }),
            |id| Property::empty(PropertyId::new(id)),
        )?;
        Ok(())
    }

    fn vacate(&self, portfolio_id: PortfolioId, property_id: PropertyId, unit: &str) -> Result<(), AppError> {
        self.dispatch(
            portfolio_id,
            property_id.0,
            PROPERTY_AGGREGATE,
            PropertyCommand::VacateUnit(VacateUnit {
                portfolio_id,
                property_id,
                unit: unit.to_string(),
                occurred_at: self.now(),
            }),
            |id| Property::empty(PropertyId::new(id)),
        )?;
        Ok(())
    }

    fn ensure_vacancy(&self, property: &Property) -> Result<(), AppError> {
        if property.vacant_units() == 0 {
            return Err(DomainError::invariant(format!(
                "all {} units of '{}' are occupied",
                property.total_units(),
                property.name()
            ))
            .into());
        }
        Ok(())
    }

    /// Replays the event store into fresh read models and resynchronizes the
    /// invoice number allocator with what was issued.
    pub fn rebuild_read_models(&self, session: &Session) -> Result<(), AppError> {
        require_landlord(session, "rebuild_read_models")?;
        let portfolio_id = session.portfolio_id();
        // anything still queued is already in the store
        self.subscription
            .lock()
            .map_err(|_| AppError::Poisoned("event subscription"))?
            .drain();

        let store = self.dispatcher.store();
        let replay = |aggregate_type: &str| -> Result<Vec<Envelope>, AppError> {
            Ok(store
                .load_by_type(portfolio_id, aggregate_type)
                .map_err(rentease_infra::DispatchError::from)?
                .iter()
                .map(|e| e.to_envelope())
                .collect())
        };

        self.properties.rebuild_from_scratch(replay(PROPERTY_AGGREGATE)?)?;
        self.tenants.rebuild_from_scratch(replay(TENANT_AGGREGATE)?)?;
        self.invoices.rebuild_from_scratch(replay(INVOICE_AGGREGATE)?)?;
        for invoice in self.invoices.list(portfolio_id) {
            self.sequence.observe(portfolio_id, invoice.number)?;
        }

        tracing::info!(%portfolio_id, "read models rebuilt");
        Ok(())
    }

    // ---- properties -------------------------------------------------------

    pub fn register_property(&self, session: &Session, new: NewProperty) -> Result<PropertyView, AppError> {
        require_landlord(session, "register_property")?;
        let portfolio_id = session.portfolio_id();
        let property_id = PropertyId::new(AggregateId::new());

        self.dispatch(
            portfolio_id,
            property_id.0,
            PROPERTY_AGGREGATE,
            PropertyCommand::RegisterProperty(RegisterProperty {
                portfolio_id,
                property_id,
                name: new.name,
                address: new.address,
                kind: new.kind,
                total_units: new.total_units,
                occurred_at: self.now(),
            }),
            |id| Property::empty(PropertyId::new(id)),
        )?;

        tracing::info!(%portfolio_id, %property_id, "property registered");
        self.get_property(session, property_id)
    }

    pub fn update_property(
        &self,
        session: &Session,
        property_id: PropertyId,
        changes: PropertyChanges,
    ) -> Result<PropertyView, AppError> {
        require_landlord(session, "update_property")?;
        let portfolio_id = session.portfolio_id();

        self.dispatch(
            portfolio_id,
            property_id.0,
            PROPERTY_AGGREGATE,
            PropertyCommand::UpdateProperty(UpdateProperty {
                portfolio_id,
                property_id,
                name: changes.name,
                address: changes.address,
                kind: changes.kind,
                total_units: changes.total_units,
                occurred_at: self.now(),
            }),
            |id| Property::empty(PropertyId::new(id)),
        )?;

        tracing::info!(%portfolio_id, %property_id, "property updated");
        self.get_property(session, property_id)
    }

    pub fn get_property(&self, session: &Session, property_id: PropertyId) -> Result<PropertyView, AppError> {
        require_landlord(session, "get_property")?;
        self.properties
            .get(session.portfolio_id(), &property_id)
            .ok_or_else(|| AppError::not_found(format!("property {property_id}")))
    }

    pub fn list_properties(&self, session: &Session) -> Result<Vec<PropertyView>, AppError> {
        require_landlord(session, "list_properties")?;
        Ok(self.properties.list(session.portfolio_id()))
    }

    pub fn tenants_of_property(
        &self,
        session: &Session,
        property_id: PropertyId,
    ) -> Result<Vec<TenantView>, AppError> {
        let filter = TenantFilter {
            property_id: Some(property_id),
            ..TenantFilter::default()
        };
        self.search_tenants(session, &filter)
    }

    // ---- tenants ----------------------------------------------------------

    /// Registers a tenant and occupies one unit of their property.
    pub fn register_tenant(&self, session: &Session, new: NewTenant) -> Result<TenantView, AppError> {
        require_landlord(session, "register_tenant")?;
        let portfolio_id = session.portfolio_id();
        let property = self.load_property(portfolio_id, new.property_id)?;
        self.ensure_vacancy(&property)?;

        let tenant_id = TenantId::new(AggregateId::new());
        let unit = new.unit.clone();
        self.dispatch(
            portfolio_id,
            tenant_id.0,
            TENANT_AGGREGATE,
            TenantCommand::RegisterTenant(RegisterTenant {
                portfolio_id,
                tenant_id,
                name: new.name,
                contact: new.contact,
                property_id: new.property_id,
                unit: new.unit,
                rent_amount: new.rent_amount,
                lease_start: new.lease_start,
                lease_end: new.lease_end,
                status: new.status,
                occurred_at: self.now(),
            }),
            |id| Tenant::empty(TenantId::new(id)),
        )?;
        self.occupy(portfolio_id, new.property_id, unit.trim())?;

        tracing::info!(%portfolio_id, %tenant_id, property_id = %new.property_id, "tenant registered");
        self.get_tenant(session, tenant_id)
    }

    /// Edits a tenant. Moving to another property frees a unit there and takes one here.
    pub fn update_tenant(
        &self,
        session: &Session,
        tenant_id: TenantId,
        changes: TenantChanges,
    ) -> Result<TenantView, AppError> {
        require_landlord(session, "update_tenant")?;
        let portfolio_id = session.portfolio_id();
        let before = self.load_tenant(portfolio_id, tenant_id)?;
        let previous_property = before
            .property_id()
            .ok_or_else(|| AppError::not_found(format!("tenant {tenant_id}")))?;
        let moving_to = changes.property_id.filter(|p| *p != previous_property);

        if let Some(target) = moving_to {
            let property = self.load_property(portfolio_id, target)?;
            self.ensure_vacancy(&property)?;
        }

        self.dispatch(
            portfolio_id,
            tenant_id.0,
            TENANT_AGGREGATE,
            TenantCommand::UpdateTenant(UpdateTenant {
                portfolio_id,
                tenant_id,
                changes,
                occurred_at: self.now(),
            }),
            |id| Tenant::empty(TenantId::new(id)),
        )?;

        if let Some(target) = moving_to {
            let after = self.load_tenant(portfolio_id, tenant_id)?;
            self.vacate(portfolio_id, previous_property, before.unit())?;
            self.occupy(portfolio_id, target, after.unit())?;
            tracing::info!(%portfolio_id, %tenant_id, from = %previous_property, to = %target, "tenant moved");
        }

        tracing::info!(%portfolio_id, %tenant_id, "tenant updated");
        self.get_tenant(session, tenant_id)
    }

    pub fn change_tenant_status(
        &self,
        session: &Session,
        tenant_id: TenantId,
        status: TenancyStatus,
    ) -> Result<TenantView, AppError> {
        require_landlord(session, "change_tenant_status")?;
        let portfolio_id = session.portfolio_id();

        let changed = self.dispatch(
            portfolio_id,
            tenant_id.0,
            TENANT_AGGREGATE,
            TenantCommand::ChangeTenantStatus(ChangeTenantStatus {
                portfolio_id,
                tenant_id,
                status,
                occurred_at: self.now(),
            }),
            |id| Tenant::empty(TenantId::new(id)),
        )?;

        if changed > 0 {
            tracing::info!(%portfolio_id, %tenant_id, ?status, "tenant status changed");
        }
        self.get_tenant(session, tenant_id)
    }

    /// Removes a tenant and frees their unit. Their invoices stay.
    pub fn remove_tenant(&self, session: &Session, tenant_id: TenantId) -> Result<(), AppError> {
        require_landlord(session, "remove_tenant")?;
        let portfolio_id = session.portfolio_id();
        let tenant = self.load_tenant(portfolio_id, tenant_id)?;

        self.dispatch(
            portfolio_id,
            tenant_id.0,
            TENANT_AGGREGATE,
            TenantCommand::RemoveTenant(RemoveTenant {
                portfolio_id,
                tenant_id,
                occurred_at: self.now(),
            }),
            |id| Tenant::empty(TenantId::new(id)),
        )?;
        if let Some(property_id) = tenant.property_id() {
            self.vacate(portfolio_id, property_id, tenant.unit())?;
        }

        tracing::info!(%portfolio_id, %tenant_id, "tenant removed");
        Ok(())
    }

    pub fn get_tenant(&self, session: &Session, tenant_id: TenantId) -> Result<TenantView, AppError> {
        require_tenant_access(session, tenant_id)?;
        self.tenants
            .get(session.portfolio_id(), &tenant_id)
            .ok_or_else(|| AppError::not_found(format!("tenant {tenant_id}")))
    }

    pub fn search_tenants(&self, session: &Session, filter: &TenantFilter) -> Result<Vec<TenantView>, AppError> {
        require_landlord(session, "search_tenants")?;
        Ok(self.tenants.search(session.portfolio_id(), filter))
    }

    // ---- billing ----------------------------------------------------------

    /// Resolves a single charge line.
    pub fn compute_line_item(
        &self,
        component: &ChargeComponent,
        variables: &ChargeVariables,
    ) -> Result<Decimal, AppError> {
        Ok(resolve(component, variables)?)
    }

    fn draft_for(
        &self,
        portfolio_id: PortfolioId,
        tenant_id: TenantId,
        request: CreateInvoiceRequest,
    ) -> Result<(InvoiceDraft, ChargeVariables), AppError> {
        let tenant = self.load_tenant(portfolio_id, tenant_id)?;
        let bill_to = BillTo::try_from(&tenant)?;
        let issue_date = request.issue_date.unwrap_or_else(|| self.today());

        let mut components = Vec::new();
        if request.include_base_rent {
            components.push(ChargeComponent::fixed(ComponentId(1), "Base Rent", tenant.rent_amount()));
        }
        let first_id = components.len() as u32 + 1;
        let (lines, variables) = components_from_inputs(
            request.charges,
            first_id,
            request.reading,
            self.config.formula_fallback,
        )?;
        components.extend(lines);

        let mut draft = InvoiceDraft::new(bill_to, request.period, issue_date, self.config.due_in_days)?
            .with_components(components);
        if let Some(due_date) = request.due_date {
            draft = draft.due_on(due_date)?;
        }
        Ok((draft, variables))
    }

    /// Rent calculator: what an invoice would contain, without issuing it.
    pub fn preview_invoice(
        &self,
        session: &Session,
        tenant_id: TenantId,
        request: CreateInvoiceRequest,
    ) -> Result<RentPreview, AppError> {
        require_landlord(session, "preview_invoice")?;
        let (draft, variables) = self.draft_for(session.portfolio_id(), tenant_id, request)?;
        Ok(preview(&draft.components, &variables)?)
    }

    pub fn create_invoice(
        &self,
        session: &Session,
        tenant_id: TenantId,
        request: CreateInvoiceRequest,
    ) -> Result<InvoiceView, AppError> {
        require_landlord(session, "create_invoice")?;
        let (draft, variables) = self.draft_for(session.portfolio_id(), tenant_id, request)?;
        self.issue(session.portfolio_id(), &draft, &variables)
    }

    fn issue(
        &self,
        portfolio_id: PortfolioId,
        draft: &InvoiceDraft,
        variables: &ChargeVariables,
    ) -> Result<InvoiceView, AppError> {
        // Reject bad drafts before a number is spent on them.
        let checked = preview(&draft.components, variables)?;
        if draft.components.is_empty() || checked.total <= Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "invoice total must be positive, got {}",
                checked.total
            ))
            .into());
        }

        let number = self.sequence.allocate(portfolio_id, draft.period.year())?;
        let invoice_id = InvoiceId::new(AggregateId::new());
        let command = build_invoice(portfolio_id, invoice_id, number, draft, variables, self.now())?;

        self.dispatch(
            portfolio_id,
            invoice_id.0,
            INVOICE_AGGREGATE,
            InvoiceCommand::IssueInvoice(command),
            |id| Invoice::empty(InvoiceId::new(id)),
        )?;

        tracing::info!(
            %portfolio_id,
            %number,
            tenant_id = %draft.bill_to.tenant_id,
            total = %checked.total,
            "invoice issued"
        );
        self.invoice_by_number(portfolio_id, number)
    }

    /// Records payment under the configured [`PaymentPolicy`](rentease_billing::PaymentPolicy).
    ///
    /// Resubmitting the identical payment is a no-op.
    pub fn mark_paid(
        &self,
        session: &Session,
        number: InvoiceNumber,
        payment: RecordPayment,
    ) -> Result<InvoiceView, AppError> {
        require_landlord(session, "mark_paid")?;
        let portfolio_id = session.portfolio_id();
        let invoice = self.invoice_by_number(portfolio_id, number)?;
        let RecordPayment {
            amount,
            paid_date,
            method,
            reference,
        } = payment;

        let recorded = self.dispatch(
            portfolio_id,
            invoice.invoice_id.0,
            INVOICE_AGGREGATE,
            InvoiceCommand::MarkPaid(MarkPaid {
                portfolio_id,
                invoice_id: invoice.invoice_id,
                paid_amount: amount,
                paid_date,
                method,
                reference,
                policy: self.config.payment_policy,
                occurred_at: self.now(),
            }),
            |id| Invoice::empty(InvoiceId::new(id)),
        )?;

        let view = self.invoice_by_number(portfolio_id, number)?;
        if recorded > 0 {
            tracing::info!(%portfolio_id, %number, paid_amount = %amount, %paid_date, %method, balance = %view.balance(), "invoice paid");
        } else {
            tracing::debug!(%portfolio_id, %number, "payment already recorded");
        }
        Ok(view)
    }

    pub fn void_invoice(
        &self,
        session: &Session,
        number: InvoiceNumber,
        reason: Option<String>,
    ) -> Result<InvoiceView, AppError> {
        require_landlord(session, "void_invoice")?;
        let portfolio_id = session.portfolio_id();
        let invoice = self.invoice_by_number(portfolio_id, number)?;

        self.dispatch(
            portfolio_id,
            invoice.invoice_id.0,
            INVOICE_AGGREGATE,
            InvoiceCommand::VoidInvoice(VoidInvoice {
                portfolio_id,
                invoice_id: invoice.invoice_id,
                reason,
                occurred_at: self.now(),
            }),
            |id| Invoice::empty(InvoiceId::new(id)),
        )?;

        tracing::info!(%portfolio_id, %number, "invoice voided");
        self.invoice_by_number(portfolio_id, number)
    }

    pub fn get_invoice(&self, session: &Session, number: InvoiceNumber) -> Result<InvoiceView, AppError> {
        let invoice = self.invoice_by_number(session.portfolio_id(), number)?;
        require_tenant_access(session, invoice.tenant_id)?;
        Ok(invoice)
    }

    /// Invoices ordered by number. Tenant sessions only ever see their own.
    pub fn list_invoices(&self, session: &Session, filter: &InvoiceFilter) -> Result<Vec<InvoiceView>, AppError> {
        let portfolio_id = session.portfolio_id();
        let mut filter = filter.clone();
        if let Some(own) = session.tenant_id() {
            if filter.tenant_id.is_some_and(|t| t != own) {
                return Err(AppError::Forbidden(
                    "tenants can only access their own records".to_string(),
                ));
            }
            filter.tenant_id = Some(own);
        }

        let today = self.today();
        Ok(self
            .invoices
            .list(portfolio_id)
            .into_iter()
            .filter(|invoice| {
                let name = self
                    .tenants
                    .get(portfolio_id, &invoice.tenant_id)
                    .map(|t| t.name);
                filter.matches(invoice, name.as_deref(), today)
            })
            .collect())
    }

    // ---- meter readings ---------------------------------------------------

    pub fn record_meter_sheet(&self, session: &Session, new: NewMeterSheet) -> Result<MeterSheet, AppError> {
        require_landlord(session, "record_meter_sheet")?;
        let portfolio_id = session.portfolio_id();
        self.load_tenant(portfolio_id, new.tenant_id)?;

        let mut sheet = MeterSheet::draft(
            MeterSheetId::new(AggregateId::new()),
            new.tenant_id,
            new.period,
            new.reading_date,
            new.electricity,
        );
        sheet.record_water(new.water)?;
        sheet.record_internet(new.internet)?;

        self.meter_sheets.upsert(portfolio_id, sheet.id(), sheet.clone());
        tracing::info!(%portfolio_id, tenant_id = %new.tenant_id, period = %new.period, "meter readings recorded");
        Ok(sheet)
    }

    fn meter_sheet(&self, portfolio_id: PortfolioId, sheet_id: MeterSheetId) -> Result<MeterSheet, AppError> {
        self.meter_sheets
            .get(portfolio_id, &sheet_id)
            .ok_or_else(|| AppError::not_found("meter reading sheet"))
    }

    pub fn update_meter_sheet(
        &self,
        session: &Session,
        sheet_id: MeterSheetId,
        changes: MeterSheetChanges,
    ) -> Result<MeterSheet, AppError> {
        require_landlord(session, "update_meter_sheet")?;
        let portfolio_id = session.portfolio_id();
        let mut sheet = self.meter_sheet(portfolio_id, sheet_id)?;

        if let Some(reading) = changes.electricity {
            sheet.record_electricity(reading)?;
        }
        if let Some(reading) = changes.water {
            sheet.record_water(Some(reading))?;
        }
        if let Some(amount) = changes.internet {
            sheet.record_internet(Some(amount))?;
        }

        self.meter_sheets.upsert(portfolio_id, sheet_id, sheet.clone());
        Ok(sheet)
    }

    /// Locks a sheet so it can be billed.
    pub fn process_meter_sheet(&self, session: &Session, sheet_id: MeterSheetId) -> Result<MeterSheet, AppError> {
        require_landlord(session, "process_meter_sheet")?;
        let portfolio_id = session.portfolio_id();
        let mut sheet = self.meter_sheet(portfolio_id, sheet_id)?;
        sheet.process()?;
        self.meter_sheets.upsert(portfolio_id, sheet_id, sheet.clone());
        Ok(sheet)
    }

    /// Sheets of a portfolio, newest period first.
    pub fn list_meter_sheets(
        &self,
        session: &Session,
        period: Option<BillingPeriod>,
    ) -> Result<Vec<MeterSheet>, AppError> {
        require_landlord(session, "list_meter_sheets")?;
        let mut sheets = self.meter_sheets.list(session.portfolio_id());
        sheets.retain(|s| period.is_none_or(|p| s.period() == p));
        sheets.sort_by(|a, b| b.period().cmp(&a.period()).then(a.reading_date().cmp(&b.reading_date())));
        Ok(sheets)
    }

    /// Bills a processed sheet: base rent plus its utility charges.
    pub fn invoice_meter_sheet(
        &self,
        session: &Session,
        sheet_id: MeterSheetId,
        issue_date: Option<NaiveDate>,
    ) -> Result<InvoiceView, AppError> {
        require_landlord(session, "invoice_meter_sheet")?;
        let portfolio_id = session.portfolio_id();
        let mut sheet = self.meter_sheet(portfolio_id, sheet_id)?;
        let charges = sheet.charges(2)?;

        let tenant = self.load_tenant(portfolio_id, sheet.tenant_id())?;
        let draft = InvoiceDraft::new(
            BillTo::try_from(&tenant)?,
            sheet.period(),
            issue_date.unwrap_or_else(|| self.today()),
            self.config.due_in_days,
        )?
        .with_component(ChargeComponent::fixed(ComponentId(1), "Base Rent", tenant.rent_amount()))
        .with_components(charges.components);

        // a sheet is billed once; check before spending a number
        if sheet.invoice_number().is_some() {
            return Err(DomainError::conflict("reading sheet already billed").into());
        }
        let invoice = self.issue(portfolio_id, &draft, &charges.variables)?;
        sheet.mark_invoiced(invoice.number)?;
        self.meter_sheets.upsert(portfolio_id, sheet_id, sheet);
        Ok(invoice)
    }

    // ---- reports ----------------------------------------------------------

    pub fn landlord_dashboard(&self, session: &Session) -> Result<LandlordDashboard, AppError> {
        require_landlord(session, "landlord_dashboard")?;
        let portfolio_id = session.portfolio_id();
        Ok(LandlordDashboard::compute(
            &self.properties.list(portfolio_id),
            &self.tenants.list(portfolio_id),
            &self.invoices.list(portfolio_id),
            self.today(),
        )?)
    }

    pub fn payment_history(
        &self,
        session: &Session,
        tenant_id: TenantId,
        year: Option<i32>,
    ) -> Result<PaymentHistory, AppError> {
        require_tenant_access(session, tenant_id)?;
        let invoices = self.invoices.list_for_tenant(session.portfolio_id(), tenant_id);
        Ok(PaymentHistory::compute(&invoices, year, self.today())?)
    }

    /// Current-month summary, `None` when nothing was billed for `period`.
    pub fn rent_summary(
        &self,
        session: &Session,
        tenant_id: TenantId,
        period: BillingPeriod,
    ) -> Result<Option<RentSummary>, AppError> {
        require_tenant_access(session, tenant_id)?;
        let invoices = self.invoices.list_for_tenant(session.portfolio_id(), tenant_id);
        Ok(RentSummary::for_period(&invoices, period, self.today()))
    }
}
