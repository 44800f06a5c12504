use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use rentease_core::{Aggregate, AggregateId, AggregateRoot, DomainError, PortfolioId};
use rentease_events::Event;

use crate::property::PropertyId;

pub const TENANT_AGGREGATE: &str = "leasing.tenant";

/// Tenant (renter) identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub AggregateId);

impl TenantId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for TenantId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenancyStatus {
    Active,
    Inactive,
    Pending,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl ContactInfo {
    /// Case-insensitive match on email, plain substring match on phone.
    pub fn matches(&self, query: &str) -> bool {
        let needle = query.to_lowercase();
        self.email
            .as_deref()
            .is_some_and(|e| e.to_lowercase().contains(&needle))
            || self.phone.as_deref().is_some_and(|p| p.contains(query))
    }
}

/// Lease term. `end` must fall after `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Lease {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DomainError> {
        if end <= start {
            return Err(DomainError::validation(format!(
                "lease end {end} must be after lease start {start}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn is_current(&self, today: NaiveDate) -> bool {
        self.start <= today && today <= self.end
    }
}

/// Aggregate root: a tenant renting one unit of one property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tenant {
    id: TenantId,
    portfolio_id: Option<PortfolioId>,
    name: String,
    contact: ContactInfo,
    property_id: Option<PropertyId>,
    unit: String,
    rent_amount: Decimal,
    lease: Option<Lease>,
    status: TenancyStatus,
    removed: bool,
    version: u64,
    created: bool,
}

impl Tenant {
    pub fn empty(id: TenantId) -> Self {
        Self {
            id,
            portfolio_id: None,
            name: String::new(),
            contact: ContactInfo::default(),
            property_id: None,
            unit: String::new(),
            rent_amount: Decimal::ZERO,
            lease: None,
            status: TenancyStatus::Pending,
            removed: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> TenantId {
        self.id
    }

    pub fn portfolio_id(&self) -> Option<PortfolioId> {
        self.portfolio_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contact(&self) -> &ContactInfo {
        &self.contact
    }

    pub fn property_id(&self) -> Option<PropertyId> {
        self.property_id
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn rent_amount(&self) -> Decimal {
        self.rent_amount
    }

    pub fn lease(&self) -> Option<Lease> {
        self.lease
    }

    pub fn status(&self) -> TenancyStatus {
        self.status
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Only active, non-removed tenants are billed.
    pub fn can_be_billed(&self) -> bool {
        self.created && !self.removed && self.status == TenancyStatus::Active
    }
}

impl AggregateRoot for Tenant {
    type Id = TenantId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterTenant {
    pub portfolio_id: PortfolioId,
    pub tenant_id: TenantId,
    pub name: String,
    pub contact: ContactInfo,
    pub property_id: PropertyId,
    pub unit: String,
    pub rent_amount: Decimal,
    pub lease_start: NaiveDate,
    pub lease_end: NaiveDate,
    pub status: TenancyStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Partial update; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantChanges {
    pub name: Option<String>,
    pub contact: Option<ContactInfo>,
    pub property_id: Option<PropertyId>,
    pub unit: Option<String>,
    pub rent_amount: Option<Decimal>,
    pub lease_end: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateTenant {
    pub portfolio_id: PortfolioId,
    pub tenant_id: TenantId,
    pub changes: TenantChanges,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeTenantStatus {
    pub portfolio_id: PortfolioId,
    pub tenant_id: TenantId,
    pub status: TenancyStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveTenant {
    pub portfolio_id: PortfolioId,
    pub tenant_id: TenantId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TenantCommand {
    RegisterTenant(RegisterTenant),
    UpdateTenant(UpdateTenant),
    ChangeTenantStatus(ChangeTenantStatus),
    RemoveTenant(RemoveTenant),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRegistered {
    pub portfolio_id: PortfolioId,
    pub tenant_id: TenantId,
    pub name: String,
    pub contact: ContactInfo,
    pub property_id: PropertyId,
    pub unit: String,
    pub rent_amount: Decimal,
    pub lease: Lease,
    pub status: TenancyStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Full snapshot of the editable fields after an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantUpdated {
    pub portfolio_id: PortfolioId,
    pub tenant_id: TenantId,
    pub name: String,
    pub contact: ContactInfo,
    pub property_id: PropertyId,
    pub previous_property_id: PropertyId,
    pub unit: String,
    pub rent_amount: Decimal,
    pub lease: Lease,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantStatusChanged {
    pub portfolio_id: PortfolioId,
    pub tenant_id: TenantId,
    pub from: TenancyStatus,
    pub to: TenancyStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRemoved {
    pub portfolio_id: PortfolioId,
    pub tenant_id: TenantId,
    pub property_id: PropertyId,
    pub unit: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TenantEvent {
    TenantRegistered(TenantRegistered),
    TenantUpdated(TenantUpdated),
    TenantStatusChanged(TenantStatusChanged),
    TenantRemoved(TenantRemoved),
}

impl TenantEvent {
    pub fn portfolio_and_tenant(&self) -> (PortfolioId, TenantId) {
        match self {
            TenantEvent::TenantRegistered(e) => (e.portfolio_id, e.tenant_id),
            TenantEvent::TenantUpdated(e) => (e.portfolio_id, e.tenant_id),
            TenantEvent::TenantStatusChanged(e) => (e.portfolio_id, e.tenant_id),
            TenantEvent::TenantRemoved(e) => (e.portfolio_id, e.tenant_id),
        }
    }
}

impl Event for TenantEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TenantEvent::TenantRegistered(_) => "leasing.tenant.registered",
            TenantEvent::TenantUpdated(_) => "leasing.tenant.updated",
            TenantEvent::TenantStatusChanged(_) => "leasing.tenant.status_changed",
            TenantEvent::TenantRemoved(_) => "leasing.tenant.removed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            TenantEvent::TenantRegistered(e) => e.occurred_at,
            TenantEvent::TenantUpdated(e) => e.occurred_at,
            TenantEvent::TenantStatusChanged(e) => e.occurred_at,
            TenantEvent::TenantRemoved(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Tenant {
    type Command = TenantCommand;
    type Event = TenantEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            TenantEvent::TenantRegistered(e) => {
                self.id = e.tenant_id;
                self.portfolio_id = Some(e.portfolio_id);
                self.name = e.name.clone();
                self.contact = e.contact.clone();
                self.property_id = Some(e.property_id);
                self.unit = e.unit.clone();
                self.rent_amount = e.rent_amount;
                self.lease = Some(e.lease);
                self.status = e.status;
                self.created = true;
            }
            TenantEvent::TenantUpdated(e) => {
                self.name = e.name.clone();
                self.contact = e.contact.clone();
                self.property_id = Some(e.property_id);
                self.unit = e.unit.clone();
                self.rent_amount = e.rent_amount;
                self.lease = Some(e.lease);
            }
            TenantEvent::TenantStatusChanged(e) => {
                self.status = e.to;
            }
            TenantEvent::TenantRemoved(_) => {
                self.removed = true;
                self.status = TenancyStatus::Inactive;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            TenantCommand::RegisterTenant(cmd) => self.handle_register(cmd),
            TenantCommand::UpdateTenant(cmd) => self.handle_update(cmd),
            TenantCommand::ChangeTenantStatus(cmd) => self.handle_change_status(cmd),
            TenantCommand::RemoveTenant(cmd) => self.handle_remove(cmd),
        }
    }
}

fn validate_rent(rent_amount: Decimal) -> Result<(), DomainError> {
    if rent_amount < Decimal::ZERO {
        return Err(DomainError::validation("rent amount cannot be negative"));
    }
    Ok(())
}

impl Tenant {
    fn ensure_live(&self, portfolio_id: PortfolioId, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created || self.removed {
            return Err(DomainError::not_found());
        }
        if self.portfolio_id != Some(portfolio_id) {
            return Err(DomainError::invariant("portfolio mismatch"));
        }
        if self.id != tenant_id {
            return Err(DomainError::invariant("tenant_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterTenant) -> Result<Vec<TenantEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("tenant already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("tenant name cannot be empty"));
        }
        if cmd.unit.trim().is_empty() {
            return Err(DomainError::validation("tenant unit cannot be empty"));
        }
        validate_rent(cmd.rent_amount)?;
        let lease = Lease::new(cmd.lease_start, cmd.lease_end)?;

        Ok(vec![TenantEvent::TenantRegistered(TenantRegistered {
            portfolio_id: cmd.portfolio_id,
            tenant_id: cmd.tenant_id,
            name: cmd.name.trim().to_string(),
            contact: cmd.contact.clone(),
            property_id: cmd.property_id,
            unit: cmd.unit.trim().to_string(),
            rent_amount: cmd.rent_amount,
            lease,
            status: cmd.status,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateTenant) -> Result<Vec<TenantEvent>, DomainError> {
        self.ensure_live(cmd.portfolio_id, cmd.tenant_id)?;
        let changes = &cmd.changes;

        let name = changes.name.clone().unwrap_or_else(|| self.name.clone());
        if name.trim().is_empty() {
            return Err(DomainError::validation("tenant name cannot be empty"));
        }
        let unit = changes.unit.clone().unwrap_or_else(|| self.unit.clone());
        if unit.trim().is_empty() {
            return Err(DomainError::validation("tenant unit cannot be empty"));
        }
        let rent_amount = changes.rent_amount.unwrap_or(self.rent_amount);
        validate_rent(rent_amount)?;

        let current_lease = self
            .lease
            .ok_or_else(|| DomainError::invariant("registered tenant without lease"))?;
        let lease = Lease::new(
            current_lease.start,
            changes.lease_end.unwrap_or(current_lease.end),
        )?;
        let previous_property_id = self
            .property_id
            .ok_or_else(|| DomainError::invariant("registered tenant without property"))?;

        Ok(vec![TenantEvent::TenantUpdated(TenantUpdated {
            portfolio_id: cmd.portfolio_id,
            tenant_id: cmd.tenant_id,
            name: name.trim().to_string(),
            contact: changes.contact.clone().unwrap_or_else(|| self.contact.clone()),
            property_id: changes.property_id.unwrap_or(previous_property_id),
            previous_property_id,
            unit: unit.trim().to_string(),
            rent_amount,
            lease,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_status(
        &self,
        cmd: &ChangeTenantStatus,
    ) -> Result<Vec<TenantEvent>, DomainError> {
        self.ensure_live(cmd.portfolio_id, cmd.tenant_id)?;

        if self.status == cmd.status {
            return Ok(vec![]);
        }

        Ok(vec![TenantEvent::TenantStatusChanged(TenantStatusChanged {
            portfolio_id: cmd.portfolio_id,
            tenant_id: cmd.tenant_id,
            from: self.status,
            to: cmd.status,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove(&self, cmd: &RemoveTenant) -> Result<Vec<TenantEvent>, DomainError> {
        self.ensure_live(cmd.portfolio_id, cmd.tenant_id)?;
        let property_id = self
            .property_id
            .ok_or_else(|| DomainError::invariant("registered tenant without property"))?;

        Ok(vec![TenantEvent::TenantRemoved(TenantRemoved {
            portfolio_id: cmd.portfolio_id,
            tenant_id: cmd.tenant_id,
            property_id,
            unit: self.unit.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rentease_events::execute;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn register_cmd(portfolio_id: PortfolioId, tenant_id: TenantId) -> RegisterTenant {
        RegisterTenant {
            portfolio_id,
            tenant_id,
            name: "Sarah Johnson".to_string(),
            contact: ContactInfo {
                email: Some("sarah@example.com".to_string()),
                phone: Some("+1234567891".to_string()),
            },
            property_id: PropertyId::new(AggregateId::new()),
            unit: "Apt 101".to_string(),
            rent_amount: dec!(1200),
            lease_start: date(2024, 1, 15),
            lease_end: date(2025, 1, 14),
            status: TenancyStatus::Active,
            occurred_at: Utc::now(),
        }
    }

    fn registered() -> (Tenant, PortfolioId, TenantId) {
        let portfolio_id = PortfolioId::new();
        let tenant_id = TenantId::new(AggregateId::new());
        let mut tenant = Tenant::empty(tenant_id);
        execute(
            &mut tenant,
            &TenantCommand::RegisterTenant(register_cmd(portfolio_id, tenant_id)),
        )
        .unwrap();
        (tenant, portfolio_id, tenant_id)
    }

    #[test]
    fn register_tenant_records_lease_and_rent() {
        let (tenant, _, _) = registered();
        assert_eq!(tenant.name(), "Sarah Johnson");
        assert_eq!(tenant.rent_amount(), dec!(1200));
        assert_eq!(tenant.lease().unwrap().end, date(2025, 1, 14));
        assert!(tenant.can_be_billed());
        assert_eq!(tenant.version(), 1);
    }

    #[test]
    fn register_rejects_inverted_lease() {
        let tenant_id = TenantId::new(AggregateId::new());
        let mut cmd = register_cmd(PortfolioId::new(), tenant_id);
        cmd.lease_end = cmd.lease_start;

        let err = Tenant::empty(tenant_id)
            .handle(&TenantCommand::RegisterTenant(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn register_rejects_negative_rent() {
        let tenant_id = TenantId::new(AggregateId::new());
        let mut cmd = register_cmd(PortfolioId::new(), tenant_id);
        cmd.rent_amount = dec!(-1);

        let err = Tenant::empty(tenant_id)
            .handle(&TenantCommand::RegisterTenant(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn update_keeps_unchanged_fields_and_reports_property_move() {
        let (mut tenant, portfolio_id, tenant_id) = registered();
        let old_property = tenant.property_id().unwrap();
        let new_property = PropertyId::new(AggregateId::new());

        let events = execute(
            &mut tenant,
            &TenantCommand::UpdateTenant(UpdateTenant {
                portfolio_id,
                tenant_id,
                changes: TenantChanges {
                    property_id: Some(new_property),
                    rent_amount: Some(dec!(1250)),
                    ..TenantChanges::default()
                },
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        match &events[0] {
            TenantEvent::TenantUpdated(e) => {
                assert_eq!(e.previous_property_id, old_property);
                assert_eq!(e.property_id, new_property);
                assert_eq!(e.name, "Sarah Johnson");
            }
            other => panic!("expected TenantUpdated, got {other:?}"),
        }
        assert_eq!(tenant.rent_amount(), dec!(1250));
    }

    #[test]
    fn status_change_to_same_status_is_a_no_op() {
        let (tenant, portfolio_id, tenant_id) = registered();
        let events = tenant
            .handle(&TenantCommand::ChangeTenantStatus(ChangeTenantStatus {
                portfolio_id,
                tenant_id,
                status: TenancyStatus::Active,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn removed_tenant_is_gone_for_later_commands() {
        let (mut tenant, portfolio_id, tenant_id) = registered();
        execute(
            &mut tenant,
            &TenantCommand::RemoveTenant(RemoveTenant {
                portfolio_id,
                tenant_id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert!(tenant.is_removed());
        assert!(!tenant.can_be_billed());

        let err = tenant
            .handle(&TenantCommand::RemoveTenant(RemoveTenant {
                portfolio_id,
                tenant_id,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[test]
    fn contact_search_matches_email_case_insensitively() {
        let contact = ContactInfo {
            email: Some("Mike@Example.com".to_string()),
            phone: Some("+1234567892".to_string()),
        };
        assert!(contact.matches("mike@"));
        assert!(contact.matches("4567892"));
        assert!(!contact.matches("sarah"));
    }
}
