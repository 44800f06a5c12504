use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rentease_core::{Aggregate, AggregateId, AggregateRoot, DomainError, PortfolioId};
use rentease_events::Event;

pub const PROPERTY_AGGREGATE: &str = "leasing.property";

/// Property identifier (portfolio-scoped via `portfolio_id` on commands/events).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyId(pub AggregateId);

impl PropertyId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PropertyId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    Apartment,
    House,
    Commercial,
}

/// Aggregate root: a rentable property with a fixed number of units.
///
/// Invariant: `occupied_units <= total_units` and `total_units >= 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    id: PropertyId,
    portfolio_id: Option<PortfolioId>,
    name: String,
    address: String,
    kind: PropertyKind,
    total_units: u32,
    occupied_units: u32,
    version: u64,
    created: bool,
}

impl Property {
    /// Not-yet-registered instance for rehydration.
    pub fn empty(id: PropertyId) -> Self {
        Self {
            id,
            portfolio_id: None,
            name: String::new(),
            address: String::new(),
            kind: PropertyKind::Apartment,
            total_units: 0,
            occupied_units: 0,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PropertyId {
        self.id
    }

    pub fn portfolio_id(&self) -> Option<PortfolioId> {
        self.portfolio_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn kind(&self) -> PropertyKind {
        self.kind
    }

    pub fn total_units(&self) -> u32 {
        self.total_units
    }

    pub fn occupied_units(&self) -> u32 {
        self.occupied_units
    }

    pub fn vacant_units(&self) -> u32 {
        self.total_units.saturating_sub(self.occupied_units)
    }

    pub fn is_registered(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for Property {
    type Id = PropertyId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterProperty {
    pub portfolio_id: PortfolioId,
    pub property_id: PropertyId,
    pub name: String,
    pub address: String,
    pub kind: PropertyKind,
    pub total_units: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Partial update; `None` keeps the current value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProperty {
    pub portfolio_id: PortfolioId,
    pub property_id: PropertyId,
    pub name: Option<String>,
    pub address: Option<String>,
    pub kind: Option<PropertyKind>,
    pub total_units: Option<u32>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupyUnit {
    pub portfolio_id: PortfolioId,
    pub property_id: PropertyId,
    pub unit: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VacateUnit {
    pub portfolio_id: PortfolioId,
    pub property_id: PropertyId,
    pub unit: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyCommand {
    RegisterProperty(RegisterProperty),
    UpdateProperty(UpdateProperty),
    OccupyUnit(OccupyUnit),
    VacateUnit(VacateUnit),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyRegistered {
    pub portfolio_id: PortfolioId,
    pub property_id: PropertyId,
    pub name: String,
    pub address: String,
    pub kind: PropertyKind,
    pub total_units: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyUpdated {
    pub portfolio_id: PortfolioId,
    pub property_id: PropertyId,
    pub name: String,
    pub address: String,
    pub kind: PropertyKind,
    pub total_units: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitOccupied {
    pub portfolio_id: PortfolioId,
    pub property_id: PropertyId,
    pub unit: String,
    pub occupied_units: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitVacated {
    pub portfolio_id: PortfolioId,
    pub property_id: PropertyId,
    pub unit: String,
    pub occupied_units: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyEvent {
    PropertyRegistered(PropertyRegistered),
    PropertyUpdated(PropertyUpdated),
    UnitOccupied(UnitOccupied),
    UnitVacated(UnitVacated),
}

impl PropertyEvent {
    pub fn portfolio_and_property(&self) -> (PortfolioId, PropertyId) {
        match self {
            PropertyEvent::PropertyRegistered(e) => (e.portfolio_id, e.property_id),
            PropertyEvent::PropertyUpdated(e) => (e.portfolio_id, e.property_id),
            PropertyEvent::UnitOccupied(e) => (e.portfolio_id, e.property_id),
            PropertyEvent::UnitVacated(e) => (e.portfolio_id, e.property_id),
        }
    }
}

impl Event for PropertyEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PropertyEvent::PropertyRegistered(_) => "leasing.property.registered",
            PropertyEvent::PropertyUpdated(_) => "leasing.property.updated",
            PropertyEvent::UnitOccupied(_) => "leasing.property.unit_occupied",
            PropertyEvent::UnitVacated(_) => "leasing.property.unit_vacated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PropertyEvent::PropertyRegistered(e) => e.occurred_at,
            PropertyEvent::PropertyUpdated(e) => e.occurred_at,
            PropertyEvent::UnitOccupied(e) => e.occurred_at,
            PropertyEvent::UnitVacated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Property {
    type Command = PropertyCommand;
    type Event = PropertyEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PropertyEvent::PropertyRegistered(e) => {
                self.id = e.property_id;
                self.portfolio_id = Some(e.portfolio_id);
                self.name = e.name.clone();
                self.address = e.address.clone();
                self.kind = e.kind;
                self.total_units = e.total_units;
                self.occupied_units = 0;
                self.created = true;
            }
            PropertyEvent::PropertyUpdated(e) => {
                self.name = e.name.clone();
                self.address = e.address.clone();
                self.kind = e.kind;
                self.total_units = e.total_units;
            }
            PropertyEvent::UnitOccupied(e) => {
                self.occupied_units = e.occupied_units;
            }
            PropertyEvent::UnitVacated(e) => {
                self.occupied_units = e.occupied_units;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PropertyCommand::RegisterProperty(cmd) => self.handle_register(cmd),
            PropertyCommand::UpdateProperty(cmd) => self.handle_update(cmd),
            PropertyCommand::OccupyUnit(cmd) => self.handle_occupy(cmd),
            PropertyCommand::VacateUnit(cmd) => self.handle_vacate(cmd),
        }
    }
}

impl Property {
    fn ensure_existing(
        &self,
        portfolio_id: PortfolioId,
        property_id: PropertyId,
    ) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.portfolio_id != Some(portfolio_id) {
            return Err(DomainError::invariant("portfolio mismatch"));
        }
        if self.id != property_id {
            return Err(DomainError::invariant("property_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterProperty) -> Result<Vec<PropertyEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("property already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("property name cannot be empty"));
        }
        if cmd.total_units == 0 {
            return Err(DomainError::validation("property must have at least one unit"));
        }

        Ok(vec![PropertyEvent::PropertyRegistered(PropertyRegistered {
            portfolio_id: cmd.portfolio_id,
            property_id: cmd.property_id,
            name: cmd.name.trim().to_string(),
            address: cmd.address.trim().to_string(),
            kind: cmd.kind,
            total_units: cmd.total_units,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateProperty) -> Result<Vec<PropertyEvent>, DomainError> {
        self.ensure_existing(cmd.portfolio_id, cmd.property_id)?;

        let name = cmd.name.clone().unwrap_or_else(|| self.name.clone());
        if name.trim().is_empty() {
            return Err(DomainError::validation("property name cannot be empty"));
        }
        let total_units = cmd.total_units.unwrap_or(self.total_units);
        if total_units == 0 {
            return Err(DomainError::validation("property must have at least one unit"));
        }
        if total_units < self.occupied_units {
            return Err(DomainError::invariant(format!(
                "cannot shrink to {total_units} units while {} are occupied",
                self.occupied_units
            )));
        }

        Ok(vec![PropertyEvent::PropertyUpdated(PropertyUpdated {
            portfolio_id: cmd.portfolio_id,
            property_id: cmd.property_id,
            name: name.trim().to_string(),
            address: cmd.address.clone().unwrap_or_else(|| self.address.clone()),
            kind: cmd.kind.unwrap_or(self.kind),
            total_units,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_occupy(&self, cmd: &OccupyUnit) -> Result<Vec<PropertyEvent>, DomainError> {
        self.ensure_existing(cmd.portfolio_id, cmd.property_id)?;

        if self.occupied_units >= self.total_units {
            return Err(DomainError::invariant(format!(
                "all {} units of '{}' are occupied",
                self.total_units, self.name
            )));
        }

        Ok(vec![PropertyEvent::UnitOccupied(UnitOccupied {
            portfolio_id: cmd.portfolio_id,
            property_id: cmd.property_id,
            unit: cmd.unit.clone(),
            occupied_units: self.occupied_units + 1,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_vacate(&self, cmd: &VacateUnit) -> Result<Vec<PropertyEvent>, DomainError> {
        self.ensure_existing(cmd.portfolio_id, cmd.property_id)?;

        if self.occupied_units == 0 {
            return Err(DomainError::invariant("no occupied units to vacate"));
        }

        Ok(vec![PropertyEvent::UnitVacated(UnitVacated {
            portfolio_id: cmd.portfolio_id,
            property_id: cmd.property_id,
            unit: cmd.unit.clone(),
            occupied_units: self.occupied_units - 1,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rentease_events::execute;

    fn registered(total_units: u32) -> (Property, PortfolioId, PropertyId) {
        let portfolio_id = PortfolioId::new();
        let property_id = PropertyId::new(AggregateId::new());
        let mut property = Property::empty(property_id);
        execute(
            &mut property,
            &PropertyCommand::RegisterProperty(RegisterProperty {
                portfolio_id,
                property_id,
                name: "Sunset Apartments".to_string(),
                address: "123 Main St, City".to_string(),
                kind: PropertyKind::Apartment,
                total_units,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        (property, portfolio_id, property_id)
    }

    fn occupy(
        property: &mut Property,
        portfolio_id: PortfolioId,
        property_id: PropertyId,
    ) -> Result<Vec<PropertyEvent>, DomainError> {
        execute(
            property,
            &PropertyCommand::OccupyUnit(OccupyUnit {
                portfolio_id,
                property_id,
                unit: "Apt 101".to_string(),
                occurred_at: Utc::now(),
            }),
        )
    }

    #[test]
    fn registered_property_starts_empty() {
        let (property, _, _) = registered(12);
        assert_eq!(property.total_units(), 12);
        assert_eq!(property.occupied_units(), 0);
        assert_eq!(property.vacant_units(), 12);
        assert_eq!(property.version(), 1);
    }

    #[test]
    fn register_rejects_zero_units() {
        let property = Property::empty(PropertyId::new(AggregateId::new()));
        let err = property
            .handle(&PropertyCommand::RegisterProperty(RegisterProperty {
                portfolio_id: PortfolioId::new(),
                property_id: PropertyId::new(AggregateId::new()),
                name: "Riverside Homes".to_string(),
                address: String::new(),
                kind: PropertyKind::House,
                total_units: 0,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn cannot_occupy_beyond_total_units() {
        let (mut property, portfolio_id, property_id) = registered(1);
        occupy(&mut property, portfolio_id, property_id).unwrap();
        assert_eq!(property.occupied_units(), 1);

        let err = occupy(&mut property, portfolio_id, property_id).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert_eq!(property.occupied_units(), 1);
    }

    #[test]
    fn cannot_vacate_an_empty_property() {
        let (property, portfolio_id, property_id) = registered(3);
        let err = property
            .handle(&PropertyCommand::VacateUnit(VacateUnit {
                portfolio_id,
                property_id,
                unit: "Apt 1".to_string(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn update_cannot_shrink_below_occupancy() {
        let (mut property, portfolio_id, property_id) = registered(2);
        occupy(&mut property, portfolio_id, property_id).unwrap();
        occupy(&mut property, portfolio_id, property_id).unwrap();

        let err = property
            .handle(&PropertyCommand::UpdateProperty(UpdateProperty {
                portfolio_id,
                property_id,
                name: None,
                address: None,
                kind: None,
                total_units: Some(1),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn other_portfolio_cannot_touch_property() {
        let (property, _, property_id) = registered(2);
        let err = property
            .handle(&PropertyCommand::OccupyUnit(OccupyUnit {
                portfolio_id: PortfolioId::new(),
                property_id,
                unit: "Apt 2".to_string(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }
}
