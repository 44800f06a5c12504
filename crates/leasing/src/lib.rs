//! Leasing domain: properties, their units, and the tenants renting them.
//!
//! Pure, event-sourced decision logic. Storage and lookups live in `rentease-infra`.

pub mod property;
pub mod tenant;

pub use property::{
    OccupyUnit, Property, PropertyCommand, PropertyEvent, PropertyId, PropertyKind,
    PropertyRegistered, PropertyUpdated, RegisterProperty, UnitOccupied, UnitVacated,
    UpdateProperty, VacateUnit, PROPERTY_AGGREGATE,
};
pub use tenant::{
    ChangeTenantStatus, ContactInfo, Lease, RegisterTenant, RemoveTenant, Tenant, TenancyStatus,
    TenantChanges, TenantCommand, TenantEvent, TenantId, TenantRegistered, TenantRemoved,
    TenantStatusChanged, TenantUpdated, UpdateTenant, TENANT_AGGREGATE,
};
