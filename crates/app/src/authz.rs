//! Role checks applied at the operation boundary, before anything is dispatched.

use rentease_leasing::TenantId;

use crate::app::errors::AppError;
use crate::context::Session;

pub fn require_landlord(session: &Session, operation: &'static str) -> Result<(), AppError> {
    if session.is_landlord() {
        return Ok(());
    }
    tracing::warn!(
        user_id = %session.user_id(),
        operation,
        "tenant session attempted a landlord operation"
    );
    Err(AppError::Forbidden(format!("{operation} requires a landlord session")))
}

/// Landlords see every tenant of their portfolio; tenants only themselves.
pub fn require_tenant_access(session: &Session, tenant_id: TenantId) -> Result<(), AppError> {
    match session.tenant_id() {
        None => Ok(()),
        Some(own) if own == tenant_id => Ok(()),
        Some(_) => Err(AppError::Forbidden(
            "tenants can only access their own records".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rentease_core::{AggregateId, PortfolioId, UserId};

    #[test]
    fn tenants_are_limited_to_themselves() {
        let me = TenantId::new(AggregateId::new());
        let other = TenantId::new(AggregateId::new());
        let session = Session::tenant(UserId::new(), PortfolioId::new(), me);

        assert!(require_tenant_access(&session, me).is_ok());
        assert!(matches!(
            require_tenant_access(&session, other),
            Err(AppError::Forbidden(_))
        ));
        assert!(require_landlord(&session, "create_invoice").is_err());
    }

    #[test]
    fn landlords_pass_both_checks() {
        let session = Session::landlord(UserId::new(), PortfolioId::new());
        assert!(require_landlord(&session, "create_invoice").is_ok());
        assert!(require_tenant_access(&session, TenantId::new(AggregateId::new())).is_ok());
    }
}
