use rentease_core::{PortfolioId, UserId};
use rentease_leasing::TenantId;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Role {
    Landlord,
    /// A tenant logged in to their own account.
    Tenant(TenantId),
}

/// Who is calling, and which landlord portfolio the call is scoped to.
///
/// Immutable; every application operation takes one.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Session {
    user_id: UserId,
    portfolio_id: PortfolioId,
    role: Role,
}

impl Session {
    pub fn new(user_id: UserId, portfolio_id: PortfolioId, role: Role) -> Self {
        Self {
            user_id,
            portfolio_id,
            role,
        }
    }

    pub fn landlord(user_id: UserId, portfolio_id: PortfolioId) -> Self {
        Self::new(user_id, portfolio_id, Role::Landlord)
    }

    pub fn tenant(user_id: UserId, portfolio_id: PortfolioId, tenant_id: TenantId) -> Self {
        Self::new(user_id, portfolio_id, Role::Tenant(tenant_id))
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn portfolio_id(&self) -> PortfolioId {
        self.portfolio_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_landlord(&self) -> bool {
        self.role == Role::Landlord
    }

    /// The tenant record behind a tenant session.
    pub fn tenant_id(&self) -> Option<TenantId> {
        match self.role {
            Role::Tenant(id) => Some(id),
            Role::Landlord => None,
        }
    }
}
