use thiserror::Error;

use rentease_core::DomainError;
use rentease_infra::command_dispatcher::DispatchError;
use rentease_infra::projections::ProjectionError;
use rentease_infra::{ConfigError, SequenceError};

#[derive(Debug, Error)]
pub enum AppError {
    /// The session's role does not allow the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Dispatch(DispatchError),

    #[error("read model update failed: {0}")]
    Projection(#[from] ProjectionError),

    #[error(transparent)]
    Sequence(#[from] SequenceError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("internal state unavailable: {0}")]
    Poisoned(&'static str),
}

impl From<DispatchError> for AppError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Domain(e) => AppError::Domain(e),
            other => AppError::Dispatch(other),
        }
    }
}

impl AppError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Stable machine-readable code for callers that render errors.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::Domain(e) => match e {
                DomainError::Validation(_) => "validation_error",
                DomainError::UnsupportedFormula(_) => "unsupported_formula",
                DomainError::InvariantViolation(_) => "invariant_violation",
                DomainError::InvalidId(_) => "invalid_id",
                DomainError::NotFound => "not_found",
                DomainError::Conflict(_) => "conflict",
                DomainError::Unauthorized => "unauthorized",
            },
            AppError::Dispatch(DispatchError::Concurrency(_)) => "conflict",
            AppError::Dispatch(DispatchError::PortfolioIsolation(_)) => "portfolio_isolation",
            AppError::Dispatch(_) => "store_error",
            AppError::Projection(_) => "projection_error",
            AppError::Sequence(_) => "sequence_error",
            AppError::Config(_) => "config_error",
            AppError::Poisoned(_) => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_rejections_surface_unwrapped() {
        let err: AppError = DispatchError::Domain(DomainError::conflict("already paid")).into();
        assert!(matches!(err, AppError::Domain(DomainError::Conflict(_))));
        assert_eq!(err.code(), "conflict");
        assert_eq!(err.to_string(), "conflict: already paid");
    }

    #[test]
    fn concurrency_maps_to_conflict_code() {
        let err: AppError = DispatchError::Concurrency("stale".to_string()).into();
        assert_eq!(err.code(), "conflict");
        assert_eq!(AppError::not_found("invoice INV-2024-009").code(), "not_found");
    }
}
