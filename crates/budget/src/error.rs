//! Budget Gate errors (C4, spec §7).

use platform_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("daily budget exceeded: {used:.4} + {estimate:.4} > {limit:.4}")]
    DailyBudgetExceeded { used: f64, estimate: f64, limit: f64 },

    #[error("provider budget exceeded for {provider}: {used:.4} + {estimate:.4} > {limit:.4}")]
    ProviderBudgetExceeded {
        provider: String,
        used: f64,
        estimate: f64,
        limit: f64,
    },

    #[error("user budget exceeded for {user_id}: {used:.4} + {estimate:.4} > {limit:.4}")]
    UserBudgetExceeded {
        user_id: uuid::Uuid,
        used: f64,
        estimate: f64,
        limit: f64,
    },

    #[error("call {0} not found")]
    CallNotFound(uuid::Uuid),

    #[error("call {0} already registered")]
    DuplicateCall(uuid::Uuid),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl GateError {
    /// Machine-readable reason code for the error envelope (spec §7).
    pub fn reason(&self) -> &'static str {
        match self {
            GateError::DailyBudgetExceeded { .. } => "daily-budget-exceeded",
            GateError::ProviderBudgetExceeded { .. } => "provider-budget-exceeded",
            GateError::UserBudgetExceeded { .. } => "user-budget-exceeded",
            GateError::CallNotFound(_) => "not-found",
            GateError::DuplicateCall(_) => "duplicate-call",
            GateError::Storage(_) => "database",
        }
    }
}

impl From<GateError> for platform_domain::DomainError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::CallNotFound(id) => platform_domain::DomainError::NotFound(format!("ai call {id}")),
            GateError::DuplicateCall(id) => platform_domain::DomainError::DuplicateKey(format!("ai call {id}")),
            GateError::Storage(e) => e.into(),
            other => platform_domain::DomainError::BudgetDenied(other.to_string()),
        }
    }
}
