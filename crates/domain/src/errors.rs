//! Domain-wide error type with HTTP status + machine-readable code mappings.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Uniform response envelope used by every endpoint (`{ success, data?, error? }`, spec §6).
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

/// Domain errors with HTTP status code + machine-readable code mappings (spec §7).
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    /// Validation error (400 Bad Request)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Multiple validation errors (400 Bad Request)
    #[error("Validation failed")]
    ValidationErrors(Vec<String>),

    /// Resource not found (404 Not Found)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Unauthorized (401 Unauthorized)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Forbidden / permission-denied (403 Forbidden)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Conflict (409 Conflict)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Content-Store uniqueness violation surfaced outside a worker context (409).
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Unprocessable entity - business logic error (422 Unprocessable Entity)
    #[error("Business logic error: {0}")]
    BusinessLogic(String),

    /// Rate limit exceeded (429 Too Many Requests)
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Budget Gate rejected admission (402 Payment Required). Carries the
    /// machine-readable reason (`daily-budget-exceeded`, `provider-budget-exceeded`,
    /// `user-budget-exceeded`) per spec §4.4 step 4 (most specific wins).
    #[error("Budget denied: {0}")]
    BudgetDenied(String),

    /// Upstream LLM provider timeout / 5xx (503 Service Unavailable). Transient;
    /// the worker retries under backoff, callers surfacing this directly should not.
    #[error("Provider transient error: {0}")]
    ProviderTransient(String),

    /// Queue lease reclaimed mid-task by the sweeper (409 Conflict).
    #[error("Lease lost: {0}")]
    LeaseLost(String),

    /// Internal invariant broken; fatal for the operation, logged, no auto-retry.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Internal server error (500 Internal Server Error)
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),

    /// Database error (500 Internal Server Error)
    #[error("Database error")]
    Database(String),
}

impl DomainError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DomainError::Validation(_) | DomainError::ValidationErrors(_) => {
                StatusCode::BAD_REQUEST
            }
            DomainError::NotFound(_) => StatusCode::NOT_FOUND,
            DomainError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            DomainError::Forbidden(_) => StatusCode::FORBIDDEN,
            DomainError::Conflict(_) | DomainError::DuplicateKey(_) | DomainError::LeaseLost(_) => {
                StatusCode::CONFLICT
            }
            DomainError::BusinessLogic(_) => StatusCode::UNPROCESSABLE_ENTITY,
            DomainError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            DomainError::BudgetDenied(_) => StatusCode::PAYMENT_REQUIRED,
            DomainError::ProviderTransient(_) => StatusCode::SERVICE_UNAVAILABLE,
            DomainError::Internal(_)
            | DomainError::Database(_)
            | DomainError::InvariantViolation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code for the envelope's `error.code` field (spec §7 kinds).
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::Validation(_) | DomainError::ValidationErrors(_) => "validation",
            DomainError::NotFound(_) => "not-found",
            DomainError::Unauthorized(_) => "unauthorized",
            DomainError::Forbidden(_) => "permission-denied",
            DomainError::Conflict(_) => "conflict",
            DomainError::DuplicateKey(_) => "duplicate-key",
            DomainError::BusinessLogic(_) => "business-logic",
            DomainError::RateLimitExceeded => "rate-limit-exceeded",
            DomainError::BudgetDenied(_) => "budget-denied",
            DomainError::ProviderTransient(_) => "provider-transient",
            DomainError::LeaseLost(_) => "lease-lost",
            DomainError::InvariantViolation(_) => "invariant-violation",
            DomainError::Internal(_) => "internal",
            DomainError::Database(_) => "database",
        }
    }

    pub fn from_validation_errors(errors: validator::ValidationErrors) -> Self {
        let messages: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| {
                    format!(
                        "{}: {}",
                        field,
                        error
                            .message
                            .as_ref()
                            .unwrap_or(&std::borrow::Cow::Borrowed("validation failed"))
                    )
                })
            })
            .collect();

        if messages.is_empty() {
            DomainError::Validation("Invalid input".to_string())
        } else {
            DomainError::ValidationErrors(messages)
        }
    }
}

impl IntoResponse for DomainError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if matches!(
            self,
            DomainError::Internal(_) | DomainError::Database(_) | DomainError::InvariantViolation(_)
        ) {
            tracing::error!("Internal error: {}", self);
        }

        let code = self.code().to_string();
        let details = match &self {
            DomainError::ValidationErrors(details) => Some(details.clone()),
            _ => None,
        };

        let body = Envelope::<()> {
            success: false,
            data: None,
            error: Some(ErrorBody {
                code,
                message: self.to_string(),
                details,
            }),
        };

        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::Database(err.to_string())
    }
}
