use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use uuid::Uuid;
use validator::Validate;

use platform_domain::{DomainError, Envelope, Module, VirtualizationSettings};

use crate::AppState;
use crate::middleware::{RoleGuard, Teacher};

/// `PUT /modules/{id}/virtualization-settings` (spec §6).
pub async fn update_virtualization_settings(
    State(state): State<Arc<AppState>>,
    _auth: RoleGuard<Teacher>,
    Path(id): Path<Uuid>,
    Json(body): Json<VirtualizationSettings>,
) -> Result<Json<Envelope<Module>>, DomainError> {
    body.validate().map_err(DomainError::from_validation_errors)?;

    let module = state.content.update_virtualization_settings(id, body).await?;
    Ok(Envelope::ok(module))
}
