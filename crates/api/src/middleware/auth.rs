//! Bearer-JWT auth. Token issuance (login, refresh) stays out of scope; this
//! module only decodes and trusts the `Claims` shape, with one extractor
//! parameterized by the role it requires.

use std::marker::PhantomData;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{DecodingKey, Validation, decode};

use platform_domain::{Claims, DomainError, Principal, Role};

use crate::AppState;

/// What role a `RoleGuard<R>` instantiation requires of the decoded token.
pub trait RoleRequirement: Send + Sync + 'static {
    fn allows(role: Role) -> bool;
}

/// Any authenticated principal, regardless of role (spec §6: `any`).
pub struct AnyRole;
impl RoleRequirement for AnyRole {
    fn allows(_role: Role) -> bool {
        true
    }
}

pub struct Student;
impl RoleRequirement for Student {
    fn allows(role: Role) -> bool {
        role.satisfies(Role::Student)
    }
}

pub struct Teacher;
impl RoleRequirement for Teacher {
    fn allows(role: Role) -> bool {
        role.satisfies(Role::Teacher)
    }
}

pub struct Admin;
impl RoleRequirement for Admin {
    fn allows(role: Role) -> bool {
        role.satisfies(Role::Admin)
    }
}

fn decode_claims(parts: &Parts, jwt_secret: &str) -> Result<Claims, DomainError> {
    let auth_header = parts
        .headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| DomainError::Unauthorized("missing Authorization header".to_string()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| DomainError::Unauthorized("expected a Bearer token".to_string()))?;

    let token_data = decode::<Claims>(token, &DecodingKey::from_secret(jwt_secret.as_bytes()), &Validation::default()).map_err(|err| {
        tracing::warn!(error = %err, "jwt verification failed");
        DomainError::Unauthorized("invalid or expired token".to_string())
    })?;

    Ok(token_data.claims)
}

/// Axum extractor decoding and role-checking a bearer JWT. Use
/// `RoleGuard<Student>`/`RoleGuard<Teacher>`/`RoleGuard<Admin>`/`RoleGuard<AnyRole>`
/// as a handler parameter instead of calling the middleware by hand — a
/// handler declaring it is automatically protected.
pub struct RoleGuard<R: RoleRequirement> {
    pub principal: Principal,
    _marker: PhantomData<R>,
}

impl<R: RoleRequirement> FromRequestParts<Arc<AppState>> for RoleGuard<R> {
    type Rejection = DomainError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let claims = decode_claims(parts, &state.config.jwt_secret)?;

        if !R::allows(claims.role) {
            return Err(DomainError::Forbidden(format!("role {:?} cannot access this endpoint", claims.role)));
        }

        let user_id = claims
            .sub
            .parse()
            .map_err(|_| DomainError::Unauthorized("malformed subject claim".to_string()))?;

        Ok(RoleGuard {
            principal: Principal {
                user_id,
                email: claims.email,
                role: claims.role,
                workspace_id: claims.workspace_id,
            },
            _marker: PhantomData,
        })
    }
}
