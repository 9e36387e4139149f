//! Auth types shared between the JWT middleware and handlers.
//!
//! Token issuance (login, refresh) is out of scope; this module only defines
//! the claim shape the gate trusts, the way Google ID-token verification used
//! to be kept behind a pluggable verifier.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role carried in a bearer token's `role` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Student,
    Teacher,
    InstituteAdmin,
    Admin,
}

impl Role {
    /// Whether a token carrying this role satisfies a handler requiring `required`.
    /// Roles do not nest (a STUDENT token cannot act as TEACHER); ADMIN is the
    /// only role granted blanket access.
    pub fn satisfies(self, required: Role) -> bool {
        self == required || self == Role::Admin
    }
}

/// JWT claims. Issuance lives outside this service; this is only the shape
/// `RoleGuard` decodes and trusts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: Role,
    pub workspace_id: Option<Uuid>,
    pub exp: u64,
    pub iat: u64,
}

/// Authenticated principal extracted from a verified token.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
    pub workspace_id: Option<Uuid>,
}
