pub mod auth;

pub use auth::{Admin, AnyRole, RoleGuard, Student, Teacher};
