//! Domain types for the adaptive-learning backend.

pub mod auth;
pub mod budget;
pub mod content;
pub mod errors;
pub mod queue;
pub mod virtual_content;

use serde::Serialize;

pub use auth::*;
pub use budget::*;
pub use content::*;
pub use errors::*;
pub use queue::*;
pub use virtual_content::*;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub build_sha: String,
    pub uptime_seconds: u64,
}

/// Ready check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub database: String,
}

/// Summary of rows touched by a cascading delete, returned for audit logging.
#[derive(Debug, Clone, Serialize, Default)]
pub struct CascadeSummary {
    pub topics: u64,
    pub contents: u64,
    pub virtual_modules: u64,
}
