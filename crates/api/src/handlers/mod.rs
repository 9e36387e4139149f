pub mod ai_monitoring;
pub mod content_sync;
pub mod health;
pub mod modules;
pub mod virtualization;
