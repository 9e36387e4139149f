//! Progressive Scheduler (C7) and Sync Reconciler (C8): pure policy over the
//! Content Store, Virtual Store, and Generation Queue repositories.

pub mod progressive;
pub mod reconciler;
pub mod sweeper;

pub use progressive::ProgressiveScheduler;
pub use reconciler::SyncReconciler;
pub use sweeper::Sweeper;
