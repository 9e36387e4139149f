//! Failure classification (spec §4.6): transient / budget-denied /
//! content-invariant / logic / not-found, collapsed to the four outcomes the
//! dispatcher actually branches on (content-invariant never reaches here — it
//! is resolved inline as a successful upsert, see
//! `dispatch::generate_topic_contents`).

use platform_budget::GateError;
use platform_llm::LlmError;
use platform_storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// Network hiccup, provider 5xx/429, or a storage blip — worth retrying
    /// under the queue's existing backoff.
    #[error("transient: {0}")]
    Transient(String),

    /// The Budget Gate refused admission. Never retried by the worker itself;
    /// the scheduler is responsible for re-enqueuing once budget reopens.
    #[error("budget denied: {0}")]
    BudgetDenied(String),

    /// A task references an entity that no longer exists (module, topic,
    /// virtual module, topic content...) — it was deleted out from under the
    /// task after enqueue. Not a failure: the task is cancelled, not failed.
    #[error("referenced entity gone: {0}")]
    NotFound(String),

    /// Malformed payload or a non-retriable provider response (a 4xx is
    /// never going to succeed by retrying).
    #[error("logic error: {0}")]
    Logic(String),
}

impl From<StorageError> for WorkerError {
    fn from(err: StorageError) -> Self {
        match err {
            // `upsert_virtual_topic_content` is already an `ON CONFLICT DO
            // UPDATE`, so this path is not expected to be hit in practice;
            // kept defensive rather than silently swallowed.
            StorageError::DuplicateKey(msg) => WorkerError::Logic(format!("unexpected duplicate key: {msg}")),
            StorageError::NotFound(msg) => WorkerError::NotFound(msg),
            other => WorkerError::Transient(other.to_string()),
        }
    }
}

impl From<GateError> for WorkerError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::Storage(storage_err) => storage_err.into(),
            GateError::CallNotFound(id) => WorkerError::NotFound(format!("ai call {id} not found")),
            other => WorkerError::BudgetDenied(other.to_string()),
        }
    }
}

impl From<LlmError> for WorkerError {
    fn from(err: LlmError) -> Self {
        if err.is_retriable() {
            WorkerError::Transient(err.to_string())
        } else {
            WorkerError::Logic(err.to_string())
        }
    }
}
