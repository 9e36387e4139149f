//! Generation Worker (C6): the fixed-size pool that drains the Generation
//! Queue, dispatches by task type, and adapts content through the LLM
//! provider boundary behind the Budget Gate.

pub mod dispatch;
pub mod error;
pub mod pool;

pub use error::WorkerError;
pub use pool::{WorkerDeps, WorkerPool};
