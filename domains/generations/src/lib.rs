//! Generations domain: admission control, worker execution, variants, usage
//!
//! This crate is the core of the service: the `Create` and `Regenerate`
//! admission pipelines (quota, burst, concurrency, cooldown, idempotency,
//! durable insert, queue dispatch, rollback), and the worker pipeline that
//! re-checks limits, invokes the generator, persists variants and the usage
//! ledger, and releases leases on every exit path.

pub mod api;
pub mod domain;
pub mod repository;

// Re-export domain types at the crate root for convenience
pub use domain::entities::*;
pub use domain::state::{GenerationEvent, GenerationState, GenerationStateMachine, StateError};

// Re-export repository types
pub use repository::GenerationsRepositories;

// Re-export API types
pub use api::routes;
pub use api::GenerationsState;
