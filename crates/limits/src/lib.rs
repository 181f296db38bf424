//! Atomic rate-limit primitives and the enforcement facade
//!
//! The primitives are compare-and-act operations on one or two keys,
//! executed server-side in the key/value store so that concurrent callers
//! observe a single atomic step (`SCARD` + `SADD` happen inside one script).
//! The `LimitEnforcer` facade assembles keys, TTLs, and limits from
//! `(user, plan)` and exposes typed operations to the admission and worker
//! pipelines.
//!
//! Two store implementations exist: `RedisLimitStore` (production, Lua
//! scripts) and `MemoryLimitStore` (tests and development) with identical
//! semantics.

pub mod enforcer;
pub mod memory;
pub mod redis;
pub mod scripts;

use std::sync::Arc;

pub use enforcer::{LeaseDecision, LimitEnforcer, LimitsConfig};
pub use memory::MemoryLimitStore;
pub use self::redis::RedisLimitStore;

#[derive(Debug, thiserror::Error)]
pub enum LimitsError {
    #[error("Limit store error: {0}")]
    Store(String),

    #[error("Limit store configuration error: {0}")]
    Configuration(String),
}

impl From<::redis::RedisError> for LimitsError {
    fn from(err: ::redis::RedisError) -> Self {
        LimitsError::Store(err.to_string())
    }
}

/// Result of `counter_with_limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterOutcome {
    pub allowed: bool,
    pub count: i64,
    pub remaining: i64,
}

/// Result of `semaphore_acquire`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemaphoreOutcome {
    pub acquired: bool,
    /// Leases held after this call (including the new one on success)
    pub active: i64,
    /// On denial: seconds until an existing lease expires
    pub retry_after_seconds: i64,
}

/// Result of `semaphore_release`. Missing leases are not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseOutcome {
    pub released: bool,
}

/// Result of `cooldown_check_and_set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownOutcome {
    pub set: bool,
    /// On denial: seconds until the cooldown clears
    pub ttl_remaining_seconds: i64,
}

/// Result of `idempotency_get_or_set`. The first caller's value wins; later
/// callers receive it verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyOutcome {
    pub is_first: bool,
    pub stored: String,
}

/// The atomic primitive set. Every operation is a single server-side step.
#[async_trait::async_trait]
pub trait LimitStore: Send + Sync {
    /// Increment `key` by `increment` unless that would exceed `limit`.
    /// The TTL is set only when the key does not yet exist; later
    /// increments never refresh it, so the window stays bound to its
    /// calendar bucket.
    async fn counter_with_limit(
        &self,
        key: &str,
        increment: i64,
        limit: i64,
        ttl_seconds: i64,
    ) -> Result<CounterOutcome, LimitsError>;

    /// Compensate a prior increment. Floors at zero; the TTL is untouched.
    async fn counter_rollback(&self, key: &str, amount: i64) -> Result<i64, LimitsError>;

    /// Read a counter without mutating it. Missing keys read as zero.
    async fn counter_value(&self, key: &str) -> Result<i64, LimitsError>;

    /// Add `lease_id` to the semaphore set unless `max_leases` are already
    /// held. Members whose metadata has expired are pruned before counting;
    /// on success the set TTL is refreshed to twice the lease TTL so the
    /// aggregate key outlives any individual lease.
    async fn semaphore_acquire(
        &self,
        set_key: &str,
        meta_prefix: &str,
        lease_id: &str,
        metadata: &str,
        max_leases: i64,
        lease_ttl_seconds: i64,
    ) -> Result<SemaphoreOutcome, LimitsError>;

    /// Remove a lease. Idempotent: releasing an unknown lease reports
    /// `released: false` without error.
    async fn semaphore_release(
        &self,
        set_key: &str,
        meta_prefix: &str,
        lease_id: &str,
    ) -> Result<ReleaseOutcome, LimitsError>;

    /// Set `key` only if absent. On denial, reports the remaining TTL.
    async fn cooldown_check_and_set(
        &self,
        key: &str,
        seconds: i64,
        value: &str,
    ) -> Result<CooldownOutcome, LimitsError>;

    /// Drop a cooldown (admission rollback path).
    async fn cooldown_clear(&self, key: &str) -> Result<(), LimitsError>;

    /// First caller stores `value`; everyone else gets the stored value.
    async fn idempotency_get_or_set(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: i64,
    ) -> Result<IdempotencyOutcome, LimitsError>;

    /// Read an idempotency record without writing.
    async fn idempotency_get(&self, key: &str) -> Result<Option<String>, LimitsError>;

    /// Liveness check for the health probe.
    async fn ping(&self) -> Result<(), LimitsError>;
}

/// Factory for creating `LimitStore` implementations.
pub struct LimitStoreFactory;

impl LimitStoreFactory {
    /// Create a store based on configuration. `redis` connects eagerly so a
    /// bad URL fails at startup, not on the first admission.
    pub async fn create(provider: &str, url: &str) -> Result<Arc<dyn LimitStore>, LimitsError> {
        match provider {
            "redis" => {
                tracing::info!("Creating redis limit store");
                let store = RedisLimitStore::connect(url).await?;
                Ok(Arc::new(store))
            }
            "memory" => {
                tracing::info!("Creating in-memory limit store");
                Ok(Arc::new(MemoryLimitStore::new()))
            }
            provider => Err(LimitsError::Configuration(format!(
                "Unknown limit store provider: {}. Supported providers: redis, memory",
                provider
            ))),
        }
    }
}
