//! Enforcement facade
//!
//! Typed wrappers over the atomic primitives. This is the only place that
//! knows the key layout; the admission and worker pipelines deal in users,
//! drafts, and plans.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use reelcast_common::timewin;

use crate::{
    CooldownOutcome, CounterOutcome, IdempotencyOutcome, LimitStore, LimitsError, ReleaseOutcome,
};

/// Deployment-level limit parameters.
#[derive(Debug, Clone)]
pub struct LimitsConfig {
    /// Hourly burst cap per user, all plans
    pub hourly_burst_cap: i64,
    /// Concurrency cap per `{provider, model, lane}`
    pub provider_concurrency_cap: i64,
    /// Upper bound for any generation; a worker past this loses its slot
    pub lease_ttl_seconds: i64,
    /// Per-draft regeneration cooldown
    pub regen_cooldown_seconds: i64,
    /// Idempotency record lifetime
    pub idempotency_ttl_seconds: i64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            hourly_burst_cap: 10,
            provider_concurrency_cap: 10,
            lease_ttl_seconds: 1800,
            regen_cooldown_seconds: 300,
            idempotency_ttl_seconds: 86400,
        }
    }
}

/// Outcome of a lease acquisition. The lease id is generated here and is
/// the semaphore set member, the metadata key suffix, and the envelope
/// field, one identity end-to-end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseDecision {
    pub acquired: bool,
    pub lease_id: String,
    pub retry_after_seconds: i64,
}

/// Key builders. The namespace prefix is part of the public contract
/// (operators inspect these keys), so the layout is pinned by tests.
mod keys {
    use super::*;

    const NS: &str = "app";

    pub fn monthly_usage(user_id: Uuid, now: DateTime<Utc>) -> String {
        format!("{NS}:usage:{user_id}:gen_used:{}", timewin::month_key(now))
    }

    pub fn hourly_burst(user_id: Uuid, now: DateTime<Utc>) -> String {
        format!("{NS}:burst:{user_id}:gen_hour:{}", timewin::hour_key(now))
    }

    pub fn full_regen_usage(user_id: Uuid, now: DateTime<Utc>) -> String {
        format!(
            "{NS}:usage:{user_id}:full_regen_used:{}",
            timewin::month_key(now)
        )
    }

    pub fn regen_cooldown(user_id: Uuid, draft_id: Uuid) -> String {
        format!("{NS}:cooldown:{user_id}:regen:{draft_id}")
    }

    pub fn user_leases(user_id: Uuid) -> String {
        format!("{NS}:conc:{user_id}:leases")
    }

    pub fn lease_meta_prefix() -> String {
        format!("{NS}:conc:lease:")
    }

    pub fn provider_leases(provider: &str, model: &str, lane: &str) -> String {
        format!("{NS}:conc:provider:{provider}:{model}:{lane}")
    }

    pub fn idempotency(user_id: Uuid, scope: &str, idem_key: &str) -> String {
        format!("{NS}:idem:{user_id}:{scope}:{idem_key}")
    }
}

/// Typed facade over a `LimitStore`.
#[derive(Clone)]
pub struct LimitEnforcer {
    store: Arc<dyn LimitStore>,
    config: LimitsConfig,
}

impl LimitEnforcer {
    pub fn new(store: Arc<dyn LimitStore>, config: LimitsConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &LimitsConfig {
        &self.config
    }

    pub async fn ping(&self) -> Result<(), LimitsError> {
        self.store.ping().await
    }

    // --- monthly pool ---

    pub async fn enforce_monthly_pool(
        &self,
        user_id: Uuid,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<CounterOutcome, LimitsError> {
        self.store
            .counter_with_limit(
                &keys::monthly_usage(user_id, now),
                1,
                limit,
                timewin::seconds_until_month_end(now),
            )
            .await
    }

    pub async fn rollback_monthly_pool(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<i64, LimitsError> {
        self.store
            .counter_rollback(&keys::monthly_usage(user_id, now), 1)
            .await
    }

    /// Read-only headroom check for the worker's defense-in-depth re-check.
    /// Admission already incremented for this job, so "within limit" means
    /// the counter has not overshot the cap.
    pub async fn monthly_within_limit(
        &self,
        user_id: Uuid,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, LimitsError> {
        let count = self
            .store
            .counter_value(&keys::monthly_usage(user_id, now))
            .await?;
        Ok(count <= limit)
    }

    // --- hourly burst ---

    pub async fn enforce_hourly_burst(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<CounterOutcome, LimitsError> {
        self.store
            .counter_with_limit(
                &keys::hourly_burst(user_id, now),
                1,
                self.config.hourly_burst_cap,
                timewin::seconds_until_hour_end(now),
            )
            .await
    }

    pub async fn rollback_hourly_burst(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<i64, LimitsError> {
        self.store
            .counter_rollback(&keys::hourly_burst(user_id, now), 1)
            .await
    }

    pub async fn hourly_within_limit(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, LimitsError> {
        let count = self
            .store
            .counter_value(&keys::hourly_burst(user_id, now))
            .await?;
        Ok(count <= self.config.hourly_burst_cap)
    }

    // --- full-regen cap ---

    pub async fn enforce_full_regen_cap(
        &self,
        user_id: Uuid,
        cap: i64,
        now: DateTime<Utc>,
    ) -> Result<CounterOutcome, LimitsError> {
        self.store
            .counter_with_limit(
                &keys::full_regen_usage(user_id, now),
                1,
                cap,
                timewin::seconds_until_month_end(now),
            )
            .await
    }

    pub async fn rollback_full_regen_cap(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<i64, LimitsError> {
        self.store
            .counter_rollback(&keys::full_regen_usage(user_id, now), 1)
            .await
    }

    // --- concurrency leases ---

    pub async fn acquire_user_lease(
        &self,
        user_id: Uuid,
        max_leases: i64,
        metadata: &serde_json::Value,
    ) -> Result<LeaseDecision, LimitsError> {
        let lease_id = Uuid::new_v4().to_string();
        let outcome = self
            .store
            .semaphore_acquire(
                &keys::user_leases(user_id),
                &keys::lease_meta_prefix(),
                &lease_id,
                &metadata.to_string(),
                max_leases,
                self.config.lease_ttl_seconds,
            )
            .await?;
        Ok(LeaseDecision {
            acquired: outcome.acquired,
            lease_id,
            retry_after_seconds: outcome.retry_after_seconds,
        })
    }

    pub async fn release_user_lease(
        &self,
        user_id: Uuid,
        lease_id: &str,
    ) -> Result<ReleaseOutcome, LimitsError> {
        self.store
            .semaphore_release(
                &keys::user_leases(user_id),
                &keys::lease_meta_prefix(),
                lease_id,
            )
            .await
    }

    pub async fn acquire_provider_lease(
        &self,
        provider: &str,
        model: &str,
        lane: &str,
        metadata: &serde_json::Value,
    ) -> Result<LeaseDecision, LimitsError> {
        let lease_id = Uuid::new_v4().to_string();
        let outcome = self
            .store
            .semaphore_acquire(
                &keys::provider_leases(provider, model, lane),
                &keys::lease_meta_prefix(),
                &lease_id,
                &metadata.to_string(),
                self.config.provider_concurrency_cap,
                self.config.lease_ttl_seconds,
            )
            .await?;
        Ok(LeaseDecision {
            acquired: outcome.acquired,
            lease_id,
            retry_after_seconds: outcome.retry_after_seconds,
        })
    }

    pub async fn release_provider_lease(
        &self,
        provider: &str,
        model: &str,
        lane: &str,
        lease_id: &str,
    ) -> Result<ReleaseOutcome, LimitsError> {
        self.store
            .semaphore_release(
                &keys::provider_leases(provider, model, lane),
                &keys::lease_meta_prefix(),
                lease_id,
            )
            .await
    }

    // --- regen cooldown ---

    pub async fn check_and_set_regen_cooldown(
        &self,
        user_id: Uuid,
        draft_id: Uuid,
    ) -> Result<CooldownOutcome, LimitsError> {
        self.store
            .cooldown_check_and_set(
                &keys::regen_cooldown(user_id, draft_id),
                self.config.regen_cooldown_seconds,
                "1",
            )
            .await
    }

    /// Undo a cooldown set by an admission that later failed, so the
    /// rejection does not lock the draft for the full window.
    pub async fn clear_regen_cooldown(
        &self,
        user_id: Uuid,
        draft_id: Uuid,
    ) -> Result<(), LimitsError> {
        self.store
            .cooldown_clear(&keys::regen_cooldown(user_id, draft_id))
            .await
    }

    // --- idempotency ---

    pub async fn record_idempotency(
        &self,
        user_id: Uuid,
        scope: &str,
        idem_key: &str,
        value: &serde_json::Value,
    ) -> Result<IdempotencyOutcome, LimitsError> {
        self.store
            .idempotency_get_or_set(
                &keys::idempotency(user_id, scope, idem_key),
                &value.to_string(),
                self.config.idempotency_ttl_seconds,
            )
            .await
    }

    pub async fn lookup_idempotency(
        &self,
        user_id: Uuid,
        scope: &str,
        idem_key: &str,
    ) -> Result<Option<serde_json::Value>, LimitsError> {
        let stored = self
            .store
            .idempotency_get(&keys::idempotency(user_id, scope, idem_key))
            .await?;
        Ok(stored.and_then(|s| serde_json::from_str(&s).ok()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryLimitStore;
    use chrono::TimeZone;

    fn enforcer() -> LimitEnforcer {
        LimitEnforcer::new(Arc::new(MemoryLimitStore::new()), LimitsConfig::default())
    }

    fn at_noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 20, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_key_layout() {
        let user = Uuid::nil();
        let draft = Uuid::nil();
        let now = at_noon();
        assert_eq!(
            keys::monthly_usage(user, now),
            format!("app:usage:{user}:gen_used:202605")
        );
        assert_eq!(
            keys::hourly_burst(user, now),
            format!("app:burst:{user}:gen_hour:2026052012")
        );
        assert_eq!(
            keys::full_regen_usage(user, now),
            format!("app:usage:{user}:full_regen_used:202605")
        );
        assert_eq!(
            keys::regen_cooldown(user, draft),
            format!("app:cooldown:{user}:regen:{draft}")
        );
        assert_eq!(keys::user_leases(user), format!("app:conc:{user}:leases"));
        assert_eq!(keys::lease_meta_prefix(), "app:conc:lease:");
        assert_eq!(
            keys::provider_leases("openai", "gpt-4o", "interactive"),
            "app:conc:provider:openai:gpt-4o:interactive"
        );
        assert_eq!(
            keys::idempotency(user, "create", "abc"),
            format!("app:idem:{user}:create:abc")
        );
    }

    #[tokio::test]
    async fn test_monthly_pool_enforcement_and_rollback() {
        let enforcer = enforcer();
        let user = Uuid::new_v4();
        let now = at_noon();

        let first = enforcer.enforce_monthly_pool(user, 2, now).await.unwrap();
        assert!(first.allowed);
        let second = enforcer.enforce_monthly_pool(user, 2, now).await.unwrap();
        assert!(second.allowed);
        let third = enforcer.enforce_monthly_pool(user, 2, now).await.unwrap();
        assert!(!third.allowed);

        enforcer.rollback_monthly_pool(user, now).await.unwrap();
        let after_rollback = enforcer.enforce_monthly_pool(user, 2, now).await.unwrap();
        assert!(after_rollback.allowed);
    }

    #[tokio::test]
    async fn test_hourly_burst_default_cap() {
        let enforcer = enforcer();
        let user = Uuid::new_v4();
        let now = at_noon();

        for _ in 0..10 {
            assert!(enforcer
                .enforce_hourly_burst(user, now)
                .await
                .unwrap()
                .allowed);
        }
        let eleventh = enforcer.enforce_hourly_burst(user, now).await.unwrap();
        assert!(!eleventh.allowed);
        assert_eq!(eleventh.count, 10);
    }

    #[tokio::test]
    async fn test_user_lease_lifecycle() {
        let enforcer = enforcer();
        let user = Uuid::new_v4();
        let meta = serde_json::json!({"requestId": "r-1"});

        let a = enforcer.acquire_user_lease(user, 1, &meta).await.unwrap();
        assert!(a.acquired);

        let denied = enforcer.acquire_user_lease(user, 1, &meta).await.unwrap();
        assert!(!denied.acquired);
        assert!(denied.retry_after_seconds > 0);

        let released = enforcer
            .release_user_lease(user, &a.lease_id)
            .await
            .unwrap();
        assert!(released.released);

        let again = enforcer.acquire_user_lease(user, 1, &meta).await.unwrap();
        assert!(again.acquired);
    }

    #[tokio::test]
    async fn test_provider_lease_isolated_per_route() {
        let config = LimitsConfig {
            provider_concurrency_cap: 1,
            ..Default::default()
        };
        let enforcer = LimitEnforcer::new(Arc::new(MemoryLimitStore::new()), config);
        let meta = serde_json::json!({});

        let a = enforcer
            .acquire_provider_lease("openai", "gpt-4o", "interactive", &meta)
            .await
            .unwrap();
        assert!(a.acquired);

        let denied = enforcer
            .acquire_provider_lease("openai", "gpt-4o", "interactive", &meta)
            .await
            .unwrap();
        assert!(!denied.acquired);

        // A different model is a different semaphore
        let other = enforcer
            .acquire_provider_lease("openai", "gpt-4o-mini", "interactive", &meta)
            .await
            .unwrap();
        assert!(other.acquired);
    }

    #[tokio::test]
    async fn test_regen_cooldown_and_clear() {
        let enforcer = enforcer();
        let user = Uuid::new_v4();
        let draft = Uuid::new_v4();

        let first = enforcer
            .check_and_set_regen_cooldown(user, draft)
            .await
            .unwrap();
        assert!(first.set);

        let second = enforcer
            .check_and_set_regen_cooldown(user, draft)
            .await
            .unwrap();
        assert!(!second.set);
        assert!(second.ttl_remaining_seconds > 0);

        // A different user's draft does not collide
        let other_user = enforcer
            .check_and_set_regen_cooldown(Uuid::new_v4(), draft)
            .await
            .unwrap();
        assert!(other_user.set);

        enforcer.clear_regen_cooldown(user, draft).await.unwrap();
        let after_clear = enforcer
            .check_and_set_regen_cooldown(user, draft)
            .await
            .unwrap();
        assert!(after_clear.set);
    }

    #[tokio::test]
    async fn test_idempotency_record_and_lookup() {
        let enforcer = enforcer();
        let user = Uuid::new_v4();
        let value = serde_json::json!({"draftId": "d-1", "generationId": "g-1"});

        assert_eq!(
            enforcer
                .lookup_idempotency(user, "create", "key-123")
                .await
                .unwrap(),
            None
        );

        let first = enforcer
            .record_idempotency(user, "create", "key-123", &value)
            .await
            .unwrap();
        assert!(first.is_first);

        let looked_up = enforcer
            .lookup_idempotency(user, "create", "key-123")
            .await
            .unwrap();
        assert_eq!(looked_up, Some(value.clone()));

        // Scopes are distinct keyspaces
        assert_eq!(
            enforcer
                .lookup_idempotency(user, "regen", "key-123")
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_worker_recheck_headroom() {
        let enforcer = enforcer();
        let user = Uuid::new_v4();
        let now = at_noon();

        // Admission incremented once; the worker sees the counter within the cap
        enforcer.enforce_monthly_pool(user, 60, now).await.unwrap();
        assert!(enforcer.monthly_within_limit(user, 60, now).await.unwrap());
        assert!(enforcer.hourly_within_limit(user, now).await.unwrap());

        // An absent counter (expired window) also reads as within limit
        assert!(enforcer
            .monthly_within_limit(Uuid::new_v4(), 60, now)
            .await
            .unwrap());
    }
}
