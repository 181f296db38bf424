//! Limit-enforcement properties exercised end-to-end against the in-memory
//! store, including the concurrent races the atomic primitives exist for.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use uuid::Uuid;

use reelcast_limits::{LimitEnforcer, LimitStore, LimitsConfig, MemoryLimitStore};

fn enforcer() -> LimitEnforcer {
    LimitEnforcer::new(Arc::new(MemoryLimitStore::new()), LimitsConfig::default())
}

fn noon() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 20, 12, 0, 0).unwrap()
}

/// Basic plan scenario: the 61st admission in a month is rejected and the
/// counter stays at the cap.
#[tokio::test]
async fn monthly_pool_is_tight_at_the_cap() {
    let enforcer = enforcer();
    let user = Uuid::new_v4();
    let now = noon();

    for i in 1..=60 {
        let outcome = enforcer.enforce_monthly_pool(user, 60, now).await.unwrap();
        assert!(outcome.allowed, "admission {} should pass", i);
    }

    let rejected = enforcer.enforce_monthly_pool(user, 60, now).await.unwrap();
    assert!(!rejected.allowed);
    assert_eq!(rejected.count, 60);
    assert_eq!(rejected.remaining, 0);

    // The denial did not consume anything
    let again = enforcer.enforce_monthly_pool(user, 60, now).await.unwrap();
    assert_eq!(again.count, 60);
}

/// Two requests racing for the last unit of quota: exactly one wins.
#[tokio::test]
async fn concurrent_requests_at_the_limit_admit_exactly_one() {
    let store = Arc::new(MemoryLimitStore::new());
    let enforcer = LimitEnforcer::new(store, LimitsConfig::default());
    let user = Uuid::new_v4();
    let now = noon();

    // Fill to limit - 1
    for _ in 0..59 {
        enforcer.enforce_monthly_pool(user, 60, now).await.unwrap();
    }

    let (a, b) = tokio::join!(
        enforcer.enforce_monthly_pool(user, 60, now),
        enforcer.enforce_monthly_pool(user, 60, now),
    );
    let a = a.unwrap();
    let b = b.unwrap();

    assert_eq!(
        [a.allowed, b.allowed].iter().filter(|x| **x).count(),
        1,
        "exactly one of the racing requests may take the last unit"
    );
}

/// Hourly burst scenario: 10 pass, the 11th is rejected, counter reads 10.
#[tokio::test]
async fn hourly_burst_caps_at_ten() {
    let enforcer = enforcer();
    let user = Uuid::new_v4();
    let now = noon();

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

/// A fresh hour bucket admits again: the keys differ per hour.
#[tokio::test]
async fn hourly_burst_resets_on_the_next_bucket() {
    let enforcer = enforcer();
    let user = Uuid::new_v4();
    let this_hour = noon();
    let next_hour = Utc.with_ymd_and_hms(2026, 5, 20, 13, 0, 0).unwrap();

    for _ in 0..10 {
        enforcer.enforce_hourly_burst(user, this_hour).await.unwrap();
    }
    assert!(!enforcer
        .enforce_hourly_burst(user, this_hour)
        .await
        .unwrap()
        .allowed);

    let fresh = enforcer.enforce_hourly_burst(user, next_hour).await.unwrap();
    assert!(fresh.allowed);
    assert_eq!(fresh.count, 1);
}

/// Semaphore race at capacity: one winner, one loser, loser gets a retry
/// hint.
#[tokio::test]
async fn lease_race_at_capacity_admits_exactly_one() {
    let enforcer = enforcer();
    let user = Uuid::new_v4();
    let meta = serde_json::json!({});

    // Capacity 2, one slot taken
    enforcer.acquire_user_lease(user, 2, &meta).await.unwrap();

    let (a, b) = tokio::join!(
        enforcer.acquire_user_lease(user, 2, &meta),
        enforcer.acquire_user_lease(user, 2, &meta),
    );
    let a = a.unwrap();
    let b = b.unwrap();

    assert_eq!(
        [a.acquired, b.acquired].iter().filter(|x| **x).count(),
        1,
        "exactly one racer may take the last lease slot"
    );
    let loser = if a.acquired { &b } else { &a };
    assert!(loser.retry_after_seconds > 0);
}

/// Releasing a lease frees the slot for the next admission; releasing twice
/// is harmless.
#[tokio::test]
async fn lease_release_restores_capacity() {
    let enforcer = enforcer();
    let user = Uuid::new_v4();
    let meta = serde_json::json!({});

    let lease = enforcer.acquire_user_lease(user, 1, &meta).await.unwrap();
    assert!(lease.acquired);
    assert!(!enforcer
        .acquire_user_lease(user, 1, &meta)
        .await
        .unwrap()
        .acquired);

    let released = enforcer
        .release_user_lease(user, &lease.lease_id)
        .await
        .unwrap();
    assert!(released.released);
    let again = enforcer
        .release_user_lease(user, &lease.lease_id)
        .await
        .unwrap();
    assert!(!again.released);

    assert!(enforcer
        .acquire_user_lease(user, 1, &meta)
        .await
        .unwrap()
        .acquired);
}

/// Concurrent same-key idempotency writes: the first value wins and every
/// caller observes it.
#[tokio::test]
async fn idempotency_race_has_a_single_winner() {
    let enforcer = enforcer();
    let user = Uuid::new_v4();
    let a_ids = serde_json::json!({"draftId": "a", "generationId": "a"});
    let b_ids = serde_json::json!({"draftId": "b", "generationId": "b"});

    let (a, b) = tokio::join!(
        enforcer.record_idempotency(user, "create", "key-race", &a_ids),
        enforcer.record_idempotency(user, "create", "key-race", &b_ids),
    );
    let a = a.unwrap();
    let b = b.unwrap();

    assert_eq!(
        [a.is_first, b.is_first].iter().filter(|x| **x).count(),
        1,
        "exactly one writer may claim the key"
    );
    // Both observe the same stored value
    assert_eq!(a.stored, b.stored);

    let stored = enforcer
        .lookup_idempotency(user, "create", "key-race")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.to_string(), a.stored);
}

/// Regen cooldown scenario: a second regeneration of the same draft within
/// the window is rejected with the seconds remaining; clearing (admission
/// rollback) reopens it.
#[tokio::test]
async fn regen_cooldown_blocks_and_clears() {
    let enforcer = enforcer();
    let user = Uuid::new_v4();
    let draft = Uuid::new_v4();

    assert!(enforcer
        .check_and_set_regen_cooldown(user, draft)
        .await
        .unwrap()
        .set);

    let blocked = enforcer
        .check_and_set_regen_cooldown(user, draft)
        .await
        .unwrap();
    assert!(!blocked.set);
    assert!(blocked.ttl_remaining_seconds > 0 && blocked.ttl_remaining_seconds <= 300);

    enforcer.clear_regen_cooldown(user, draft).await.unwrap();
    assert!(enforcer
        .check_and_set_regen_cooldown(user, draft)
        .await
        .unwrap()
        .set);
}

/// Admission rollback contract: a failure after the counters were taken
/// hands the quota back, and the TTL quirk (value 0, window intact) does not
/// lose capacity.
#[tokio::test]
async fn counter_rollback_returns_quota() {
    let enforcer = enforcer();
    let user = Uuid::new_v4();
    let now = noon();

    let first = enforcer.enforce_monthly_pool(user, 1, now).await.unwrap();
    assert!(first.allowed);
    assert!(!enforcer
        .enforce_monthly_pool(user, 1, now)
        .await
        .unwrap()
        .allowed);

    // Later admission step failed; the unit comes back
    enforcer.rollback_monthly_pool(user, now).await.unwrap();
    let retried = enforcer.enforce_monthly_pool(user, 1, now).await.unwrap();
    assert!(retried.allowed);
    assert_eq!(retried.count, 1);
}

/// The worker's read-only re-check sees the counter admission already
/// incremented without consuming more quota.
#[tokio::test]
async fn worker_recheck_is_read_only() {
    let store = Arc::new(MemoryLimitStore::new());
    let enforcer = LimitEnforcer::new(store.clone(), LimitsConfig::default());
    let user = Uuid::new_v4();
    let now = noon();

    enforcer.enforce_monthly_pool(user, 60, now).await.unwrap();

    for _ in 0..5 {
        assert!(enforcer.monthly_within_limit(user, 60, now).await.unwrap());
        assert!(enforcer.hourly_within_limit(user, now).await.unwrap());
    }

    // Still exactly one unit consumed
    let second = enforcer.enforce_monthly_pool(user, 60, now).await.unwrap();
    assert_eq!(second.count, 2);
}

/// Provider semaphores are keyed per `{provider, model, lane}` and capped by
/// deployment configuration.
#[tokio::test]
async fn provider_capacity_is_per_route() {
    let config = LimitsConfig {
        provider_concurrency_cap: 2,
        ..Default::default()
    };
    let enforcer = LimitEnforcer::new(Arc::new(MemoryLimitStore::new()), config);
    let meta = serde_json::json!({});

    assert!(enforcer
        .acquire_provider_lease("openai", "gpt-4o", "interactive", &meta)
        .await
        .unwrap()
        .acquired);
    assert!(enforcer
        .acquire_provider_lease("openai", "gpt-4o", "interactive", &meta)
        .await
        .unwrap()
        .acquired);
    assert!(!enforcer
        .acquire_provider_lease("openai", "gpt-4o", "interactive", &meta)
        .await
        .unwrap()
        .acquired);

    // The batch lane is a separate pool
    assert!(enforcer
        .acquire_provider_lease("openai", "gpt-4o", "batch", &meta)
        .await
        .unwrap()
        .acquired);
}

/// Direct store semantics: TTL is set once and increments never refresh it;
/// spelled out here because the monthly window must stay pinned to the
/// calendar bucket.
#[tokio::test(start_paused = true)]
async fn counter_window_is_not_extended_by_activity() {
    let store = MemoryLimitStore::new();
    store.counter_with_limit("w", 1, 100, 60).await.unwrap();

    tokio::time::advance(std::time::Duration::from_secs(50)).await;
    store.counter_with_limit("w", 1, 100, 60).await.unwrap();

    tokio::time::advance(std::time::Duration::from_secs(11)).await;
    assert_eq!(store.counter_value("w").await.unwrap(), 0);
}
