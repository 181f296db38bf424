//! Redis-backed limit store
//!
//! Every primitive runs as a Lua script via `redis::Script` (EVALSHA with
//! automatic script loading), so each call is one round trip and one atomic
//! server-side step.

use redis::aio::ConnectionManager;
use redis::Script;

use crate::scripts;
use crate::{
    CooldownOutcome, CounterOutcome, IdempotencyOutcome, LimitStore, LimitsError, ReleaseOutcome,
    SemaphoreOutcome,
};

pub struct RedisLimitStore {
    conn: ConnectionManager,
    counter_with_limit: Script,
    counter_rollback: Script,
    semaphore_acquire: Script,
    semaphore_release: Script,
    cooldown_check_and_set: Script,
    idempotency_get_or_set: Script,
}

impl RedisLimitStore {
    /// Connect eagerly; a bad URL fails at startup rather than on the first
    /// admission request.
    pub async fn connect(url: &str) -> Result<Self, LimitsError> {
        let client = redis::Client::open(url)
            .map_err(|e| LimitsError::Configuration(format!("Invalid redis URL: {}", e)))?;
        let conn = client.get_connection_manager().await?;
        Ok(Self {
            conn,
            counter_with_limit: Script::new(scripts::COUNTER_WITH_LIMIT),
            counter_rollback: Script::new(scripts::COUNTER_ROLLBACK),
            semaphore_acquire: Script::new(scripts::SEMAPHORE_ACQUIRE),
            semaphore_release: Script::new(scripts::SEMAPHORE_RELEASE),
            cooldown_check_and_set: Script::new(scripts::COOLDOWN_CHECK_AND_SET),
            idempotency_get_or_set: Script::new(scripts::IDEMPOTENCY_GET_OR_SET),
        })
    }
}

#[async_trait::async_trait]
impl LimitStore for RedisLimitStore {
    async fn counter_with_limit(
        &self,
        key: &str,
        increment: i64,
        limit: i64,
        ttl_seconds: i64,
    ) -> Result<CounterOutcome, LimitsError> {
        let mut conn = self.conn.clone();
        let (allowed, count, remaining): (i64, i64, i64) = self
            .counter_with_limit
            .key(key)
            .arg(increment)
            .arg(limit)
            .arg(ttl_seconds)
            .invoke_async(&mut conn)
            .await?;
        Ok(CounterOutcome {
            allowed: allowed == 1,
            count,
            remaining,
        })
    }

    async fn counter_rollback(&self, key: &str, amount: i64) -> Result<i64, LimitsError> {
        let mut conn = self.conn.clone();
        let count: i64 = self
            .counter_rollback
            .key(key)
            .arg(amount)
            .invoke_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn counter_value(&self, key: &str) -> Result<i64, LimitsError> {
        let mut conn = self.conn.clone();
        let value: Option<i64> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value.unwrap_or(0))
    }

    async fn semaphore_acquire(
        &self,
        set_key: &str,
        meta_prefix: &str,
        lease_id: &str,
        metadata: &str,
        max_leases: i64,
        lease_ttl_seconds: i64,
    ) -> Result<SemaphoreOutcome, LimitsError> {
        let mut conn = self.conn.clone();
        let (acquired, active, retry_after): (i64, i64, i64) = self
            .semaphore_acquire
            .key(set_key)
            .arg(meta_prefix)
            .arg(lease_id)
            .arg(metadata)
            .arg(max_leases)
            .arg(lease_ttl_seconds)
            .invoke_async(&mut conn)
            .await?;
        Ok(SemaphoreOutcome {
            acquired: acquired == 1,
            active,
            retry_after_seconds: retry_after,
        })
    }

    async fn semaphore_release(
        &self,
        set_key: &str,
        meta_prefix: &str,
        lease_id: &str,
    ) -> Result<ReleaseOutcome, LimitsError> {
        let mut conn = self.conn.clone();
        let (released,): (i64,) = self
            .semaphore_release
            .key(set_key)
            .arg(meta_prefix)
            .arg(lease_id)
            .invoke_async(&mut conn)
            .await?;
        Ok(ReleaseOutcome {
            released: released == 1,
        })
    }

    async fn cooldown_check_and_set(
        &self,
        key: &str,
        seconds: i64,
        value: &str,
    ) -> Result<CooldownOutcome, LimitsError> {
        let mut conn = self.conn.clone();
        let (set, ttl_remaining): (i64, i64) = self
            .cooldown_check_and_set
            .key(key)
            .arg(seconds)
            .arg(value)
            .invoke_async(&mut conn)
            .await?;
        Ok(CooldownOutcome {
            set: set == 1,
            ttl_remaining_seconds: ttl_remaining,
        })
    }

    async fn cooldown_clear(&self, key: &str) -> Result<(), LimitsError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(())
    }

    async fn idempotency_get_or_set(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: i64,
    ) -> Result<IdempotencyOutcome, LimitsError> {
        let mut conn = self.conn.clone();
        let (is_first, stored): (i64, String) = self
            .idempotency_get_or_set
            .key(key)
            .arg(value)
            .arg(ttl_seconds)
            .invoke_async(&mut conn)
            .await?;
        Ok(IdempotencyOutcome {
            is_first: is_first == 1,
            stored,
        })
    }

    async fn idempotency_get(&self, key: &str) -> Result<Option<String>, LimitsError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn ping(&self) -> Result<(), LimitsError> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(LimitsError::Store(format!(
                "unexpected PING reply: {}",
                pong
            )))
        }
    }
}
