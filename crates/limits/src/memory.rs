//! In-memory limit store for tests and development
//!
//! Mirrors the Lua script semantics exactly: TTL set only on first write,
//! stale-lease pruning, set TTL at twice the lease TTL, idempotent release.
//! Time is `tokio::time::Instant`, so tests can pause and advance the clock.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tokio::time::{Duration, Instant};

use crate::{
    CooldownOutcome, CounterOutcome, IdempotencyOutcome, LimitStore, LimitsError, ReleaseOutcome,
    SemaphoreOutcome,
};

#[derive(Debug, Clone)]
struct CounterEntry {
    value: i64,
    expires_at: Instant,
}

#[derive(Debug, Clone)]
struct StringEntry {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Clone, Default)]
struct SetEntry {
    members: HashSet<String>,
    expires_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct Inner {
    counters: HashMap<String, CounterEntry>,
    strings: HashMap<String, StringEntry>,
    sets: HashMap<String, SetEntry>,
}

impl Inner {
    fn prune_counter(&mut self, key: &str, now: Instant) {
        if let Some(entry) = self.counters.get(key) {
            if entry.expires_at <= now {
                self.counters.remove(key);
            }
        }
    }

    fn prune_string(&mut self, key: &str, now: Instant) {
        if let Some(entry) = self.strings.get(key) {
            if entry.expires_at <= now {
                self.strings.remove(key);
            }
        }
    }

    fn live_string(&mut self, key: &str, now: Instant) -> Option<&StringEntry> {
        self.prune_string(key, now);
        self.strings.get(key)
    }
}

/// In-memory `LimitStore` with the same observable behavior as the redis
/// scripts.
#[derive(Debug, Default)]
pub struct MemoryLimitStore {
    inner: Mutex<Inner>,
}

impl MemoryLimitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl LimitStore for MemoryLimitStore {
    async fn counter_with_limit(
        &self,
        key: &str,
        increment: i64,
        limit: i64,
        ttl_seconds: i64,
    ) -> Result<CounterOutcome, LimitsError> {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();
        inner.prune_counter(key, now);

        let current = inner.counters.get(key).map(|e| e.value).unwrap_or(0);
        if current + increment > limit {
            return Ok(CounterOutcome {
                allowed: false,
                count: current,
                remaining: (limit - current).max(0),
            });
        }

        let entry = inner
            .counters
            .entry(key.to_string())
            .or_insert_with(|| CounterEntry {
                value: 0,
                expires_at: now + Duration::from_secs(ttl_seconds.max(1) as u64),
            });
        entry.value += increment;
        let count = entry.value;
        Ok(CounterOutcome {
            allowed: true,
            count,
            remaining: limit - count,
        })
    }

    async fn counter_rollback(&self, key: &str, amount: i64) -> Result<i64, LimitsError> {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();
        inner.prune_counter(key, now);

        match inner.counters.get_mut(key) {
            Some(entry) if entry.value > 0 => {
                entry.value -= amount.min(entry.value);
                Ok(entry.value)
            }
            Some(entry) => Ok(entry.value),
            None => Ok(0),
        }
    }

    async fn counter_value(&self, key: &str) -> Result<i64, LimitsError> {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();
        inner.prune_counter(key, now);
        Ok(inner.counters.get(key).map(|e| e.value).unwrap_or(0))
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
        let now = Instant::now();
        let lease_ttl = Duration::from_secs(lease_ttl_seconds.max(1) as u64);
        let mut inner = self.inner.lock().unwrap();

        // Drop the whole set when its own TTL has lapsed
        if let Some(set) = inner.sets.get(set_key) {
            if matches!(set.expires_at, Some(at) if at <= now) {
                inner.sets.remove(set_key);
            }
        }

        // Prune members whose lease metadata expired
        let members: Vec<String> = inner
            .sets
            .get(set_key)
            .map(|s| s.members.iter().cloned().collect())
            .unwrap_or_default();
        for member in members {
            let meta_key = format!("{}{}", meta_prefix, member);
            if inner.live_string(&meta_key, now).is_none() {
                if let Some(set) = inner.sets.get_mut(set_key) {
                    set.members.remove(&member);
                }
            }
        }

        let count = inner.sets.get(set_key).map(|s| s.members.len()).unwrap_or(0) as i64;
        if count >= max_leases {
            // Report the soonest lease expiry as the retry hint
            let mut retry = lease_ttl_seconds;
            if let Some(set) = inner.sets.get(set_key) {
                for member in &set.members {
                    let meta_key = format!("{}{}", meta_prefix, member);
                    if let Some(entry) = inner.strings.get(&meta_key) {
                        let remaining = entry
                            .expires_at
                            .saturating_duration_since(now)
                            .as_secs() as i64;
                        if remaining > 0 && remaining < retry {
                            retry = remaining;
                        }
                    }
                }
            }
            return Ok(SemaphoreOutcome {
                acquired: false,
                active: count,
                retry_after_seconds: retry,
            });
        }

        let set = inner.sets.entry(set_key.to_string()).or_default();
        set.members.insert(lease_id.to_string());
        set.expires_at = Some(now + 2 * lease_ttl);
        inner.strings.insert(
            format!("{}{}", meta_prefix, lease_id),
            StringEntry {
                value: metadata.to_string(),
                expires_at: now + lease_ttl,
            },
        );
        Ok(SemaphoreOutcome {
            acquired: true,
            active: count + 1,
            retry_after_seconds: 0,
        })
    }

    async fn semaphore_release(
        &self,
        set_key: &str,
        meta_prefix: &str,
        lease_id: &str,
    ) -> Result<ReleaseOutcome, LimitsError> {
        let mut inner = self.inner.lock().unwrap();
        let removed = inner
            .sets
            .get_mut(set_key)
            .map(|s| s.members.remove(lease_id))
            .unwrap_or(false);
        inner.strings.remove(&format!("{}{}", meta_prefix, lease_id));
        Ok(ReleaseOutcome { released: removed })
    }

    async fn cooldown_check_and_set(
        &self,
        key: &str,
        seconds: i64,
        value: &str,
    ) -> Result<CooldownOutcome, LimitsError> {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();

        if let Some(entry) = inner.live_string(key, now) {
            let remaining = entry.expires_at.saturating_duration_since(now).as_secs() as i64;
            return Ok(CooldownOutcome {
                set: false,
                ttl_remaining_seconds: remaining.max(0),
            });
        }

        inner.strings.insert(
            key.to_string(),
            StringEntry {
                value: value.to_string(),
                expires_at: now + Duration::from_secs(seconds.max(1) as u64),
            },
        );
        Ok(CooldownOutcome {
            set: true,
            ttl_remaining_seconds: 0,
        })
    }

    async fn cooldown_clear(&self, key: &str) -> Result<(), LimitsError> {
        let mut inner = self.inner.lock().unwrap();
        inner.strings.remove(key);
        Ok(())
    }

    async fn idempotency_get_or_set(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: i64,
    ) -> Result<IdempotencyOutcome, LimitsError> {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();

        if let Some(entry) = inner.live_string(key, now) {
            return Ok(IdempotencyOutcome {
                is_first: false,
                stored: entry.value.clone(),
            });
        }

        inner.strings.insert(
            key.to_string(),
            StringEntry {
                value: value.to_string(),
                expires_at: now + Duration::from_secs(ttl_seconds.max(1) as u64),
            },
        );
        Ok(IdempotencyOutcome {
            is_first: true,
            stored: value.to_string(),
        })
    }

    async fn idempotency_get(&self, key: &str) -> Result<Option<String>, LimitsError> {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();
        Ok(inner.live_string(key, now).map(|e| e.value.clone()))
    }

    async fn ping(&self) -> Result<(), LimitsError> {
        Ok(())
    }
}
