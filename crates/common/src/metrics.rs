//! In-process metrics counters
//!
//! One `Metrics` value lives in the application state and is shared across
//! the admission and worker pipelines. Counters are plain atomics; the
//! snapshot is served at `GET /internal/metrics`.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Which limit rejected an admission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    Monthly,
    Hourly,
    UserConcurrency,
    ProviderConcurrency,
    RegenCooldown,
    FullRegenCap,
}

/// Job lifecycle stages counted per transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Queued,
    Started,
    Completed,
    Failed,
}

#[derive(Debug, Default)]
struct ProviderCounters {
    requests: AtomicU64,
    rate_limited: AtomicU64,
}

/// Shared counter set. All methods are lock-free and callable from any task.
#[derive(Debug, Default)]
pub struct Metrics {
    rejection_monthly: AtomicU64,
    rejection_hourly: AtomicU64,
    rejection_concurrency: AtomicU64,
    rejection_provider: AtomicU64,
    rejection_regen_cooldown: AtomicU64,
    rejection_full_regen_cap: AtomicU64,

    openai: ProviderCounters,
    anthropic: ProviderCounters,

    jobs_completed_success: AtomicU64,
    jobs_completed_failed: AtomicU64,

    lifecycle_queued: AtomicU64,
    lifecycle_started: AtomicU64,
    lifecycle_completed: AtomicU64,
    lifecycle_failed: AtomicU64,

    latency_lt_5s: AtomicU64,
    latency_5_30s: AtomicU64,
    latency_30_60s: AtomicU64,
    latency_gt_60s: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_rejection(&self, kind: RejectionKind) {
        let counter = match kind {
            RejectionKind::Monthly => &self.rejection_monthly,
            RejectionKind::Hourly => &self.rejection_hourly,
            RejectionKind::UserConcurrency => &self.rejection_concurrency,
            RejectionKind::ProviderConcurrency => &self.rejection_provider,
            RejectionKind::RegenCooldown => &self.rejection_regen_cooldown,
            RejectionKind::FullRegenCap => &self.rejection_full_regen_cap,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a provider call outcome; `rate_limited` marks a 429.
    pub fn record_provider_result(&self, provider: &str, rate_limited: bool) {
        let counters = match provider {
            "openai" => &self.openai,
            "anthropic" => &self.anthropic,
            _ => return,
        };
        counters.requests.fetch_add(1, Ordering::Relaxed);
        if rate_limited {
            counters.rate_limited.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_lifecycle(&self, stage: Lifecycle) {
        let counter = match stage {
            Lifecycle::Queued => &self.lifecycle_queued,
            Lifecycle::Started => &self.lifecycle_started,
            Lifecycle::Completed => &self.lifecycle_completed,
            Lifecycle::Failed => &self.lifecycle_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job_outcome(&self, success: bool) {
        if success {
            self.jobs_completed_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.jobs_completed_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record enqueue-to-completion latency into the fixed buckets.
    pub fn observe_job_latency(&self, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        let bucket = if secs < 5.0 {
            &self.latency_lt_5s
        } else if secs < 30.0 {
            &self.latency_5_30s
        } else if secs < 60.0 {
            &self.latency_30_60s
        } else {
            &self.latency_gt_60s
        };
        bucket.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |a: &AtomicU64| a.load(Ordering::Relaxed);
        MetricsSnapshot {
            limit_rejections: RejectionSnapshot {
                monthly: load(&self.rejection_monthly),
                hourly: load(&self.rejection_hourly),
                concurrency: load(&self.rejection_concurrency),
                provider: load(&self.rejection_provider),
                regen_cooldown: load(&self.rejection_regen_cooldown),
                full_regen_cap: load(&self.rejection_full_regen_cap),
            },
            providers: vec![
                ProviderSnapshot::from_counters("openai", &self.openai),
                ProviderSnapshot::from_counters("anthropic", &self.anthropic),
            ],
            jobs: JobsSnapshot {
                completed_success: load(&self.jobs_completed_success),
                completed_failed: load(&self.jobs_completed_failed),
            },
            lifecycle: LifecycleSnapshot {
                queued: load(&self.lifecycle_queued),
                started: load(&self.lifecycle_started),
                completed: load(&self.lifecycle_completed),
                failed: load(&self.lifecycle_failed),
            },
            latency_buckets: LatencySnapshot {
                lt_5s: load(&self.latency_lt_5s),
                from_5s_to_30s: load(&self.latency_5_30s),
                from_30s_to_60s: load(&self.latency_30_60s),
                gt_60s: load(&self.latency_gt_60s),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RejectionSnapshot {
    pub monthly: u64,
    pub hourly: u64,
    pub concurrency: u64,
    pub provider: u64,
    pub regen_cooldown: u64,
    pub full_regen_cap: u64,
}

#[derive(Debug, Serialize)]
pub struct ProviderSnapshot {
    pub provider: String,
    pub requests: u64,
    pub rate_limited: u64,
    /// errors / total; 0 when no requests have been made
    pub rate_limit_ratio: f64,
}

impl ProviderSnapshot {
    fn from_counters(name: &str, counters: &ProviderCounters) -> Self {
        let requests = counters.requests.load(Ordering::Relaxed);
        let rate_limited = counters.rate_limited.load(Ordering::Relaxed);
        let rate_limit_ratio = if requests == 0 {
            0.0
        } else {
            rate_limited as f64 / requests as f64
        };
        Self {
            provider: name.to_string(),
            requests,
            rate_limited,
            rate_limit_ratio,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobsSnapshot {
    pub completed_success: u64,
    pub completed_failed: u64,
}

#[derive(Debug, Serialize)]
pub struct LifecycleSnapshot {
    pub queued: u64,
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
}

#[derive(Debug, Serialize)]
pub struct LatencySnapshot {
    pub lt_5s: u64,
    pub from_5s_to_30s: u64,
    pub from_30s_to_60s: u64,
    pub gt_60s: u64,
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub limit_rejections: RejectionSnapshot,
    pub providers: Vec<ProviderSnapshot>,
    pub jobs: JobsSnapshot,
    pub lifecycle: LifecycleSnapshot,
    pub latency_buckets: LatencySnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_counters() {
        let metrics = Metrics::new();
        metrics.record_rejection(RejectionKind::Monthly);
        metrics.record_rejection(RejectionKind::Monthly);
        metrics.record_rejection(RejectionKind::RegenCooldown);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.limit_rejections.monthly, 2);
        assert_eq!(snapshot.limit_rejections.regen_cooldown, 1);
        assert_eq!(snapshot.limit_rejections.hourly, 0);
    }

    #[test]
    fn test_provider_rate_limit_ratio() {
        let metrics = Metrics::new();
        metrics.record_provider_result("openai", false);
        metrics.record_provider_result("openai", false);
        metrics.record_provider_result("openai", true);
        metrics.record_provider_result("unknown", true); // dropped

        let snapshot = metrics.snapshot();
        let openai = &snapshot.providers[0];
        assert_eq!(openai.requests, 3);
        assert_eq!(openai.rate_limited, 1);
        assert!((openai.rate_limit_ratio - 1.0 / 3.0).abs() < 1e-9);

        let anthropic = &snapshot.providers[1];
        assert_eq!(anthropic.requests, 0);
        assert_eq!(anthropic.rate_limit_ratio, 0.0);
    }

    #[test]
    fn test_latency_buckets() {
        let metrics = Metrics::new();
        metrics.observe_job_latency(Duration::from_secs(2));
        metrics.observe_job_latency(Duration::from_secs(10));
        metrics.observe_job_latency(Duration::from_secs(45));
        metrics.observe_job_latency(Duration::from_secs(120));
        metrics.observe_job_latency(Duration::from_millis(4999));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.latency_buckets.lt_5s, 2);
        assert_eq!(snapshot.latency_buckets.from_5s_to_30s, 1);
        assert_eq!(snapshot.latency_buckets.from_30s_to_60s, 1);
        assert_eq!(snapshot.latency_buckets.gt_60s, 1);
    }

    #[test]
    fn test_lifecycle_and_outcomes() {
        let metrics = Metrics::new();
        metrics.record_lifecycle(Lifecycle::Queued);
        metrics.record_lifecycle(Lifecycle::Started);
        metrics.record_lifecycle(Lifecycle::Completed);
        metrics.record_job_outcome(true);
        metrics.record_job_outcome(false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.lifecycle.queued, 1);
        assert_eq!(snapshot.lifecycle.started, 1);
        assert_eq!(snapshot.lifecycle.completed, 1);
        assert_eq!(snapshot.jobs.completed_success, 1);
        assert_eq!(snapshot.jobs.completed_failed, 1);
    }
}
