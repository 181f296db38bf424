//! Reelcast queue dispatch
//!
//! The job envelope is the canonical wire contract between admission and the
//! worker. Dispatch goes through a `Dispatcher` trait with three variants
//! chosen explicitly at process start: the QStash bus (production), a local
//! in-process loopback (development), and a recording mock (tests).

pub mod local;
pub mod mock;
pub mod qstash;
pub mod signature;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use reelcast_plans::Lane;

pub use local::LocalDispatcher;
pub use mock::MockDispatcher;
pub use qstash::QstashDispatcher;
pub use signature::{sign_body, verify_signature, SIGNATURE_HEADER};

/// Header that lets the local dispatcher bypass signature verification in
/// development mode.
pub const LOCAL_DEV_HEADER: &str = "x-local-dev";

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue configuration error: {0}")]
    Configuration(String),

    #[error("Queue request error: {0}")]
    Request(String),

    #[error("Queue response error: {0}")]
    Response(String),
}

/// The canonical on-the-wire job contract between admission and worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobEnvelope {
    #[serde(rename = "type")]
    pub job_type: String,
    pub job_id: Uuid,
    pub request_id: String,
    pub user_id: Uuid,
    pub draft_id: Uuid,
    pub generation_id: Uuid,
    pub lane: Lane,
    pub variant_count: i32,
    pub prompt: String,
    pub platform: String,
    pub is_regen: bool,
    pub parent_generation_id: Option<Uuid>,
    pub regen_type: Option<String>,
    pub regen_changes: Option<String>,
    pub user_lease_id: String,
    pub provider_lease_id: String,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
}

impl JobEnvelope {
    pub const JOB_TYPE: &'static str = "generation";

    /// Envelope age, used for the enqueue-to-complete latency buckets.
    pub fn age(&self, now: DateTime<Utc>) -> std::time::Duration {
        (now - self.created_at).to_std().unwrap_or_default()
    }
}

/// Queue bus configuration.
#[derive(Clone)]
pub struct QueueConfig {
    /// Dispatcher variant (qstash, local, mock)
    pub provider: String,
    /// Bus base URL
    pub qstash_url: String,
    /// Bearer token for publishing
    pub qstash_token: String,
    /// Self URL; the worker endpoint is derived from it
    pub app_url: String,
    /// Optional delivery delay in seconds
    pub delay_seconds: Option<u64>,
}

impl std::fmt::Debug for QueueConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueConfig")
            .field("provider", &self.provider)
            .field("qstash_url", &self.qstash_url)
            .field("qstash_token", &"[REDACTED]")
            .field("app_url", &self.app_url)
            .field("delay_seconds", &self.delay_seconds)
            .finish()
    }
}

impl QueueConfig {
    /// Delivery target: the worker ingress on this deployment.
    pub fn worker_url(&self) -> String {
        format!("{}/api/worker/generate", self.app_url.trim_end_matches('/'))
    }
}

/// Dispatcher trait; publishing must succeed before admission returns 202.
#[async_trait::async_trait]
pub trait Dispatcher: Send + Sync {
    /// Publish a job envelope toward the worker endpoint.
    async fn dispatch(&self, envelope: &JobEnvelope) -> Result<(), QueueError>;
}

/// Factory for creating `Dispatcher` implementations.
pub struct DispatcherFactory;

impl DispatcherFactory {
    pub fn create(config: QueueConfig) -> Result<Box<dyn Dispatcher>, QueueError> {
        match config.provider.as_str() {
            "qstash" => {
                tracing::info!("Creating QStash dispatcher");
                if config.qstash_token.is_empty() {
                    return Err(QueueError::Configuration(
                        "QSTASH_TOKEN is required for the qstash dispatcher".to_string(),
                    ));
                }
                Ok(Box::new(QstashDispatcher::new(config)))
            }
            "local" => {
                tracing::info!("Creating local development dispatcher");
                Ok(Box::new(LocalDispatcher::new(config)))
            }
            "mock" => {
                tracing::info!("Creating mock dispatcher");
                Ok(Box::new(MockDispatcher::new()))
            }
            provider => Err(QueueError::Configuration(format!(
                "Unknown dispatcher provider: {}. Supported providers: qstash, local, mock",
                provider
            ))),
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_envelope() -> JobEnvelope {
    JobEnvelope {
        job_type: JobEnvelope::JOB_TYPE.to_string(),
        job_id: Uuid::new_v4(),
        request_id: Uuid::new_v4().to_string(),
        user_id: Uuid::new_v4(),
        draft_id: Uuid::new_v4(),
        generation_id: Uuid::new_v4(),
        lane: Lane::Interactive,
        variant_count: 3,
        prompt: "Write a 30-second hook about coffee brewing".to_string(),
        platform: "tiktok".to_string(),
        is_regen: false,
        parent_generation_id: None,
        regen_type: None,
        regen_changes: None,
        user_lease_id: Uuid::new_v4().to_string(),
        provider_lease_id: Uuid::new_v4().to_string(),
        retry_count: 0,
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_wire_format_is_camel_case() {
        let envelope = sample_envelope();
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["type"], "generation");
        assert!(json.get("jobId").is_some());
        assert!(json.get("requestId").is_some());
        assert!(json.get("userId").is_some());
        assert!(json.get("draftId").is_some());
        assert!(json.get("generationId").is_some());
        assert_eq!(json["lane"], "interactive");
        assert_eq!(json["variantCount"], 3);
        assert_eq!(json["isRegen"], false);
        assert!(json.get("userLeaseId").is_some());
        assert!(json.get("providerLeaseId").is_some());
        assert_eq!(json["retryCount"], 0);
        assert!(json.get("createdAt").is_some());
        // No snake_case leakage
        assert!(json.get("job_id").is_none());
        assert!(json.get("variant_count").is_none());
    }

    #[test]
    fn test_envelope_round_trip() {
        let envelope = sample_envelope();
        let bytes = serde_json::to_vec(&envelope).unwrap();
        let decoded: JobEnvelope = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_worker_url_derivation() {
        let config = QueueConfig {
            provider: "mock".to_string(),
            qstash_url: "https://qstash.upstash.io".to_string(),
            qstash_token: String::new(),
            app_url: "https://app.reelcast.io/".to_string(),
            delay_seconds: None,
        };
        assert_eq!(
            config.worker_url(),
            "https://app.reelcast.io/api/worker/generate"
        );
    }

    #[test]
    fn test_factory_qstash_requires_token() {
        let config = QueueConfig {
            provider: "qstash".to_string(),
            qstash_url: "https://qstash.upstash.io".to_string(),
            qstash_token: String::new(),
            app_url: "https://app.reelcast.io".to_string(),
            delay_seconds: None,
        };
        assert!(DispatcherFactory::create(config).is_err());
    }

    #[test]
    fn test_factory_unknown_provider() {
        let config = QueueConfig {
            provider: "sqs".to_string(),
            qstash_url: String::new(),
            qstash_token: String::new(),
            app_url: String::new(),
            delay_seconds: None,
        };
        let err = match DispatcherFactory::create(config) {
            Err(e) => e,
            Ok(_) => panic!("Expected error for unknown provider"),
        };
        assert!(err.to_string().contains("Unknown dispatcher provider"));
    }

    #[test]
    fn test_config_debug_redacts_token() {
        let config = QueueConfig {
            provider: "qstash".to_string(),
            qstash_url: "https://qstash.upstash.io".to_string(),
            qstash_token: "super-secret".to_string(),
            app_url: "https://app.reelcast.io".to_string(),
            delay_seconds: Some(5),
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
