//! Local development dispatcher
//!
//! Delivers the envelope straight to this deployment's worker endpoint with
//! the `X-Local-Dev` marker so signature verification is skipped. Delivery
//! runs in a background task: a synchronous wait would hold the admission
//! request open for the full generation.

use crate::{Dispatcher, JobEnvelope, QueueConfig, QueueError, LOCAL_DEV_HEADER};

pub struct LocalDispatcher {
    http: reqwest::Client,
    worker_url: String,
}

impl LocalDispatcher {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            worker_url: config.worker_url(),
        }
    }
}

#[async_trait::async_trait]
impl Dispatcher for LocalDispatcher {
    async fn dispatch(&self, envelope: &JobEnvelope) -> Result<(), QueueError> {
        let http = self.http.clone();
        let worker_url = self.worker_url.clone();
        let envelope = envelope.clone();

        tokio::spawn(async move {
            let result = http
                .post(&worker_url)
                .header(LOCAL_DEV_HEADER, "true")
                .header("Upstash-Retries", envelope.lane.retries().to_string())
                .json(&envelope)
                .send()
                .await;

            match result {
                Ok(response) if !response.status().is_success() => {
                    tracing::warn!(
                        job_id = %envelope.job_id,
                        status = %response.status(),
                        "Local worker delivery returned an error status"
                    );
                }
                Ok(_) => {
                    tracing::debug!(job_id = %envelope.job_id, "Local worker delivery completed");
                }
                Err(e) => {
                    tracing::error!(
                        job_id = %envelope.job_id,
                        error = %e,
                        "Local worker delivery failed"
                    );
                }
            }
        });

        Ok(())
    }
}
