//! QStash publish client
//!
//! POSTs the job envelope to `{base}/v2/publish/{worker_url}`; the bus
//! signs the body and delivers it to the worker endpoint with the configured
//! retry policy.

use crate::{Dispatcher, JobEnvelope, QueueConfig, QueueError};

pub struct QstashDispatcher {
    http: reqwest::Client,
    config: QueueConfig,
}

impl QstashDispatcher {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn publish_url(&self) -> String {
        format!(
            "{}/v2/publish/{}",
            self.config.qstash_url.trim_end_matches('/'),
            self.config.worker_url()
        )
    }
}

#[async_trait::async_trait]
impl Dispatcher for QstashDispatcher {
    async fn dispatch(&self, envelope: &JobEnvelope) -> Result<(), QueueError> {
        let mut request = self
            .http
            .post(self.publish_url())
            .bearer_auth(&self.config.qstash_token)
            .header("Upstash-Retries", envelope.lane.retries().to_string())
            .json(envelope);

        if let Some(delay) = self.config.delay_seconds {
            request = request.header("Upstash-Delay", format!("{}s", delay));
        }

        let response = request
            .send()
            .await
            .map_err(|e| QueueError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read response body".to_string());
            return Err(QueueError::Response(format!(
                "QStash publish returned {}: {}",
                status, body
            )));
        }

        tracing::debug!(
            job_id = %envelope.job_id,
            generation_id = %envelope.generation_id,
            lane = %envelope.lane,
            "Job published to queue"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_url_embeds_worker_target() {
        let dispatcher = QstashDispatcher::new(QueueConfig {
            provider: "qstash".to_string(),
            qstash_url: "https://qstash.upstash.io/".to_string(),
            qstash_token: "token".to_string(),
            app_url: "https://app.reelcast.io".to_string(),
            delay_seconds: None,
        });
        assert_eq!(
            dispatcher.publish_url(),
            "https://qstash.upstash.io/v2/publish/https://app.reelcast.io/api/worker/generate"
        );
    }
}
