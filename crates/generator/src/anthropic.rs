//! Anthropic Messages API client
//!
//! Calls `POST {base}/v1/messages` and parses the text block into variants,
//! with the one-shot repair step on unusable output.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::prompt::{self, Attempt};
use crate::{GenerationOutput, GenerationTask, Generator, GeneratorError, TokenUsage};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<MessageBody>,
}

#[derive(Debug, Serialize)]
struct MessageBody {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: i64,
    output_tokens: i64,
}

pub struct AnthropicGenerator {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AnthropicGenerator {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    async fn complete(
        &self,
        task: &GenerationTask,
        user_content: String,
    ) -> Result<(String, TokenUsage), GeneratorError> {
        let body = MessagesRequest {
            model: task.model.clone(),
            max_tokens: task.max_output_tokens.clamp(1, u32::MAX as i64) as u32,
            system: prompt::system_prompt(task),
            messages: vec![MessageBody {
                role: "user".to_string(),
                content: user_content,
            }],
        };

        let url = format!("{}/v1/messages", self.base_url);
        tracing::debug!(model = %task.model, "Sending Anthropic API request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| GeneratorError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(GeneratorError::RateLimited);
        }
        if status.is_server_error() {
            return Err(GeneratorError::Upstream(format!(
                "Anthropic API returned {}",
                status
            )));
        }
        if !status.is_success() {
            let detail = response
                .text()
                .await
                .unwrap_or_else(|_| "no response body".to_string());
            return Err(GeneratorError::Validation(format!(
                "Anthropic API rejected the request ({}): {}",
                status, detail
            )));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| GeneratorError::Upstream(format!("unreadable response: {}", e)))?;

        let text = parsed
            .content
            .iter()
            .filter(|block| block.content_type == "text")
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        Ok((
            text,
            TokenUsage {
                input_tokens: parsed.usage.input_tokens,
                output_tokens: parsed.usage.output_tokens,
            },
        ))
    }
}

#[async_trait::async_trait]
impl Generator for AnthropicGenerator {
    async fn generate(&self, task: &GenerationTask) -> Result<GenerationOutput, GeneratorError> {
        let mut usage = TokenUsage::default();
        let mut attempt = Attempt::Try;
        let mut previous = String::new();

        loop {
            let content = match attempt {
                Attempt::Try => prompt::user_prompt(task),
                Attempt::Repair => prompt::repair_prompt(&previous),
            };
            let (text, step_usage) = self.complete(task, content).await?;
            usage.add(step_usage);

            match prompt::parse_variants(&text, task.variant_count) {
                Ok(variants) => {
                    return Ok(GenerationOutput {
                        variants,
                        model: task.model.clone(),
                        usage,
                    });
                }
                Err(reason) => match attempt {
                    Attempt::Try => {
                        tracing::warn!(model = %task.model, %reason, "Unusable output, attempting repair");
                        previous = text;
                        attempt = Attempt::Repair;
                    }
                    Attempt::Repair => {
                        return Err(GeneratorError::InvalidOutput(reason));
                    }
                },
            }
        }
    }
}
