//! OpenAI Chat Completions client
//!
//! Same shape as the Anthropic client: strict-JSON request, shared parser,
//! one repair attempt on unusable output.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::prompt::{self, Attempt};
use crate::{GenerationOutput, GenerationTask, Generator, GeneratorError, TokenUsage};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: i64,
    completion_tokens: i64,
}

pub struct OpenAiGenerator {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiGenerator {
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
        let body = ChatRequest {
            model: task.model.clone(),
            max_tokens: task.max_output_tokens.clamp(1, u32::MAX as i64) as u32,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: prompt::system_prompt(task),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_content,
                },
            ],
        };

        let url = format!("{}/v1/chat/completions", self.base_url);
        tracing::debug!(model = %task.model, "Sending OpenAI API request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
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
                "OpenAI API returned {}",
                status
            )));
        }
        if !status.is_success() {
            let detail = response
                .text()
                .await
                .unwrap_or_else(|_| "no response body".to_string());
            return Err(GeneratorError::Validation(format!(
                "OpenAI API rejected the request ({}): {}",
                status, detail
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GeneratorError::Upstream(format!("unreadable response: {}", e)))?;

        let text = parsed
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        Ok((
            text,
            TokenUsage {
                input_tokens: parsed.usage.prompt_tokens,
                output_tokens: parsed.usage.completion_tokens,
            },
        ))
    }
}

#[async_trait::async_trait]
impl Generator for OpenAiGenerator {
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
