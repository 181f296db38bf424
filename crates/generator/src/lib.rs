//! Generator capability
//!
//! The core treats content generation as a black box: hand it a task, get
//! back variants plus token usage, or a typed error whose transience decides
//! whether the queue retries. Concrete providers (Anthropic, OpenAI) are
//! selected by the pure routing function in `reelcast-plans`; a programmable
//! mock backs tests and development.

pub mod anthropic;
pub mod mock;
pub mod openai;
pub mod prompt;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use reelcast_plans::{Lane, ProviderKind};

pub use anthropic::AnthropicGenerator;
pub use mock::{MockBehavior, MockGenerator};
pub use openai::OpenAiGenerator;

#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("Provider rate limited the request")]
    RateLimited,

    #[error("Provider error: {0}")]
    Upstream(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Generation timed out")]
    Timeout,

    #[error("Provider returned unusable output: {0}")]
    InvalidOutput(String),

    #[error("Invalid generation request: {0}")]
    Validation(String),

    #[error("Generator is disabled")]
    Disabled,
}

impl GeneratorError {
    /// Transient failures are worth a queue retry; permanent ones are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GeneratorError::RateLimited
                | GeneratorError::Upstream(_)
                | GeneratorError::Network(_)
                | GeneratorError::Timeout
        )
    }
}

/// One unit of work handed to a provider.
#[derive(Debug, Clone)]
pub struct GenerationTask {
    pub prompt: String,
    pub platform: String,
    pub variant_count: i32,
    pub lane: Lane,
    pub is_regen: bool,
    pub regen_type: Option<String>,
    pub regen_changes: Option<String>,
    pub model: String,
    pub max_output_tokens: i64,
}

/// Structured metadata each variant carries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct VariantMetadata {
    #[serde(default)]
    pub hook: String,
    #[serde(default)]
    pub benefit: String,
    #[serde(default)]
    pub cta: String,
}

/// One generated content alternative.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VariantContent {
    pub text: String,
    #[serde(default)]
    pub hashtags: Vec<String>,
    #[serde(default)]
    pub metadata: VariantMetadata,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
}

impl TokenUsage {
    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// Successful generation result.
#[derive(Debug, Clone)]
pub struct GenerationOutput {
    pub variants: Vec<VariantContent>,
    pub model: String,
    pub usage: TokenUsage,
}

/// The capability the worker invokes.
#[async_trait::async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, task: &GenerationTask) -> Result<GenerationOutput, GeneratorError>;
}

/// Stand-in for a provider with no configured credentials. Always fails
/// permanently so the queue does not retry into a wall.
pub struct DisabledGenerator;

#[async_trait::async_trait]
impl Generator for DisabledGenerator {
    async fn generate(&self, _task: &GenerationTask) -> Result<GenerationOutput, GeneratorError> {
        Err(GeneratorError::Disabled)
    }
}

/// Generator configuration.
#[derive(Clone)]
pub struct GeneratorConfig {
    /// Provider selection (providers, mock)
    pub provider: String,
    pub openai_api_key: String,
    pub anthropic_api_key: String,
    pub openai_base_url: Option<String>,
    pub anthropic_base_url: Option<String>,
}

impl std::fmt::Debug for GeneratorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratorConfig")
            .field("provider", &self.provider)
            .field("openai_api_key", &"[REDACTED]")
            .field("anthropic_api_key", &"[REDACTED]")
            .field("openai_base_url", &self.openai_base_url)
            .field("anthropic_base_url", &self.anthropic_base_url)
            .finish()
    }
}

/// Resolves a routed provider to a concrete client.
#[derive(Clone)]
pub struct ProviderRegistry {
    openai: Arc<dyn Generator>,
    anthropic: Arc<dyn Generator>,
}

impl ProviderRegistry {
    pub fn new(openai: Arc<dyn Generator>, anthropic: Arc<dyn Generator>) -> Self {
        Self { openai, anthropic }
    }

    pub fn for_provider(&self, provider: ProviderKind) -> Arc<dyn Generator> {
        match provider {
            ProviderKind::OpenAi => self.openai.clone(),
            ProviderKind::Anthropic => self.anthropic.clone(),
        }
    }
}

/// Factory for building the provider registry from configuration.
pub struct GeneratorFactory;

impl GeneratorFactory {
    pub fn create(config: GeneratorConfig) -> Result<ProviderRegistry, GeneratorError> {
        match config.provider.as_str() {
            "providers" => {
                let openai: Arc<dyn Generator> = if config.openai_api_key.is_empty() {
                    tracing::warn!("OPENAI_API_KEY not set; openai routes are disabled");
                    Arc::new(DisabledGenerator)
                } else {
                    Arc::new(OpenAiGenerator::new(
                        config.openai_api_key.clone(),
                        config.openai_base_url.clone(),
                    ))
                };
                let anthropic: Arc<dyn Generator> = if config.anthropic_api_key.is_empty() {
                    tracing::warn!("ANTHROPIC_API_KEY not set; anthropic routes are disabled");
                    Arc::new(DisabledGenerator)
                } else {
                    Arc::new(AnthropicGenerator::new(
                        config.anthropic_api_key.clone(),
                        config.anthropic_base_url.clone(),
                    ))
                };
                Ok(ProviderRegistry::new(openai, anthropic))
            }
            "mock" => {
                tracing::info!("Creating mock generator registry");
                let mock: Arc<dyn Generator> = Arc::new(MockGenerator::new());
                Ok(ProviderRegistry::new(mock.clone(), mock))
            }
            provider => Err(GeneratorError::Validation(format!(
                "Unknown generator provider: {}. Supported providers: providers, mock",
                provider
            ))),
        }
    }
}
