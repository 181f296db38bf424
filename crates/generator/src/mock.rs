//! Mock generator with programmable behavior
//!
//! Tests (and local development without provider credentials) configure the
//! outcome; every task is recorded for assertions.

use std::sync::{Arc, Mutex, RwLock};

use crate::{
    GenerationOutput, GenerationTask, Generator, GeneratorError, TokenUsage, VariantContent,
    VariantMetadata,
};

/// What the mock should produce.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum MockBehavior {
    /// Return `variant_count` canned variants
    #[default]
    Succeed,
    /// Succeed but report this many output tokens (cap testing)
    SucceedWithOutputTokens(i64),
    /// Transient: provider rate limit
    RateLimited,
    /// Transient: upstream 5xx
    Upstream,
    /// Transient: network failure
    Network,
    /// Permanent: rejected request
    Validation,
    /// Permanent: provider disabled sentinel
    Disabled,
    /// Permanent: unusable output even after repair
    InvalidOutput,
}

/// A recorded generation task for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedTask {
    pub prompt: String,
    pub platform: String,
    pub variant_count: i32,
    pub model: String,
    pub is_regen: bool,
}

#[derive(Default)]
pub struct MockGenerator {
    behavior: RwLock<MockBehavior>,
    history: Arc<Mutex<Vec<RecordedTask>>>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_behavior(&self, behavior: MockBehavior) {
        *self.behavior.write().unwrap() = behavior;
    }

    pub fn recorded_tasks(&self) -> Vec<RecordedTask> {
        self.history.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Generator for MockGenerator {
    async fn generate(&self, task: &GenerationTask) -> Result<GenerationOutput, GeneratorError> {
        self.history.lock().unwrap().push(RecordedTask {
            prompt: task.prompt.clone(),
            platform: task.platform.clone(),
            variant_count: task.variant_count,
            model: task.model.clone(),
            is_regen: task.is_regen,
        });

        let behavior = self.behavior.read().unwrap().clone();
        let succeed = |output_tokens: i64| {
            let variants = (1..=task.variant_count)
                .map(|i| VariantContent {
                    text: format!("Mock variant {} for: {}", i, task.platform),
                    hashtags: vec!["#mock".to_string()],
                    metadata: VariantMetadata {
                        hook: format!("hook {}", i),
                        benefit: "benefit".to_string(),
                        cta: "follow for more".to_string(),
                    },
                })
                .collect();
            Ok(GenerationOutput {
                variants,
                model: task.model.clone(),
                usage: TokenUsage {
                    input_tokens: 120,
                    output_tokens,
                },
            })
        };

        match behavior {
            MockBehavior::Succeed => succeed(400),
            MockBehavior::SucceedWithOutputTokens(tokens) => succeed(tokens),
            MockBehavior::RateLimited => Err(GeneratorError::RateLimited),
            MockBehavior::Upstream => Err(GeneratorError::Upstream("mock 502".to_string())),
            MockBehavior::Network => Err(GeneratorError::Network("mock reset".to_string())),
            MockBehavior::Validation => {
                Err(GeneratorError::Validation("mock rejection".to_string()))
            }
            MockBehavior::Disabled => Err(GeneratorError::Disabled),
            MockBehavior::InvalidOutput => {
                Err(GeneratorError::InvalidOutput("mock bad json".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelcast_plans::Lane;

    fn task() -> GenerationTask {
        GenerationTask {
            prompt: "Explain pour-over coffee".to_string(),
            platform: "youtube_shorts".to_string(),
            variant_count: 2,
            lane: Lane::Interactive,
            is_regen: false,
            regen_type: None,
            regen_changes: None,
            model: "gpt-4o-mini".to_string(),
            max_output_tokens: 2000,
        }
    }

    #[tokio::test]
    async fn test_mock_succeeds_with_requested_count() {
        let generator = MockGenerator::new();
        let output = generator.generate(&task()).await.unwrap();
        assert_eq!(output.variants.len(), 2);
        assert!(output.usage.output_tokens > 0);

        let recorded = generator.recorded_tasks();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].platform, "youtube_shorts");
    }

    #[tokio::test]
    async fn test_mock_programmable_failures() {
        let generator = MockGenerator::new();

        generator.set_behavior(MockBehavior::RateLimited);
        assert!(matches!(
            generator.generate(&task()).await.unwrap_err(),
            GeneratorError::RateLimited
        ));

        generator.set_behavior(MockBehavior::Validation);
        assert!(matches!(
            generator.generate(&task()).await.unwrap_err(),
            GeneratorError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn test_mock_output_token_override() {
        let generator = MockGenerator::new();
        generator.set_behavior(MockBehavior::SucceedWithOutputTokens(9999));
        let output = generator.generate(&task()).await.unwrap();
        assert_eq!(output.usage.output_tokens, 9999);
    }
}
