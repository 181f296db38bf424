//! Generation domain entities
//!
//! A `Generation` is one attempt to produce variants for a draft. Variants
//! are written only by the worker and immutable thereafter; the usage ledger
//! is append-only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

use reelcast_common::{Error, Result};

use crate::domain::state::{GenerationEvent, GenerationState, GenerationStateMachine, StateError};

/// Generation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "generation_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl GenerationStatus {
    pub fn is_terminal(&self) -> bool {
        self.to_state().is_terminal()
    }

    pub fn to_state(&self) -> GenerationState {
        match self {
            GenerationStatus::Pending => GenerationState::Pending,
            GenerationStatus::Processing => GenerationState::Processing,
            GenerationStatus::Completed => GenerationState::Completed,
            GenerationStatus::Failed => GenerationState::Failed,
        }
    }

    pub fn from_state(state: GenerationState) -> Self {
        match state {
            GenerationState::Pending => GenerationStatus::Pending,
            GenerationState::Processing => GenerationStatus::Processing,
            GenerationState::Completed => GenerationStatus::Completed,
            GenerationState::Failed => GenerationStatus::Failed,
        }
    }
}

/// Regeneration flavor: apply narrow changes or start over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "regen_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RegenType {
    Targeted,
    Full,
}

impl RegenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegenType::Targeted => "targeted",
            RegenType::Full => "full",
        }
    }
}

/// One attempt to produce variants for a draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Generation {
    pub id: Uuid,
    pub draft_id: Uuid,
    pub owner_id: Uuid,
    pub status: GenerationStatus,
    pub error_message: Option<String>,
    pub idempotency_key: Option<String>,
    pub is_regen: bool,
    pub parent_generation_id: Option<Uuid>,
    pub regen_type: Option<RegenType>,
    pub metadata: Json<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Generation {
    /// Create a new pending generation with validation
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        draft_id: Uuid,
        owner_id: Uuid,
        idempotency_key: Option<String>,
        is_regen: bool,
        parent_generation_id: Option<Uuid>,
        regen_type: Option<RegenType>,
        metadata: serde_json::Value,
    ) -> Result<Self> {
        if is_regen && regen_type.is_none() {
            return Err(Error::Validation(
                "Regenerations must carry a regen type".to_string(),
            ));
        }
        if !is_regen && (regen_type.is_some() || parent_generation_id.is_some()) {
            return Err(Error::Validation(
                "Only regenerations may carry a regen type or parent".to_string(),
            ));
        }

        let now = Utc::now();
        Ok(Generation {
            id: Uuid::new_v4(),
            draft_id,
            owner_id,
            status: GenerationStatus::default(),
            error_message: None,
            idempotency_key,
            is_regen,
            parent_generation_id,
            regen_type,
            metadata: Json(metadata),
            created_at: now,
            updated_at: now,
            completed_at: None,
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Worker picks the generation up
    pub fn start(&mut self) -> Result<()> {
        let new_state = self.apply_transition(GenerationEvent::WorkerPicksUp)?;
        self.status = GenerationStatus::from_state(new_state);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Variants persisted; the generation is complete
    pub fn complete(&mut self) -> Result<()> {
        let new_state = self.apply_transition(GenerationEvent::Success)?;
        self.status = GenerationStatus::from_state(new_state);
        self.completed_at = Some(Utc::now());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Terminal failure with a client-visible message
    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        let new_state = self.apply_transition(GenerationEvent::Failure)?;
        self.status = GenerationStatus::from_state(new_state);
        self.error_message = Some(message.into());
        self.completed_at = Some(Utc::now());
        self.updated_at = Utc::now();
        Ok(())
    }

    fn apply_transition(&self, event: GenerationEvent) -> Result<GenerationState> {
        let current_state = self.status.to_state();
        GenerationStateMachine::transition(current_state, event).map_err(|e| match e {
            StateError::InvalidTransition { from, event } => Error::Validation(format!(
                "Invalid generation transition: cannot apply '{}' event from '{}' state",
                event, from
            )),
            StateError::TerminalState(state) => Error::Validation(format!(
                "Generation is in terminal state '{}' and cannot transition",
                state
            )),
        })
    }

    /// Validate invariants
    pub fn validate(&self) -> Result<()> {
        // Terminal generations carry a completion timestamp
        if self.is_terminal() && self.completed_at.is_none() {
            return Err(Error::Validation(
                "Terminal generations must have completion timestamp".to_string(),
            ));
        }

        // Failed generations carry an error message
        if self.status == GenerationStatus::Failed && self.error_message.is_none() {
            return Err(Error::Validation(
                "Failed generations must have an error message".to_string(),
            ));
        }

        // Regen consistency
        if self.is_regen && self.regen_type.is_none() {
            return Err(Error::Validation(
                "Regenerations must have a regen type".to_string(),
            ));
        }
        if !self.is_regen && self.parent_generation_id.is_some() {
            return Err(Error::Validation(
                "Non-regenerations must not have a parent".to_string(),
            ));
        }

        // The parent pointer forms a forest: a generation never parents itself
        if self.parent_generation_id == Some(self.id) {
            return Err(Error::Validation(
                "Generation cannot be its own parent".to_string(),
            ));
        }

        Ok(())
    }
}

/// One generated content alternative. Written once by the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Variant {
    pub id: Uuid,
    pub generation_id: Uuid,
    pub variant_index: i32,
    pub draft_id: Uuid,
    pub owner_id: Uuid,
    pub content: Json<serde_json::Value>,
    pub video_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Variant {
    pub fn new(
        generation: &Generation,
        variant_index: i32,
        content: serde_json::Value,
    ) -> Result<Self> {
        if variant_index < 1 {
            return Err(Error::Validation(
                "Variant indices start at 1".to_string(),
            ));
        }
        Ok(Variant {
            id: Uuid::new_v4(),
            generation_id: generation.id,
            variant_index,
            draft_id: generation.draft_id,
            owner_id: generation.owner_id,
            content: Json(content),
            video_url: None,
            thumbnail_url: None,
            created_at: Utc::now(),
        })
    }
}

/// Append-only usage record for one completed generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UsageEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub generation_id: Option<Uuid>,
    pub month: String,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
    pub cost_estimate: f64,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

impl UsageEntry {
    pub fn new(
        user_id: Uuid,
        generation_id: Uuid,
        month: String,
        prompt_tokens: i64,
        completion_tokens: i64,
        cost_estimate: f64,
        model: String,
    ) -> Result<Self> {
        let entry = UsageEntry {
            id: Uuid::new_v4(),
            user_id,
            generation_id: Some(generation_id),
            month,
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            cost_estimate,
            model,
            created_at: Utc::now(),
        };
        entry.validate()?;
        Ok(entry)
    }

    /// Validate invariants (mirrors the schema CHECK)
    pub fn validate(&self) -> Result<()> {
        if self.total_tokens != self.prompt_tokens + self.completion_tokens {
            return Err(Error::Validation(
                "Total tokens must equal prompt plus completion tokens".to_string(),
            ));
        }
        if self.prompt_tokens < 0 || self.completion_tokens < 0 {
            return Err(Error::Validation(
                "Token counts cannot be negative".to_string(),
            ));
        }
        if self.cost_estimate < 0.0 {
            return Err(Error::Validation(
                "Cost estimate cannot be negative".to_string(),
            ));
        }

        let month_format = regex::Regex::new(r"^\d{4}-(0[1-9]|1[0-2])$").unwrap();
        if !month_format.is_match(&self.month) {
            return Err(Error::Validation(
                "Month must be YYYY-MM format".to_string(),
            ));
        }
        Ok(())
    }
}
