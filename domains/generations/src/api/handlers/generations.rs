//! Generation polling API handler

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use reelcast_auth::CurrentUser;
use reelcast_common::{Error, Result};

use crate::api::middleware::GenerationsState;
use crate::domain::entities::{Generation, GenerationStatus, RegenType, Variant};

/// Hint clients how often to poll while the job is still pending.
const SUGGESTED_POLL_INTERVAL_MS: i64 = 2000;
const ESTIMATED_WAIT_MS: i64 = 15000;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantResponse {
    pub id: Uuid,
    pub variant_index: i32,
    pub content: serde_json::Value,
    pub video_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Variant> for VariantResponse {
    fn from(v: Variant) -> Self {
        Self {
            id: v.id,
            variant_index: v.variant_index,
            content: v.content.0,
            video_url: v.video_url,
            thumbnail_url: v.thumbnail_url,
            created_at: v.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollingHints {
    pub suggested_interval_ms: i64,
    pub estimated_wait_ms: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationDetailResponse {
    pub id: Uuid,
    pub draft_id: Uuid,
    pub status: GenerationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub is_regen: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regen_type: Option<RegenType>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variants: Option<Vec<VariantResponse>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polling: Option<PollingHints>,
}

/// `GET /v1/generations/{id}`: poll a generation's status.
pub async fn get_generation(
    CurrentUser(principal): CurrentUser,
    State(state): State<GenerationsState>,
    Path(id): Path<Uuid>,
) -> Result<Json<GenerationDetailResponse>> {
    let generation = state
        .repos
        .generations
        .find(id)
        .await?
        .ok_or_else(|| Error::NotFound("Generation not found".to_string()))?;

    // Non-owners get the same 404 as a missing id
    if generation.owner_id != principal.user_id {
        return Err(Error::NotFound("Generation not found".to_string()));
    }

    let variants = match generation.status {
        GenerationStatus::Processing | GenerationStatus::Completed => {
            let rows = state.repos.variants.list_for_generation(generation.id).await?;
            if rows.is_empty() {
                None
            } else {
                Some(rows.into_iter().map(Into::into).collect())
            }
        }
        _ => None,
    };

    let polling = matches!(generation.status, GenerationStatus::Pending).then(|| PollingHints {
        suggested_interval_ms: SUGGESTED_POLL_INTERVAL_MS,
        estimated_wait_ms: ESTIMATED_WAIT_MS,
    });

    Ok(Json(to_detail(generation, variants, polling)))
}

fn to_detail(
    generation: Generation,
    variants: Option<Vec<VariantResponse>>,
    polling: Option<PollingHints>,
) -> GenerationDetailResponse {
    GenerationDetailResponse {
        id: generation.id,
        draft_id: generation.draft_id,
        status: generation.status,
        error_message: generation.error_message,
        is_regen: generation.is_regen,
        regen_type: generation.regen_type,
        created_at: generation.created_at,
        completed_at: generation.completed_at,
        variants,
        polling,
    }
}
