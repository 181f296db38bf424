//! Draft management API handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json as SqlJson;
use uuid::Uuid;
use validator::Validate;

use reelcast_auth::CurrentUser;
use reelcast_common::{Error, PageCursor, Result, ValidatedJson};

use crate::api::middleware::DraftsState;
use crate::domain::entities::{Draft, Platform};

/// Draft response DTO
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftResponse {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: Option<String>,
    pub prompt: String,
    pub platform: Platform,
    pub settings: serde_json::Value,
    pub selected_variant_id: Option<Uuid>,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Draft> for DraftResponse {
    fn from(d: Draft) -> Self {
        Self {
            id: d.id,
            owner_id: d.owner_id,
            title: d.title,
            prompt: d.prompt,
            platform: d.platform,
            settings: d.settings.0,
            selected_variant_id: d.selected_variant_id,
            is_archived: d.is_archived,
            created_at: d.created_at,
            updated_at: d.updated_at,
        }
    }
}

/// Query parameters for listing drafts
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDraftsParams {
    pub cursor: Option<String>,
    pub limit: Option<i64>,
    pub include_archived: Option<bool>,
}

/// Paginated draft listing
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftListResponse {
    pub items: Vec<DraftResponse>,
    pub next_cursor: Option<String>,
}

/// Request body for updating a draft. Absent fields are left untouched.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDraftRequest {
    #[validate(length(max = 200, message = "must be at most 200 characters"))]
    pub title: Option<String>,
    pub settings: Option<serde_json::Value>,
    pub selected_variant_id: Option<Uuid>,
    pub is_archived: Option<bool>,
}

/// Lightweight variant read model for the selected-variant check
#[derive(Debug, sqlx::FromRow)]
struct VariantRef {
    draft_id: Uuid,
}

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

/// List the authenticated user's drafts (cursor pagination)
pub async fn list_drafts(
    CurrentUser(principal): CurrentUser,
    State(state): State<DraftsState>,
    Query(params): Query<ListDraftsParams>,
) -> Result<Json<DraftListResponse>> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let after = params
        .cursor
        .as_deref()
        .map(PageCursor::decode)
        .transpose()?
        .map(|c| (c.created_at, c.id));

    let drafts = state
        .repos
        .drafts
        .list_for_owner(
            principal.user_id,
            after,
            limit + 1,
            params.include_archived.unwrap_or(false),
        )
        .await?;

    let next_cursor = if drafts.len() as i64 > limit {
        drafts
            .get(limit as usize - 1)
            .map(|d| PageCursor::new(d.id, d.created_at).encode())
    } else {
        None
    };
    let items: Vec<DraftResponse> = drafts
        .into_iter()
        .take(limit as usize)
        .map(Into::into)
        .collect();

    Ok(Json(DraftListResponse { items, next_cursor }))
}

/// Get a single draft (owner-only)
pub async fn get_draft(
    CurrentUser(principal): CurrentUser,
    State(state): State<DraftsState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DraftResponse>> {
    let draft = load_owned_draft(&state, id, principal.user_id).await?;
    Ok(Json(draft.into()))
}

/// Mutate a draft (owner-only)
pub async fn update_draft(
    CurrentUser(principal): CurrentUser,
    State(state): State<DraftsState>,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateDraftRequest>,
) -> Result<Json<DraftResponse>> {
    let mut draft = load_owned_draft(&state, id, principal.user_id).await?;

    if let Some(title) = req.title {
        draft.title = Some(title);
    }
    if let Some(settings) = req.settings {
        draft.settings = SqlJson(settings);
    }
    if let Some(is_archived) = req.is_archived {
        draft.is_archived = is_archived;
    }
    if let Some(variant_id) = req.selected_variant_id {
        // CQRS read: the selected variant must belong to this draft
        let variant = sqlx::query_as::<_, VariantRef>(
            "SELECT draft_id FROM variants WHERE id = $1",
        )
        .bind(variant_id)
        .fetch_optional(state.repos.pool())
        .await?
        .ok_or_else(|| Error::Validation("Selected variant does not exist".to_string()))?;

        if variant.draft_id != draft.id {
            return Err(Error::Validation(
                "Selected variant belongs to a different draft".to_string(),
            ));
        }
        draft.selected_variant_id = Some(variant_id);
    }

    let updated = state.repos.drafts.update(&draft).await?;
    Ok(Json(updated.into()))
}

/// Load a draft and enforce ownership. Non-owners get the same 404 as a
/// missing draft so draft ids are not probeable.
async fn load_owned_draft(state: &DraftsState, id: Uuid, user_id: Uuid) -> Result<Draft> {
    let draft = state
        .repos
        .drafts
        .find(id)
        .await?
        .ok_or_else(|| Error::NotFound("Draft not found".to_string()))?;
    if !draft.is_owned_by(user_id) {
        return Err(Error::NotFound("Draft not found".to_string()));
    }
    Ok(draft)
}
