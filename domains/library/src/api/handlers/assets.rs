//! Library asset API handlers

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use reelcast_auth::CurrentUser;
use reelcast_common::{Error, PageCursor, Result, ValidatedJson};
use reelcast_drafts::Platform;

use crate::api::middleware::LibraryState;
use crate::domain::entities::{Asset, AssetStatus};

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetResponse {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub draft_id: Option<Uuid>,
    pub variant_id: Option<Uuid>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub platform: Option<Platform>,
    pub tags: Vec<String>,
    pub status: AssetStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Asset> for AssetResponse {
    fn from(a: Asset) -> Self {
        Self {
            id: a.id,
            owner_id: a.owner_id,
            draft_id: a.draft_id,
            variant_id: a.variant_id,
            title: a.title,
            content: a.content,
            platform: a.platform,
            tags: a.tags,
            status: a.status,
            created_at: a.created_at,
            updated_at: a.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SaveAssetRequest {
    pub draft_id: Option<Uuid>,
    pub variant_id: Option<Uuid>,
    #[validate(length(max = 200, message = "must be at most 200 characters"))]
    pub title: Option<String>,
    #[validate(length(max = 10000, message = "must be at most 10000 characters"))]
    pub content: Option<String>,
    pub platform: Option<Platform>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListAssetsParams {
    pub cursor: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetListResponse {
    pub items: Vec<AssetResponse>,
    pub next_cursor: Option<String>,
}

/// Lightweight variant read model for the source-variant check
#[derive(Debug, sqlx::FromRow)]
struct VariantRef {
    owner_id: Uuid,
    draft_id: Uuid,
}

/// `POST /v1/library/assets`: save an asset.
pub async fn save_asset(
    CurrentUser(principal): CurrentUser,
    State(state): State<LibraryState>,
    ValidatedJson(req): ValidatedJson<SaveAssetRequest>,
) -> Result<(StatusCode, Json<AssetResponse>)> {
    let mut draft_id = req.draft_id;

    // CQRS read: a source variant must exist and belong to the caller
    if let Some(variant_id) = req.variant_id {
        let variant = sqlx::query_as::<_, VariantRef>(
            "SELECT owner_id, draft_id FROM variants WHERE id = $1",
        )
        .bind(variant_id)
        .fetch_optional(state.repos.pool())
        .await?
        .ok_or_else(|| Error::NotFound("Variant not found".to_string()))?;

        if variant.owner_id != principal.user_id {
            return Err(Error::NotFound("Variant not found".to_string()));
        }
        draft_id = draft_id.or(Some(variant.draft_id));
    }

    let asset = Asset::new(
        principal.user_id,
        draft_id,
        req.variant_id,
        req.title,
        req.content,
        req.platform,
        req.tags,
    )?;
    let created = state.repos.assets.create(&asset).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

/// `GET /v1/library/assets`: list the caller's assets, newest first,
/// with an opaque cursor.
pub async fn list_assets(
    CurrentUser(principal): CurrentUser,
    State(state): State<LibraryState>,
    Query(params): Query<ListAssetsParams>,
) -> Result<Json<AssetListResponse>> {
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

    let assets = state
        .repos
        .assets
        .list_for_owner(principal.user_id, after, limit + 1)
        .await?;

    let next_cursor = if assets.len() as i64 > limit {
        assets
            .get(limit as usize - 1)
            .map(|a| PageCursor::new(a.id, a.created_at).encode())
    } else {
        None
    };
    let items: Vec<AssetResponse> = assets
        .into_iter()
        .take(limit as usize)
        .map(Into::into)
        .collect();

    Ok(Json(AssetListResponse { items, next_cursor }))
}
