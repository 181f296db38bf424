//! Asset repository

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entities::Asset;
use reelcast_common::Result;

pub(crate) const ASSET_COLUMNS: &str = "id, owner_id, draft_id, variant_id, title, content, platform, tags, status, created_at, updated_at";

#[derive(Clone)]
pub struct AssetRepository {
    pool: PgPool,
}

impl AssetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Persist a new asset
    pub async fn create(&self, asset: &Asset) -> Result<Asset> {
        let query = format!(
            "INSERT INTO assets ({ASSET_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING {ASSET_COLUMNS}"
        );
        let row = sqlx::query_as::<_, Asset>(&query)
            .bind(asset.id)
            .bind(asset.owner_id)
            .bind(asset.draft_id)
            .bind(asset.variant_id)
            .bind(&asset.title)
            .bind(&asset.content)
            .bind(asset.platform)
            .bind(&asset.tags)
            .bind(asset.status)
            .bind(asset.created_at)
            .bind(asset.updated_at)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    /// List a user's assets with keyset pagination on `(created_at, id)`.
    pub async fn list_for_owner(
        &self,
        owner_id: Uuid,
        after: Option<(DateTime<Utc>, Uuid)>,
        limit: i64,
    ) -> Result<Vec<Asset>> {
        let mut query = format!(
            "SELECT {ASSET_COLUMNS} FROM assets \
             WHERE owner_id = $1 AND status != 'archived'"
        );
        if after.is_some() {
            query.push_str(" AND (created_at, id) < ($3, $4)");
        }
        query.push_str(" ORDER BY created_at DESC, id DESC LIMIT $2");

        let rows = if let Some((created_at, id)) = after {
            sqlx::query_as::<_, Asset>(&query)
                .bind(owner_id)
                .bind(limit)
                .bind(created_at)
                .bind(id)
                .fetch_all(&self.pool)
                .await?
        } else {
            sqlx::query_as::<_, Asset>(&query)
                .bind(owner_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
        };
        Ok(rows)
    }
}
