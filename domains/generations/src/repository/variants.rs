//! Variant repository

use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entities::Variant;
use reelcast_common::Result;

pub(crate) const VARIANT_COLUMNS: &str = "id, generation_id, variant_index, draft_id, owner_id, content, video_url, thumbnail_url, created_at";

#[derive(Clone)]
pub struct VariantRepository {
    pool: PgPool,
}

impl VariantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Variants for one generation, in index order.
    pub async fn list_for_generation(&self, generation_id: Uuid) -> Result<Vec<Variant>> {
        let query = format!(
            "SELECT {VARIANT_COLUMNS} FROM variants \
             WHERE generation_id = $1 ORDER BY variant_index"
        );
        let rows = sqlx::query_as::<_, Variant>(&query)
            .bind(generation_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Find a variant by its surrogate id.
    pub async fn find(&self, id: Uuid) -> Result<Option<Variant>> {
        let query = format!("SELECT {VARIANT_COLUMNS} FROM variants WHERE id = $1");
        let row = sqlx::query_as::<_, Variant>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }
}
