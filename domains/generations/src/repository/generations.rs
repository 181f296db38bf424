//! Generation repository

use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entities::Generation;
use reelcast_common::Result;

/// All columns in the generations table, used for SELECT and RETURNING clauses.
pub(crate) const GENERATION_COLUMNS: &str = "id, draft_id, owner_id, status, error_message, idempotency_key, is_regen, parent_generation_id, regen_type, metadata, created_at, updated_at, completed_at";

#[derive(Clone)]
pub struct GenerationRepository {
    pool: PgPool,
}

impl GenerationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find generation by ID
    pub async fn find(&self, id: Uuid) -> Result<Option<Generation>> {
        let query = format!("SELECT {GENERATION_COLUMNS} FROM generations WHERE id = $1");
        let row = sqlx::query_as::<_, Generation>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Find a generation by idempotency key for a specific owner
    pub async fn find_by_idempotency_key(
        &self,
        owner_id: Uuid,
        key: &str,
    ) -> Result<Option<Generation>> {
        let query = format!(
            "SELECT {GENERATION_COLUMNS} FROM generations \
             WHERE owner_id = $1 AND idempotency_key = $2"
        );
        let row = sqlx::query_as::<_, Generation>(&query)
            .bind(owner_id)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Most recent generation for a draft; the parent of a regeneration.
    /// Ordering by `(created_at, id)` keeps the parent strictly earlier in
    /// creation order, so parent pointers cannot form a cycle.
    pub async fn latest_for_draft(&self, draft_id: Uuid) -> Result<Option<Generation>> {
        let query = format!(
            "SELECT {GENERATION_COLUMNS} FROM generations \
             WHERE draft_id = $1 ORDER BY created_at DESC, id DESC LIMIT 1"
        );
        let row = sqlx::query_as::<_, Generation>(&query)
            .bind(draft_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Guarded transition to `processing`. Returns false when the row was
    /// not pending (re-delivery of an in-flight or finished job).
    pub async fn mark_processing(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE generations SET status = 'processing', updated_at = NOW() \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Guarded terminal failure. Never demotes a completed generation.
    pub async fn mark_failed(&self, id: Uuid, message: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE generations SET status = 'failed', error_message = $2, \
                completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status IN ('pending', 'processing')",
        )
        .bind(id)
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a generation (admission rollback when dispatch fails and the
    /// row should not survive). The draft stays.
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM generations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
