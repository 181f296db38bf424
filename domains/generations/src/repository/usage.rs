//! Usage ledger repository

use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entities::UsageEntry;
use reelcast_common::Result;

pub(crate) const USAGE_COLUMNS: &str = "id, user_id, generation_id, month, prompt_tokens, completion_tokens, total_tokens, cost_estimate, model, created_at";

#[derive(Clone)]
pub struct UsageRepository {
    pool: PgPool,
}

impl UsageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The ledger row for a completed generation, if written.
    pub async fn find_by_generation(&self, generation_id: Uuid) -> Result<Option<UsageEntry>> {
        let query = format!("SELECT {USAGE_COLUMNS} FROM usage_ledger WHERE generation_id = $1");
        let row = sqlx::query_as::<_, UsageEntry>(&query)
            .bind(generation_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// A user's ledger rows for one month, newest first.
    pub async fn list_for_month(&self, user_id: Uuid, month: &str) -> Result<Vec<UsageEntry>> {
        let query = format!(
            "SELECT {USAGE_COLUMNS} FROM usage_ledger \
             WHERE user_id = $1 AND month = $2 ORDER BY created_at DESC"
        );
        let rows = sqlx::query_as::<_, UsageEntry>(&query)
            .bind(user_id)
            .bind(month)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}
