//! Boost repository

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entities::Boost;
use reelcast_common::Result;

const BOOST_COLUMNS: &str = "id, user_id, expires_at, is_active";

#[derive(Clone)]
pub struct BoostRepository {
    pool: PgPool,
}

impl BoostRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The live boost for a user: active flag set and not yet expired.
    /// The schema enforces at most one active boost per user.
    pub async fn find_live_for_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Boost>> {
        let query = format!(
            "SELECT {BOOST_COLUMNS} FROM boosts \
             WHERE user_id = $1 AND is_active AND expires_at > $2 \
             ORDER BY expires_at DESC LIMIT 1"
        );
        let row = sqlx::query_as::<_, Boost>(&query)
            .bind(user_id)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }
}
