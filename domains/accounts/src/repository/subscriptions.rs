//! Subscription repository

use crate::domain::entities::Subscription;
use reelcast_common::Result;
use sqlx::PgPool;
use uuid::Uuid;

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, plan, status, period_start, period_end";

#[derive(Clone)]
pub struct SubscriptionRepository {
    pool: PgPool,
}

impl SubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The single active subscription for a user, if any.
    pub async fn find_active_for_user(&self, user_id: Uuid) -> Result<Option<Subscription>> {
        let query = format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions \
             WHERE user_id = $1 AND status = 'active' \
             ORDER BY period_end DESC LIMIT 1"
        );
        let row = sqlx::query_as::<_, Subscription>(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }
}
