//! Repository implementations for the Accounts domain

pub mod boosts;
pub mod subscriptions;
pub mod users;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

pub use boosts::BoostRepository;
pub use subscriptions::SubscriptionRepository;
pub use users::UserRepository;

use crate::domain::entities::EffectiveLimits;
use reelcast_common::Result;

/// Combined repository access for the Accounts domain
#[derive(Clone)]
pub struct AccountsRepositories {
    pool: PgPool,
    pub users: UserRepository,
    pub subscriptions: SubscriptionRepository,
    pub boosts: BoostRepository,
}

impl AccountsRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            users: UserRepository::new(pool.clone()),
            subscriptions: SubscriptionRepository::new(pool.clone()),
            boosts: BoostRepository::new(pool.clone()),
            pool,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Resolve the entitlements applied to `user_id` right now:
    /// active subscription plan (defaulting to basic) plus boost override.
    pub async fn resolve_effective_limits(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<EffectiveLimits> {
        let subscription = self.subscriptions.find_active_for_user(user_id).await?;
        let boost = self.boosts.find_live_for_user(user_id, now).await?;
        Ok(EffectiveLimits::resolve(
            subscription.map(|s| s.plan),
            boost.map(|b| b.expires_at),
            now,
        ))
    }
}
