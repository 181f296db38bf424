//! Account domain entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use reelcast_plans::{limits_for, resolve_effective_plan, Plan, PlanLimits};

/// Owning root for everything else; cascade-deletes its children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "subscription_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    #[default]
    Active,
    Canceled,
    PastDue,
}

/// One active subscription per user drives default entitlements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan: Plan,
    pub status: SubscriptionStatus,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}

/// Additive upgrade: while unexpired, the effective plan becomes `pro`
/// regardless of the base plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Boost {
    pub id: Uuid,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
}

impl Boost {
    /// An active boost that has not yet expired.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at > now
    }
}

/// The entitlements actually applied to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveLimits {
    pub base_plan: Plan,
    pub effective_plan: Plan,
    pub limits: PlanLimits,
}

impl EffectiveLimits {
    /// Resolve from the base plan and an optional boost expiry. A user with
    /// no subscription row gets the free floor (`basic`).
    pub fn resolve(
        base_plan: Option<Plan>,
        boost_expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        let base_plan = base_plan.unwrap_or(Plan::Basic);
        let effective_plan = resolve_effective_plan(base_plan, boost_expires_at, now);
        Self {
            base_plan,
            effective_plan,
            limits: limits_for(effective_plan),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_boost_liveness() {
        let now = Utc::now();
        let boost = Boost {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            expires_at: now + Duration::days(1),
            is_active: true,
        };
        assert!(boost.is_live(now));

        let inactive = Boost {
            is_active: false,
            ..boost.clone()
        };
        assert!(!inactive.is_live(now));

        let expired = Boost {
            expires_at: now - Duration::seconds(1),
            ..boost
        };
        assert!(!expired.is_live(now));
    }

    #[test]
    fn test_effective_limits_boost_override() {
        let now = Utc::now();
        let boosted =
            EffectiveLimits::resolve(Some(Plan::Basic), Some(now + Duration::days(1)), now);
        assert_eq!(boosted.base_plan, Plan::Basic);
        assert_eq!(boosted.effective_plan, Plan::Pro);
        assert_eq!(boosted.limits.max_variants, 5);
    }

    #[test]
    fn test_effective_limits_expired_boost() {
        let now = Utc::now();
        let resolved =
            EffectiveLimits::resolve(Some(Plan::Standard), Some(now - Duration::hours(1)), now);
        assert_eq!(resolved.effective_plan, Plan::Standard);
        assert_eq!(resolved.limits.gens_per_month, 300);
    }

    #[test]
    fn test_missing_subscription_defaults_to_basic() {
        let now = Utc::now();
        let resolved = EffectiveLimits::resolve(None, None, now);
        assert_eq!(resolved.base_plan, Plan::Basic);
        assert_eq!(resolved.effective_plan, Plan::Basic);
        assert_eq!(resolved.limits.gens_per_month, 60);
    }
}
