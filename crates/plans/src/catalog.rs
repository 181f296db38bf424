//! Static plan entitlements and boost-aware plan resolution

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Subscription plan tiers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, Default,
)]
#[sqlx(type_name = "plan_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    #[default]
    Basic,
    Standard,
    Pro,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Basic => "basic",
            Plan::Standard => "standard",
            Plan::Pro => "pro",
        }
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Plan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(Plan::Basic),
            "standard" => Ok(Plan::Standard),
            "pro" => Ok(Plan::Pro),
            other => Err(format!("unknown plan '{}'", other)),
        }
    }
}

/// Entitlements for one plan tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlanLimits {
    /// Monthly generation pool
    pub gens_per_month: i64,
    /// Most variants a single generation may produce
    pub max_variants: i32,
    /// Whether full regeneration is available at all
    pub full_regen_allowed: bool,
    /// Monthly cap on full regenerations; `None` = unbounded
    pub full_regen_monthly_cap: Option<i64>,
    /// In-flight generations allowed per user
    pub user_concurrency: i64,
    /// Hard cap on generator output tokens
    pub max_output_tokens: i64,
    /// Wall-clock budget for one generator invocation
    pub generator_timeout_seconds: u64,
}

const BASIC_LIMITS: PlanLimits = PlanLimits {
    gens_per_month: 60,
    max_variants: 1,
    full_regen_allowed: false,
    full_regen_monthly_cap: Some(0),
    user_concurrency: 1,
    max_output_tokens: 2000,
    generator_timeout_seconds: 30,
};

const STANDARD_LIMITS: PlanLimits = PlanLimits {
    gens_per_month: 300,
    max_variants: 3,
    full_regen_allowed: true,
    full_regen_monthly_cap: Some(10),
    user_concurrency: 2,
    max_output_tokens: 3000,
    generator_timeout_seconds: 45,
};

const PRO_LIMITS: PlanLimits = PlanLimits {
    gens_per_month: 900,
    max_variants: 5,
    full_regen_allowed: true,
    full_regen_monthly_cap: None,
    user_concurrency: 5,
    max_output_tokens: 4000,
    generator_timeout_seconds: 60,
};

/// Entitlement row for a plan tier.
pub fn limits_for(plan: Plan) -> PlanLimits {
    match plan {
        Plan::Basic => BASIC_LIMITS,
        Plan::Standard => STANDARD_LIMITS,
        Plan::Pro => PRO_LIMITS,
    }
}

/// Apply an active boost: while `boost_expires_at > now` the effective plan
/// is `pro` regardless of the base plan.
pub fn resolve_effective_plan(
    base_plan: Plan,
    boost_expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Plan {
    match boost_expires_at {
        Some(expires_at) if expires_at > now => Plan::Pro,
        _ => base_plan,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_entitlement_table() {
        let basic = limits_for(Plan::Basic);
        assert_eq!(basic.gens_per_month, 60);
        assert_eq!(basic.max_variants, 1);
        assert!(!basic.full_regen_allowed);
        assert_eq!(basic.user_concurrency, 1);

        let standard = limits_for(Plan::Standard);
        assert_eq!(standard.gens_per_month, 300);
        assert_eq!(standard.max_variants, 3);
        assert!(standard.full_regen_allowed);
        assert_eq!(standard.full_regen_monthly_cap, Some(10));
        assert_eq!(standard.user_concurrency, 2);

        let pro = limits_for(Plan::Pro);
        assert_eq!(pro.gens_per_month, 900);
        assert_eq!(pro.max_variants, 5);
        assert!(pro.full_regen_allowed);
        assert_eq!(pro.full_regen_monthly_cap, None);
        assert_eq!(pro.user_concurrency, 5);
    }

    #[test]
    fn test_boost_overrides_base_plan() {
        let now = Utc::now();
        let active = Some(now + Duration::days(1));
        assert_eq!(resolve_effective_plan(Plan::Basic, active, now), Plan::Pro);
        assert_eq!(
            resolve_effective_plan(Plan::Standard, active, now),
            Plan::Pro
        );
    }

    #[test]
    fn test_expired_boost_falls_back_to_base() {
        let now = Utc::now();
        let expired = Some(now - Duration::seconds(1));
        assert_eq!(
            resolve_effective_plan(Plan::Basic, expired, now),
            Plan::Basic
        );
        // Exactly-at-expiry is no longer boosted
        assert_eq!(
            resolve_effective_plan(Plan::Standard, Some(now), now),
            Plan::Standard
        );
    }

    #[test]
    fn test_no_boost() {
        let now = Utc::now();
        assert_eq!(resolve_effective_plan(Plan::Pro, None, now), Plan::Pro);
        assert_eq!(resolve_effective_plan(Plan::Basic, None, now), Plan::Basic);
    }

    #[test]
    fn test_plan_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Plan::Basic).unwrap(), "\"basic\"");
        assert_eq!(
            serde_json::from_str::<Plan>("\"standard\"").unwrap(),
            Plan::Standard
        );
    }

    #[test]
    fn test_plan_from_str() {
        assert_eq!("pro".parse::<Plan>().unwrap(), Plan::Pro);
        assert!("enterprise".parse::<Plan>().is_err());
    }
}
