//! Provider routing
//!
//! Which concrete provider and model serves a request is a pure function of
//! `(plan, action)`. The admission pipeline uses the route to key the
//! provider semaphore; the worker uses it to pick the client.

use serde::{Deserialize, Serialize};

use crate::catalog::Plan;

/// Concrete generator backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openai" => Ok(ProviderKind::OpenAi),
            "anthropic" => Ok(ProviderKind::Anthropic),
            other => Err(format!("unknown provider '{}'", other)),
        }
    }
}

/// Logical priority class for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Lane {
    #[default]
    Interactive,
    Batch,
}

impl Lane {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lane::Interactive => "interactive",
            Lane::Batch => "batch",
        }
    }

    /// Bus retry attempts configured per lane.
    pub fn retries(&self) -> u32 {
        match self {
            Lane::Interactive => 3,
            Lane::Batch => 1,
        }
    }
}

impl std::fmt::Display for Lane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the user asked for, as far as routing cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    Create,
    TargetedRegen,
    FullRegen,
}

/// Resolved route for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderRoute {
    pub provider: ProviderKind,
    pub model: &'static str,
    pub lane: Lane,
}

/// Pick the provider and model for `(plan, action)`.
///
/// Pro traffic (and full regenerations, which are pro/standard-only) goes to
/// the strongest model; basic create traffic takes the cheapest one.
pub fn route(plan: Plan, action: ActionType) -> ProviderRoute {
    let (provider, model) = match (plan, action) {
        (Plan::Pro, _) | (_, ActionType::FullRegen) => {
            (ProviderKind::Anthropic, "claude-sonnet-4")
        }
        (Plan::Standard, _) => (ProviderKind::OpenAi, "gpt-4o"),
        (Plan::Basic, _) => (ProviderKind::OpenAi, "gpt-4o-mini"),
    };
    ProviderRoute {
        provider,
        model,
        lane: Lane::Interactive,
    }
}
