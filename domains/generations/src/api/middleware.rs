//! Generations domain state and auth integration

use axum::extract::FromRef;
use std::sync::Arc;

use reelcast_accounts::AccountsRepositories;
use reelcast_auth::TokenVerifier;
use reelcast_common::{Environment, Metrics};
use reelcast_drafts::DraftsRepositories;
use reelcast_generator::ProviderRegistry;
use reelcast_limits::LimitEnforcer;
use reelcast_queue::Dispatcher;

use crate::GenerationsRepositories;

/// Queue-delivery signing keys; the next key covers rotation.
#[derive(Clone)]
pub struct SigningKeys {
    pub current: String,
    pub next: String,
}

impl std::fmt::Debug for SigningKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeys")
            .field("current", &"[REDACTED]")
            .field("next", &"[REDACTED]")
            .finish()
    }
}

/// Application state for the Generations domain
#[derive(Clone)]
pub struct GenerationsState {
    pub repos: GenerationsRepositories,
    pub drafts: DraftsRepositories,
    pub accounts: AccountsRepositories,
    pub enforcer: LimitEnforcer,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub generators: ProviderRegistry,
    pub metrics: Arc<Metrics>,
    pub verifier: TokenVerifier,
    pub environment: Environment,
    pub signing_keys: SigningKeys,
}

impl FromRef<GenerationsState> for TokenVerifier {
    fn from_ref(state: &GenerationsState) -> Self {
        state.verifier.clone()
    }
}
