//! Drafts domain state and auth integration

use axum::extract::FromRef;
use reelcast_auth::TokenVerifier;

use crate::DraftsRepositories;

/// Application state for the Drafts domain
#[derive(Clone)]
pub struct DraftsState {
    pub repos: DraftsRepositories,
    pub verifier: TokenVerifier,
}

impl FromRef<DraftsState> for TokenVerifier {
    fn from_ref(state: &DraftsState) -> Self {
        state.verifier.clone()
    }
}
