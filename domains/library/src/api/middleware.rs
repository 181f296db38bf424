//! Library domain state and auth integration

use axum::extract::FromRef;
use reelcast_auth::TokenVerifier;

use crate::LibraryRepositories;

/// Application state for the Library domain
#[derive(Clone)]
pub struct LibraryState {
    pub repos: LibraryRepositories,
    pub verifier: TokenVerifier,
}

impl FromRef<LibraryState> for TokenVerifier {
    fn from_ref(state: &LibraryState) -> Self {
        state.verifier.clone()
    }
}
