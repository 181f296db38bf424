//! Axum extractors for authentication
//!
//! Generic over any state `S` where `TokenVerifier: FromRef<S>`; this is axum's
//! idiomatic nested-state pattern.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::error::AuthError;
use crate::token::{extract_bearer_token, Principal, TokenVerifier};

/// Authenticated caller extractor.
#[derive(Debug)]
pub struct CurrentUser(pub Principal);

impl<S> FromRequestParts<S> for CurrentUser
where
    TokenVerifier: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let verifier = TokenVerifier::from_ref(state);

        let header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingAuthorization)?
            .to_str()
            .map_err(|_| AuthError::MalformedHeader)?;

        let token = extract_bearer_token(header)?;
        let principal = verifier.verify(token)?;

        Ok(CurrentUser(principal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use chrono::Duration;
    use uuid::Uuid;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[derive(Clone)]
    struct TestState {
        verifier: TokenVerifier,
    }

    impl FromRef<TestState> for TokenVerifier {
        fn from_ref(state: &TestState) -> Self {
            state.verifier.clone()
        }
    }

    fn state() -> TestState {
        TestState {
            verifier: TokenVerifier::new(SECRET),
        }
    }

    #[tokio::test]
    async fn test_extracts_principal_from_bearer_token() {
        let state = state();
        let user_id = Uuid::new_v4();
        let token = state.verifier.issue(user_id, Duration::hours(1));

        let request = Request::builder()
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();

        let CurrentUser(principal) = CurrentUser::from_request_parts(&mut parts, &state)
            .await
            .unwrap();
        assert_eq!(principal.user_id, user_id);
    }

    #[tokio::test]
    async fn test_missing_header_rejected() {
        let request = Request::builder().body(()).unwrap();
        let (mut parts, _) = request.into_parts();

        let result = CurrentUser::from_request_parts(&mut parts, &state()).await;
        assert!(matches!(result, Err(AuthError::MissingAuthorization)));
    }

    #[tokio::test]
    async fn test_garbage_token_rejected() {
        let request = Request::builder()
            .header(AUTHORIZATION, "Bearer not.a.token")
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();

        let result = CurrentUser::from_request_parts(&mut parts, &state()).await;
        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }
}
