//! Authentication error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingAuthorization,

    #[error("Malformed Authorization header")]
    MalformedHeader,

    #[error("Invalid or expired token")]
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "success": false,
            "error": {
                "code": "UNAUTHORIZED",
                "message": self.to_string(),
            }
        }));
        (StatusCode::UNAUTHORIZED, body).into_response()
    }
}
