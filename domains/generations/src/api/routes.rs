//! Route definitions for the Generations domain API

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{admission, generations, worker};
use super::middleware::GenerationsState;

/// Create all Generations domain API routes
pub fn routes() -> Router<GenerationsState> {
    Router::new()
        .route("/v1/create", post(admission::create_generation))
        .route("/v1/regenerate", post(admission::regenerate))
        .route("/v1/generations/{id}", get(generations::get_generation))
        .route("/api/worker/generate", post(worker::process_delivery))
}
