//! Route definitions for the Drafts domain API

use axum::{
    routing::get,
    Router,
};

use super::handlers::drafts;
use super::middleware::DraftsState;

/// Create all Drafts domain API routes
pub fn routes() -> Router<DraftsState> {
    Router::new()
        .route("/v1/drafts", get(drafts::list_drafts))
        .route(
            "/v1/drafts/{id}",
            get(drafts::get_draft).patch(drafts::update_draft),
        )
}
