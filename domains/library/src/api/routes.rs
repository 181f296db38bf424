//! Route definitions for the Library domain API

use axum::{routing::get, Router};

use super::handlers::assets;
use super::middleware::LibraryState;

/// Create all Library domain API routes
pub fn routes() -> Router<LibraryState> {
    Router::new().route(
        "/v1/library/assets",
        get(assets::list_assets).post(assets::save_asset),
    )
}
