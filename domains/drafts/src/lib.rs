//! Drafts domain: logical pieces of content and their owner-facing surface

pub mod api;
pub mod domain;
pub mod repository;

// Re-export domain types at the crate root for convenience
pub use domain::entities::*;

// Re-export repository types
pub use repository::DraftsRepositories;

// Re-export API types
pub use api::routes;
pub use api::DraftsState;
