//! Accounts domain: users, subscriptions, boosts, effective-plan resolution

pub mod domain;
pub mod repository;

// Re-export domain types at the crate root for convenience
pub use domain::entities::*;

// Re-export repository types
pub use repository::AccountsRepositories;
