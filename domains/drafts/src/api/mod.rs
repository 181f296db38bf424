pub mod handlers;
pub mod middleware;
pub mod routes;

pub use middleware::DraftsState;
pub use routes::routes;
