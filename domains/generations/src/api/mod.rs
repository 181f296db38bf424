pub mod handlers;
pub mod middleware;
pub mod routes;

pub use middleware::GenerationsState;
pub use routes::routes;
