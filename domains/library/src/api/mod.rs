pub mod handlers;
pub mod middleware;
pub mod routes;

pub use middleware::LibraryState;
pub use routes::routes;
