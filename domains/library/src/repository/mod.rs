//! Repository implementations for the Library domain

pub mod assets;

use sqlx::PgPool;

pub use assets::AssetRepository;

/// Combined repository access for the Library domain
#[derive(Clone)]
pub struct LibraryRepositories {
    pool: PgPool,
    pub assets: AssetRepository,
}

impl LibraryRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            assets: AssetRepository::new(pool.clone()),
            pool,
        }
    }

    /// Get a reference to the underlying database pool (for CQRS cross-domain queries).
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
