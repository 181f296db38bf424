//! Repository implementations for the Generations domain

pub mod generations;
pub mod transactions;
pub mod usage;
pub mod variants;

use sqlx::{PgPool, Postgres, Transaction};

pub use generations::GenerationRepository;
pub use usage::UsageRepository;
pub use variants::VariantRepository;

/// Combined repository access for the Generations domain
#[derive(Clone)]
pub struct GenerationsRepositories {
    pool: PgPool,
    pub generations: GenerationRepository,
    pub variants: VariantRepository,
    pub usage: UsageRepository,
}

impl GenerationsRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            generations: GenerationRepository::new(pool.clone()),
            variants: VariantRepository::new(pool.clone()),
            usage: UsageRepository::new(pool.clone()),
            pool,
        }
    }

    /// Begin a new database transaction.
    pub async fn begin(&self) -> std::result::Result<Transaction<'static, Postgres>, sqlx::Error> {
        self.pool.begin().await
    }

    /// Get a reference to the underlying database pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
