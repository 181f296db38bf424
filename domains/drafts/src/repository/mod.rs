//! Repository implementations for the Drafts domain

pub mod drafts;
pub mod transactions;

use sqlx::{PgPool, Postgres, Transaction};

pub use drafts::DraftRepository;

/// Combined repository access for the Drafts domain
#[derive(Clone)]
pub struct DraftsRepositories {
    pool: PgPool,
    pub drafts: DraftRepository,
}

impl DraftsRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            drafts: DraftRepository::new(pool.clone()),
            pool,
        }
    }

    /// Begin a new database transaction.
    pub async fn begin(&self) -> std::result::Result<Transaction<'static, Postgres>, sqlx::Error> {
        self.pool.begin().await
    }

    /// Get a reference to the underlying database pool (for CQRS cross-domain queries).
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
