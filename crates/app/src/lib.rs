//! Reelcast application composition root
//!
//! Wires configuration into concrete backends (database pool, limit store,
//! dispatcher, generator registry), builds the per-domain states, and
//! composes the domain routers into one application.

pub mod health;

use axum::{middleware, routing::get, Extension, Json, Router};
use sqlx::PgPool;
use std::sync::Arc;

use reelcast_accounts::AccountsRepositories;
use reelcast_auth::TokenVerifier;
use reelcast_common::{request_id_middleware, Config, Metrics};
use reelcast_drafts::{DraftsRepositories, DraftsState};
use reelcast_generations::api::middleware::SigningKeys;
use reelcast_generations::{GenerationsRepositories, GenerationsState};
use reelcast_generator::{GeneratorConfig, GeneratorFactory};
use reelcast_library::{LibraryRepositories, LibraryState};
use reelcast_limits::{LimitEnforcer, LimitStoreFactory, LimitsConfig};
use reelcast_queue::{DispatcherFactory, QueueConfig};

/// Create the main application router with all routes and middleware
pub async fn create_app(config: Config, pool: PgPool) -> Result<Router, anyhow::Error> {
    // Limit store + enforcement facade
    let limit_store = LimitStoreFactory::create(&config.limit_store, &config.redis_url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create limit store: {}", e))?;
    let enforcer = LimitEnforcer::new(limit_store, LimitsConfig::default());

    // Queue dispatcher
    let queue_config = QueueConfig {
        provider: config.dispatcher.clone(),
        qstash_url: config.qstash_url.clone(),
        qstash_token: config.qstash_token.clone(),
        app_url: config.app_url.clone(),
        delay_seconds: None,
    };
    let dispatcher = DispatcherFactory::create(queue_config)
        .map_err(|e| anyhow::anyhow!("Failed to create dispatcher: {}", e))?;

    // Generator registry; no credentials at all means the mock backs
    // development
    let generator_provider =
        if config.openai_api_key.is_empty() && config.anthropic_api_key.is_empty() {
            "mock".to_string()
        } else {
            "providers".to_string()
        };
    let generators = GeneratorFactory::create(GeneratorConfig {
        provider: generator_provider,
        openai_api_key: config.openai_api_key.clone(),
        anthropic_api_key: config.anthropic_api_key.clone(),
        openai_base_url: None,
        anthropic_base_url: None,
    })
    .map_err(|e| anyhow::anyhow!("Failed to create generator registry: {}", e))?;

    // Shared infrastructure
    let verifier = TokenVerifier::new(&config.auth_secret);
    let metrics = Arc::new(Metrics::new());

    // Repositories
    let accounts_repos = AccountsRepositories::new(pool.clone());
    let drafts_repos = DraftsRepositories::new(pool.clone());
    let generations_repos = GenerationsRepositories::new(pool.clone());
    let library_repos = LibraryRepositories::new(pool.clone());

    // Per-domain states
    let generations_state = GenerationsState {
        repos: generations_repos,
        drafts: drafts_repos.clone(),
        accounts: accounts_repos,
        enforcer: enforcer.clone(),
        dispatcher: Arc::from(dispatcher),
        generators,
        metrics: metrics.clone(),
        verifier: verifier.clone(),
        environment: config.environment,
        signing_keys: SigningKeys {
            current: config.qstash_current_signing_key.clone(),
            next: config.qstash_next_signing_key.clone(),
        },
    };
    let drafts_state = DraftsState {
        repos: drafts_repos,
        verifier: verifier.clone(),
    };
    let library_state = LibraryState {
        repos: library_repos,
        verifier,
    };

    let health_state = health::HealthState {
        pool,
        enforcer,
        queue_configured: config.dispatcher != "qstash" || !config.qstash_token.is_empty(),
    };

    // Build router — compose domain routers with shared infrastructure routes
    let app = Router::new()
        .route("/api/health", get(health::health_check))
        .with_state(health_state)
        .route(
            "/internal/metrics",
            get(|Extension(metrics): Extension<Arc<Metrics>>| async move {
                Json(metrics.snapshot())
            }),
        )
        .merge(reelcast_generations::routes().with_state(generations_state))
        .merge(reelcast_drafts::routes().with_state(drafts_state))
        .merge(reelcast_library::routes().with_state(library_state))
        .layer(Extension(metrics))
        .layer(middleware::from_fn(request_id_middleware));

    Ok(app)
}
