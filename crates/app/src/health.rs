//! Health probe
//!
//! Reports a component check map: the relational store, the key/value store,
//! and whether the queue bus is configured. Any failing component turns the
//! probe 503.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use sqlx::PgPool;

use reelcast_limits::LimitEnforcer;

#[derive(Clone)]
pub struct HealthState {
    pub pool: PgPool,
    pub enforcer: LimitEnforcer,
    pub queue_configured: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentCheck {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    pub components: HealthComponents,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthComponents {
    pub database: ComponentCheck,
    pub kv_store: ComponentCheck,
    pub queue: ComponentCheck,
}

/// `GET /api/health`
pub async fn health_check(
    State(state): State<HealthState>,
) -> (StatusCode, Json<HealthResponse>) {
    let database = match sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.pool)
        .await
    {
        Ok(_) => ComponentCheck {
            healthy: true,
            detail: None,
        },
        Err(e) => ComponentCheck {
            healthy: false,
            detail: Some(e.to_string()),
        },
    };

    let kv_store = match state.enforcer.ping().await {
        Ok(()) => ComponentCheck {
            healthy: true,
            detail: None,
        },
        Err(e) => ComponentCheck {
            healthy: false,
            detail: Some(e.to_string()),
        },
    };

    let queue = ComponentCheck {
        healthy: state.queue_configured,
        detail: (!state.queue_configured).then(|| "queue credentials missing".to_string()),
    };

    let healthy = database.healthy && kv_store.healthy && queue.healthy;
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            healthy,
            components: HealthComponents {
                database,
                kv_store,
                queue,
            },
        }),
    )
}
