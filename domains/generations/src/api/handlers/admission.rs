//! Admission pipeline: create and regenerate
//!
//! Both handlers run the same ordered gauntlet: idempotency fast path, plan
//! resolution, monthly pool, hourly burst, user and provider leases, durable
//! insert, queue dispatch. Every failure after a side effect was acquired
//! rolls that side effect back before the error leaves the handler; on
//! success, the leases travel in the envelope and the worker owns their
//! release.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use reelcast_auth::CurrentUser;
use reelcast_common::{
    timewin, Error, Lifecycle, RejectionKind, RequestContext, Result, ValidatedJson,
};
use reelcast_drafts::repository::transactions::create_draft_tx;
use reelcast_drafts::{Draft, Platform};
use reelcast_limits::{LeaseDecision, LimitEnforcer, LimitsError};
use reelcast_plans::{route, ActionType, ProviderRoute};
use reelcast_queue::JobEnvelope;

use crate::api::middleware::GenerationsState;
use crate::domain::entities::{Generation, RegenType};
use crate::repository::transactions::create_generation_tx;

/// Static wait hint handed back with a 202.
const ESTIMATED_WAIT_SECONDS: i64 = 15;

const SCOPE_CREATE: &str = "create";
const SCOPE_REGEN: &str = "regen";

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateGenerationRequest {
    #[validate(length(min = 10, max = 5000, message = "must be 10-5000 characters"))]
    pub prompt: String,
    pub platform: Platform,
    #[validate(length(max = 200, message = "must be at most 200 characters"))]
    pub title: Option<String>,
    #[validate(range(min = 1, max = 5, message = "must be between 1 and 5"))]
    pub variant_count: Option<i32>,
    #[validate(length(min = 16, max = 128, message = "must be 16-128 characters"))]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegenerateRequest {
    pub draft_id: Uuid,
    pub regen_type: Option<RegenType>,
    #[validate(length(min = 1, max = 2000, message = "must be 1-2000 characters"))]
    pub changes: Option<String>,
    #[validate(range(min = 1, max = 5, message = "must be between 1 and 5"))]
    pub variant_count: Option<i32>,
    #[validate(length(min = 16, max = 128, message = "must be 16-128 characters"))]
    pub idempotency_key: Option<String>,
}

/// Side effects acquired so far, undone in reverse on failure. `run` clears
/// as it goes, so a handler may invoke it early (duplicate-key unwind) and
/// the outer wrapper's second call is a no-op.
struct AdmissionRollback {
    enforcer: LimitEnforcer,
    user_id: Uuid,
    now: DateTime<Utc>,
    monthly: bool,
    hourly: bool,
    full_regen: bool,
    cooldown_draft: Option<Uuid>,
    user_lease: Option<String>,
    provider_lease: Option<(ProviderRoute, String)>,
}

impl AdmissionRollback {
    fn new(enforcer: LimitEnforcer, user_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            enforcer,
            user_id,
            now,
            monthly: false,
            hourly: false,
            full_regen: false,
            cooldown_draft: None,
            user_lease: None,
            provider_lease: None,
        }
    }

    /// The dispatched job now owns the leases; nothing left to undo.
    fn disarm(&mut self) {
        self.monthly = false;
        self.hourly = false;
        self.full_regen = false;
        self.cooldown_draft = None;
        self.user_lease = None;
        self.provider_lease = None;
    }

    async fn run(&mut self) {
        if let Some((route, lease_id)) = self.provider_lease.take() {
            if let Err(e) = self
                .enforcer
                .release_provider_lease(
                    route.provider.as_str(),
                    route.model,
                    route.lane.as_str(),
                    &lease_id,
                )
                .await
            {
                tracing::warn!(error = %e, "Rollback failed to release provider lease");
            }
        }
        if let Some(lease_id) = self.user_lease.take() {
            if let Err(e) = self.enforcer.release_user_lease(self.user_id, &lease_id).await {
                tracing::warn!(error = %e, "Rollback failed to release user lease");
            }
        }
        if self.hourly {
            self.hourly = false;
            if let Err(e) = self.enforcer.rollback_hourly_burst(self.user_id, self.now).await {
                tracing::warn!(error = %e, "Rollback failed to decrement hourly counter");
            }
        }
        if self.monthly {
            self.monthly = false;
            if let Err(e) = self.enforcer.rollback_monthly_pool(self.user_id, self.now).await {
                tracing::warn!(error = %e, "Rollback failed to decrement monthly counter");
            }
        }
        if self.full_regen {
            self.full_regen = false;
            if let Err(e) = self
                .enforcer
                .rollback_full_regen_cap(self.user_id, self.now)
                .await
            {
                tracing::warn!(error = %e, "Rollback failed to decrement full-regen counter");
            }
        }
        if let Some(draft_id) = self.cooldown_draft.take() {
            if let Err(e) = self
                .enforcer
                .clear_regen_cooldown(self.user_id, draft_id)
                .await
            {
                tracing::warn!(error = %e, "Rollback failed to clear regen cooldown");
            }
        }
    }
}

fn kv_err(e: LimitsError) -> Error {
    Error::KvStore(e.to_string())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

fn duplicate_body(generation: &Generation) -> serde_json::Value {
    json!({
        "duplicated": true,
        "draftId": generation.draft_id,
        "generationId": generation.id,
        "status": generation.status,
    })
}

fn accepted_body(generation: &Generation) -> serde_json::Value {
    let mut body = json!({
        "draftId": generation.draft_id,
        "generationId": generation.id,
        "status": generation.status,
        "estimatedWait": ESTIMATED_WAIT_SECONDS,
    });
    if let Some(regen_type) = generation.regen_type {
        body["regenType"] = json!(regen_type);
    }
    body
}

/// Idempotency fast path: the KV mapping first, then the durable row. Either
/// hit returns the original identifiers without consuming any quota.
async fn find_duplicate(
    state: &GenerationsState,
    user_id: Uuid,
    scope: &str,
    key: &str,
) -> Result<Option<Generation>> {
    if let Some(mapping) = state
        .enforcer
        .lookup_idempotency(user_id, scope, key)
        .await
        .map_err(kv_err)?
    {
        if let Some(generation_id) = mapping
            .get("generationId")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<Uuid>().ok())
        {
            if let Some(generation) = state.repos.generations.find(generation_id).await? {
                return Ok(Some(generation));
            }
        }
    }
    Ok(state
        .repos
        .generations
        .find_by_idempotency_key(user_id, key)
        .await?)
}

/// `POST /v1/create`: admit a new generation.
pub async fn create_generation(
    CurrentUser(principal): CurrentUser,
    State(state): State<GenerationsState>,
    ctx: RequestContext,
    ValidatedJson(req): ValidatedJson<CreateGenerationRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    let now = Utc::now();
    let mut rollback = AdmissionRollback::new(state.enforcer.clone(), principal.user_id, now);
    match create_inner(&state, principal.user_id, &ctx, req, &mut rollback, now).await {
        Ok(response) => Ok(response),
        Err(err) => {
            rollback.run().await;
            Err(err)
        }
    }
}

async fn create_inner(
    state: &GenerationsState,
    user_id: Uuid,
    ctx: &RequestContext,
    req: CreateGenerationRequest,
    rollback: &mut AdmissionRollback,
    now: DateTime<Utc>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    // Idempotency fast path: replays return the original identifiers
    if let Some(ref key) = req.idempotency_key {
        if let Some(existing) = find_duplicate(state, user_id, SCOPE_CREATE, key).await? {
            return Ok((StatusCode::OK, Json(duplicate_body(&existing))));
        }
    }

    // Resolve effective entitlements (subscription + boost)
    let effective = state.accounts.resolve_effective_limits(user_id, now).await?;
    let variant_count = req.variant_count.unwrap_or(1);
    if variant_count > effective.limits.max_variants {
        return Err(Error::Forbidden(format!(
            "Your plan allows at most {} variants per generation",
            effective.limits.max_variants
        )));
    }

    // Monthly pool
    let monthly = state
        .enforcer
        .enforce_monthly_pool(user_id, effective.limits.gens_per_month, now)
        .await
        .map_err(kv_err)?;
    if !monthly.allowed {
        state.metrics.record_rejection(RejectionKind::Monthly);
        return Err(Error::QuotaExceeded(format!(
            "Monthly generation limit of {} reached",
            effective.limits.gens_per_month
        )));
    }
    rollback.monthly = true;

    // Hourly burst
    let hourly = state
        .enforcer
        .enforce_hourly_burst(user_id, now)
        .await
        .map_err(kv_err)?;
    if !hourly.allowed {
        state.metrics.record_rejection(RejectionKind::Hourly);
        return Err(Error::RateLimited {
            message: "Hourly generation limit reached, slow down".to_string(),
            retry_after_seconds: timewin::seconds_until_hour_end(now),
        });
    }
    rollback.hourly = true;

    // Concurrency leases; the worker releases them
    let provider_route = route(effective.effective_plan, ActionType::Create);
    let (user_lease, provider_lease) =
        acquire_leases(state, user_id, &effective, provider_route, ctx, rollback).await?;

    // Durable insert: draft + generation in one transaction
    let draft = Draft::new(
        user_id,
        req.title.clone(),
        req.prompt.clone(),
        req.platform,
        None,
    )?;
    let metadata = json!({
        "variantCount": variant_count,
        "requestId": ctx.request_id,
        "provider": provider_route.provider.as_str(),
        "model": provider_route.model,
        "lane": provider_route.lane.as_str(),
    });
    let generation = Generation::new(
        draft.id,
        user_id,
        req.idempotency_key.clone(),
        false,
        None,
        None,
        metadata,
    )?;

    let mut tx = state.repos.begin().await.map_err(Error::Database)?;
    create_draft_tx(&mut tx, &draft).await.map_err(Error::Database)?;
    let created = match create_generation_tx(&mut tx, &generation).await {
        Ok(row) => row,
        Err(e) if is_unique_violation(&e) => {
            // Lost the race on the idempotency key: unwind and answer with
            // the winner's identifiers
            drop(tx);
            rollback.run().await;
            let key = req.idempotency_key.as_deref().unwrap_or_default();
            let existing = state
                .repos
                .generations
                .find_by_idempotency_key(user_id, key)
                .await?
                .ok_or_else(|| {
                    // The key exists but belongs to someone else's row
                    Error::IdempotencyConflict(
                        "Idempotency key already used with a different request".to_string(),
                    )
                })?;
            return Ok((StatusCode::OK, Json(duplicate_body(&existing))));
        }
        Err(e) => return Err(Error::Database(e)),
    };
    tx.commit().await.map_err(Error::Database)?;

    // Record the idempotency mapping for the fast path
    if let Some(ref key) = req.idempotency_key {
        record_idempotency(state, user_id, SCOPE_CREATE, key, &created).await;
    }

    // Dispatch; on failure the generation dies and everything unwinds
    let envelope = build_envelope(
        &created,
        &req.prompt,
        req.platform,
        variant_count,
        provider_route,
        &user_lease,
        &provider_lease,
        ctx,
        None,
    );
    dispatch_or_fail(state, &created, &envelope).await?;
    rollback.disarm();

    state.metrics.record_lifecycle(Lifecycle::Queued);
    tracing::info!(
        generation_id = %created.id,
        job_id = %envelope.job_id,
        request_id = %ctx.request_id,
        "generation queued"
    );
    Ok((StatusCode::ACCEPTED, Json(accepted_body(&created))))
}

/// `POST /v1/regenerate`: admit a regeneration of an existing draft.
pub async fn regenerate(
    CurrentUser(principal): CurrentUser,
    State(state): State<GenerationsState>,
    ctx: RequestContext,
    ValidatedJson(req): ValidatedJson<RegenerateRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    let now = Utc::now();
    let mut rollback = AdmissionRollback::new(state.enforcer.clone(), principal.user_id, now);
    match regenerate_inner(&state, principal.user_id, &ctx, req, &mut rollback, now).await {
        Ok(response) => Ok(response),
        Err(err) => {
            rollback.run().await;
            Err(err)
        }
    }
}

async fn regenerate_inner(
    state: &GenerationsState,
    user_id: Uuid,
    ctx: &RequestContext,
    req: RegenerateRequest,
    rollback: &mut AdmissionRollback,
    now: DateTime<Utc>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    let regen_type = req.regen_type.unwrap_or(RegenType::Targeted);
    if regen_type == RegenType::Targeted && req.changes.is_none() {
        return Err(Error::Validation(
            "changes: required for targeted regeneration".to_string(),
        ));
    }

    // Idempotency fast path
    if let Some(ref key) = req.idempotency_key {
        if let Some(existing) = find_duplicate(state, user_id, SCOPE_REGEN, key).await? {
            return Ok((StatusCode::OK, Json(duplicate_body(&existing))));
        }
    }

    let effective = state.accounts.resolve_effective_limits(user_id, now).await?;
    let variant_count = req.variant_count.unwrap_or(1);
    if variant_count > effective.limits.max_variants {
        return Err(Error::Forbidden(format!(
            "Your plan allows at most {} variants per generation",
            effective.limits.max_variants
        )));
    }

    // Ownership: only the draft's owner may regenerate it
    let draft = state
        .drafts
        .drafts
        .find(req.draft_id)
        .await?
        .ok_or_else(|| Error::NotFound("Draft not found".to_string()))?;
    if !draft.is_owned_by(user_id) {
        return Err(Error::Forbidden(
            "You do not own this draft".to_string(),
        ));
    }

    // Per-draft cooldown
    let cooldown = state
        .enforcer
        .check_and_set_regen_cooldown(user_id, draft.id)
        .await
        .map_err(kv_err)?;
    if !cooldown.set {
        state.metrics.record_rejection(RejectionKind::RegenCooldown);
        return Err(Error::RateLimited {
            message: format!(
                "Please wait {} seconds before regenerating this draft again",
                cooldown.ttl_remaining_seconds
            ),
            retry_after_seconds: cooldown.ttl_remaining_seconds,
        });
    }
    rollback.cooldown_draft = Some(draft.id);

    // Plan gating for full regeneration
    if regen_type == RegenType::Full {
        if !effective.limits.full_regen_allowed {
            return Err(Error::Forbidden(
                "Full regeneration is not available on your plan".to_string(),
            ));
        }
        if let Some(cap) = effective.limits.full_regen_monthly_cap {
            let full_regen = state
                .enforcer
                .enforce_full_regen_cap(user_id, cap, now)
                .await
                .map_err(kv_err)?;
            if !full_regen.allowed {
                state.metrics.record_rejection(RejectionKind::FullRegenCap);
                return Err(Error::QuotaExceeded(format!(
                    "Monthly full-regeneration limit of {} reached",
                    cap
                )));
            }
            rollback.full_regen = true;
        }
    }

    // Monthly pool
    let monthly = state
        .enforcer
        .enforce_monthly_pool(user_id, effective.limits.gens_per_month, now)
        .await
        .map_err(kv_err)?;
    if !monthly.allowed {
        state.metrics.record_rejection(RejectionKind::Monthly);
        return Err(Error::QuotaExceeded(format!(
            "Monthly generation limit of {} reached",
            effective.limits.gens_per_month
        )));
    }
    rollback.monthly = true;

    // Hourly burst
    let hourly = state
        .enforcer
        .enforce_hourly_burst(user_id, now)
        .await
        .map_err(kv_err)?;
    if !hourly.allowed {
        state.metrics.record_rejection(RejectionKind::Hourly);
        return Err(Error::RateLimited {
            message: "Hourly generation limit reached, slow down".to_string(),
            retry_after_seconds: timewin::seconds_until_hour_end(now),
        });
    }
    rollback.hourly = true;

    // Concurrency leases
    let action = match regen_type {
        RegenType::Targeted => ActionType::TargetedRegen,
        RegenType::Full => ActionType::FullRegen,
    };
    let provider_route = route(effective.effective_plan, action);
    let (user_lease, provider_lease) =
        acquire_leases(state, user_id, &effective, provider_route, ctx, rollback).await?;

    // Durable insert; the parent is the draft's most recent generation
    let parent = state
        .repos
        .generations
        .latest_for_draft(draft.id)
        .await?
        .map(|g| g.id);
    let metadata = json!({
        "variantCount": variant_count,
        "requestId": ctx.request_id,
        "provider": provider_route.provider.as_str(),
        "model": provider_route.model,
        "lane": provider_route.lane.as_str(),
    });
    let generation = Generation::new(
        draft.id,
        user_id,
        req.idempotency_key.clone(),
        true,
        parent,
        Some(regen_type),
        metadata,
    )?;

    let mut tx = state.repos.begin().await.map_err(Error::Database)?;
    let created = match create_generation_tx(&mut tx, &generation).await {
        Ok(row) => row,
        Err(e) if is_unique_violation(&e) => {
            drop(tx);
            rollback.run().await;
            let key = req.idempotency_key.as_deref().unwrap_or_default();
            let existing = state
                .repos
                .generations
                .find_by_idempotency_key(user_id, key)
                .await?
                .ok_or_else(|| {
                    // The key exists but belongs to someone else's row
                    Error::IdempotencyConflict(
                        "Idempotency key already used with a different request".to_string(),
                    )
                })?;
            return Ok((StatusCode::OK, Json(duplicate_body(&existing))));
        }
        Err(e) => return Err(Error::Database(e)),
    };
    tx.commit().await.map_err(Error::Database)?;

    if let Some(ref key) = req.idempotency_key {
        record_idempotency(state, user_id, SCOPE_REGEN, key, &created).await;
    }

    let envelope = build_envelope(
        &created,
        &draft.prompt,
        draft.platform,
        variant_count,
        provider_route,
        &user_lease,
        &provider_lease,
        ctx,
        req.changes.as_deref(),
    );
    dispatch_or_fail(state, &created, &envelope).await?;
    rollback.disarm();

    state.metrics.record_lifecycle(Lifecycle::Queued);
    tracing::info!(
        generation_id = %created.id,
        job_id = %envelope.job_id,
        request_id = %ctx.request_id,
        regen_type = %regen_type.as_str(),
        "regeneration queued"
    );
    Ok((StatusCode::ACCEPTED, Json(accepted_body(&created))))
}

/// Acquire the user lease, then the provider lease. A provider denial
/// releases the user lease via the rollback before the error surfaces.
async fn acquire_leases(
    state: &GenerationsState,
    user_id: Uuid,
    effective: &reelcast_accounts::EffectiveLimits,
    provider_route: ProviderRoute,
    ctx: &RequestContext,
    rollback: &mut AdmissionRollback,
) -> Result<(LeaseDecision, LeaseDecision)> {
    let lease_meta = json!({"userId": user_id, "requestId": ctx.request_id});

    let user_lease = state
        .enforcer
        .acquire_user_lease(user_id, effective.limits.user_concurrency, &lease_meta)
        .await
        .map_err(kv_err)?;
    if !user_lease.acquired {
        state.metrics.record_rejection(RejectionKind::UserConcurrency);
        return Err(Error::ConcurrencyLimit {
            message: "Too many generations in flight for this account".to_string(),
            retry_after_seconds: user_lease.retry_after_seconds,
        });
    }
    rollback.user_lease = Some(user_lease.lease_id.clone());

    let provider_lease = state
        .enforcer
        .acquire_provider_lease(
            provider_route.provider.as_str(),
            provider_route.model,
            provider_route.lane.as_str(),
            &lease_meta,
        )
        .await
        .map_err(kv_err)?;
    if !provider_lease.acquired {
        state
            .metrics
            .record_rejection(RejectionKind::ProviderConcurrency);
        return Err(Error::ConcurrencyLimit {
            message: "Generation capacity is saturated, try again shortly".to_string(),
            retry_after_seconds: provider_lease.retry_after_seconds,
        });
    }
    rollback.provider_lease = Some((provider_route, provider_lease.lease_id.clone()));

    Ok((user_lease, provider_lease))
}

#[allow(clippy::too_many_arguments)]
fn build_envelope(
    generation: &Generation,
    prompt: &str,
    platform: Platform,
    variant_count: i32,
    provider_route: ProviderRoute,
    user_lease: &LeaseDecision,
    provider_lease: &LeaseDecision,
    ctx: &RequestContext,
    regen_changes: Option<&str>,
) -> JobEnvelope {
    JobEnvelope {
        job_type: JobEnvelope::JOB_TYPE.to_string(),
        job_id: Uuid::new_v4(),
        request_id: ctx.request_id.clone(),
        user_id: generation.owner_id,
        draft_id: generation.draft_id,
        generation_id: generation.id,
        lane: provider_route.lane,
        variant_count,
        prompt: prompt.to_string(),
        platform: platform.as_str().to_string(),
        is_regen: generation.is_regen,
        parent_generation_id: generation.parent_generation_id,
        regen_type: generation.regen_type.map(|t| t.as_str().to_string()),
        regen_changes: regen_changes.map(str::to_string),
        user_lease_id: user_lease.lease_id.clone(),
        provider_lease_id: provider_lease.lease_id.clone(),
        retry_count: 0,
        created_at: generation.created_at,
    }
}

/// Record the idempotency mapping. The durable row is the at-most-once
/// guard; a KV failure here only loses the fast path, so it is not fatal.
async fn record_idempotency(
    state: &GenerationsState,
    user_id: Uuid,
    scope: &str,
    key: &str,
    generation: &Generation,
) {
    let mapping = json!({
        "draftId": generation.draft_id,
        "generationId": generation.id,
    });
    if let Err(e) = state
        .enforcer
        .record_idempotency(user_id, scope, key, &mapping)
        .await
    {
        tracing::warn!(error = %e, generation_id = %generation.id, "Failed to record idempotency mapping");
    }
}

/// Publish the job. On failure the generation is marked failed so clients
/// polling it see a terminal state, and the error unwinds the admission.
async fn dispatch_or_fail(
    state: &GenerationsState,
    generation: &Generation,
    envelope: &JobEnvelope,
) -> Result<()> {
    if let Err(e) = state.dispatcher.dispatch(envelope).await {
        tracing::error!(
            error = %e,
            generation_id = %generation.id,
            job_id = %envelope.job_id,
            "Queue dispatch failed"
        );
        if let Err(mark_err) = state
            .repos
            .generations
            .mark_failed(generation.id, "Dispatch to the job queue failed")
            .await
        {
            tracing::error!(error = %mark_err, generation_id = %generation.id, "Failed to mark generation failed after dispatch error");
        }
        state.metrics.record_lifecycle(Lifecycle::Failed);
        return Err(Error::Dispatch(e.to_string()));
    }
    Ok(())
}
