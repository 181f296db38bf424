//! Worker pipeline: queue ingress
//!
//! The bus delivers the signed job envelope here. The handler verifies the
//! signature, re-checks quotas read-only, drives the generation through the
//! state machine, invokes the provider under the plan deadline, persists
//! variants and the usage ledger atomically, and releases both leases on
//! every exit path. The HTTP status tells the bus whether to retry.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use std::str::FromStr;
use std::time::Duration;

use reelcast_common::{timewin, Error, Lifecycle, Result};
use reelcast_generator::{GenerationTask, GeneratorError};
use reelcast_plans::{cost_estimate, route, ActionType, Plan, ProviderKind};
use reelcast_queue::{verify_signature, JobEnvelope, LOCAL_DEV_HEADER, SIGNATURE_HEADER};

use crate::api::middleware::GenerationsState;
use crate::domain::entities::{Generation, GenerationStatus, UsageEntry, Variant};
use crate::repository::transactions::{create_usage_entry_tx, create_variant_tx, mark_completed_tx};

/// Hard cap on delivery attempts per job.
const MAX_JOB_ATTEMPTS: i32 = 3;

/// Retry hints handed back to the bus on transient failures.
const RETRY_AFTER_RATE_LIMITED_SECONDS: i64 = 60;
const RETRY_AFTER_TRANSIENT_SECONDS: i64 = 15;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerResponse {
    pub success: bool,
    pub should_retry: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// How one delivery ended. Mapped to the HTTP response after leases are
/// released.
enum JobOutcome {
    /// Variants persisted, ledger written
    Completed,
    /// Re-delivery of a job that already finished
    AlreadyDone,
    /// Terminal failure recorded on the generation; do not retry
    Terminal(String),
    /// The envelope references state that does not exist; do not retry
    Reject(String),
    /// Transient failure; the bus should redeliver
    Retry { retry_after: i64, error: String },
}

/// `POST /api/worker/generate`: queue ingress.
pub async fn process_delivery(
    State(state): State<GenerationsState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<WorkerResponse>)> {
    // Signature check; development deliveries from the local dispatcher
    // carry the bypass marker instead
    let local_dev = state.environment.is_development()
        && headers
            .get(LOCAL_DEV_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
    if !local_dev {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::Authentication("Missing queue signature".to_string()))?;
        if !verify_signature(
            &body,
            signature,
            &state.signing_keys.current,
            &state.signing_keys.next,
        ) {
            return Err(Error::Authentication("Invalid queue signature".to_string()));
        }
    }

    let envelope: JobEnvelope = serde_json::from_slice(&body)
        .map_err(|e| Error::InvalidRequest(format!("Malformed job envelope: {}", e)))?;
    if envelope.job_type != JobEnvelope::JOB_TYPE {
        return Err(Error::InvalidRequest(format!(
            "Unknown job type '{}'",
            envelope.job_type
        )));
    }

    let outcome = process_job(&state, &envelope).await;

    // Leases are released on every exit path; failures are logged, never
    // propagated (the TTL is the backstop)
    release_leases(&state, &envelope).await;

    let (status, response) = match outcome {
        JobOutcome::Completed | JobOutcome::AlreadyDone => (
            StatusCode::OK,
            WorkerResponse {
                success: true,
                should_retry: false,
                retry_after: None,
                error: None,
            },
        ),
        JobOutcome::Terminal(error) => (
            StatusCode::OK,
            WorkerResponse {
                success: false,
                should_retry: false,
                retry_after: None,
                error: Some(error),
            },
        ),
        JobOutcome::Reject(error) => (
            StatusCode::BAD_REQUEST,
            WorkerResponse {
                success: false,
                should_retry: false,
                retry_after: None,
                error: Some(error),
            },
        ),
        JobOutcome::Retry { retry_after, error } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            WorkerResponse {
                success: false,
                should_retry: true,
                retry_after: Some(retry_after),
                error: Some(error),
            },
        ),
    };
    Ok((status, Json(response)))
}

async fn process_job(state: &GenerationsState, envelope: &JobEnvelope) -> JobOutcome {
    let now = Utc::now();

    // Per-job retry cap, regardless of error class
    if envelope.retry_count >= MAX_JOB_ATTEMPTS {
        return fail_terminally(state, envelope, "Max retries exceeded").await;
    }

    // Load context
    let generation = match state.repos.generations.find(envelope.generation_id).await {
        Ok(Some(generation)) => generation,
        Ok(None) => {
            return JobOutcome::Reject(format!(
                "Generation {} does not exist",
                envelope.generation_id
            ));
        }
        Err(e) => {
            return JobOutcome::Retry {
                retry_after: RETRY_AFTER_TRANSIENT_SECONDS,
                error: format!("Failed to load generation: {}", e),
            };
        }
    };

    // Idempotent re-delivery: a finished job is acknowledged, not re-run
    if generation.status == GenerationStatus::Completed {
        return JobOutcome::AlreadyDone;
    }
    if generation.status == GenerationStatus::Failed {
        return JobOutcome::Terminal(
            generation
                .error_message
                .unwrap_or_else(|| "Generation already failed".to_string()),
        );
    }

    // Defense-in-depth: re-check the counters read-only. Admission already
    // incremented for this job, so an overshoot means re-delivery after a
    // window rollover or clock skew.
    let effective = match state
        .accounts
        .resolve_effective_limits(envelope.user_id, now)
        .await
    {
        Ok(effective) => effective,
        Err(e) => {
            return JobOutcome::Retry {
                retry_after: RETRY_AFTER_TRANSIENT_SECONDS,
                error: format!("Failed to resolve plan limits: {}", e),
            };
        }
    };
    let within_monthly = state
        .enforcer
        .monthly_within_limit(envelope.user_id, effective.limits.gens_per_month, now)
        .await;
    let within_hourly = state.enforcer.hourly_within_limit(envelope.user_id, now).await;
    match (within_monthly, within_hourly) {
        (Ok(true), Ok(true)) => {}
        (Ok(_), Ok(_)) => {
            return fail_terminally(state, envelope, "Quota exhausted before processing").await;
        }
        (Err(e), _) | (_, Err(e)) => {
            return JobOutcome::Retry {
                retry_after: RETRY_AFTER_TRANSIENT_SECONDS,
                error: format!("Limit re-check failed: {}", e),
            };
        }
    }

    // Transition to processing; a re-delivered in-flight job just proceeds
    if generation.status == GenerationStatus::Pending {
        match state.repos.generations.mark_processing(generation.id).await {
            Ok(true) => {
                state.metrics.record_lifecycle(Lifecycle::Started);
                tracing::info!(
                    generation_id = %generation.id,
                    job_id = %envelope.job_id,
                    request_id = %envelope.request_id,
                    "generation started"
                );
            }
            Ok(false) => {
                // A concurrent delivery won the transition; it owns the job
                return JobOutcome::AlreadyDone;
            }
            Err(e) => {
                return JobOutcome::Retry {
                    retry_after: RETRY_AFTER_TRANSIENT_SECONDS,
                    error: format!("Failed to start generation: {}", e),
                };
            }
        }
    }

    // Invoke the generator under the plan deadline
    let (provider, model) = admitted_route(&generation, effective.effective_plan, envelope);
    let generator = state.generators.for_provider(provider);
    let task = GenerationTask {
        prompt: envelope.prompt.clone(),
        platform: envelope.platform.clone(),
        variant_count: envelope.variant_count,
        lane: envelope.lane,
        is_regen: envelope.is_regen,
        regen_type: envelope.regen_type.clone(),
        regen_changes: envelope.regen_changes.clone(),
        model: model.clone(),
        max_output_tokens: effective.limits.max_output_tokens,
    };
    let deadline = Duration::from_secs(effective.limits.generator_timeout_seconds);
    let result = match tokio::time::timeout(deadline, generator.generate(&task)).await {
        Ok(result) => result,
        Err(_) => Err(GeneratorError::Timeout),
    };
    state.metrics.record_provider_result(
        provider.as_str(),
        matches!(result, Err(GeneratorError::RateLimited)),
    );

    match result {
        Ok(output) => {
            // Output past the plan cap is a permanent failure, not a retry
            if output.usage.output_tokens > effective.limits.max_output_tokens {
                return fail_terminally(
                    state,
                    envelope,
                    &format!(
                        "Generator output of {} tokens exceeded the cap of {}",
                        output.usage.output_tokens, effective.limits.max_output_tokens
                    ),
                )
                .await;
            }

            match persist_completion(state, &generation, envelope, output).await {
                Ok(true) => {
                    state.metrics.record_lifecycle(Lifecycle::Completed);
                    state.metrics.record_job_outcome(true);
                    state.metrics.observe_job_latency(envelope.age(Utc::now()));
                    tracing::info!(
                        generation_id = %generation.id,
                        job_id = %envelope.job_id,
                        request_id = %envelope.request_id,
                        duration_ms = envelope.age(Utc::now()).as_millis() as u64,
                        "generation completed"
                    );
                    JobOutcome::Completed
                }
                Ok(false) => JobOutcome::AlreadyDone,
                Err(e) => JobOutcome::Retry {
                    retry_after: RETRY_AFTER_TRANSIENT_SECONDS,
                    error: format!("Failed to persist generation output: {}", e),
                },
            }
        }
        Err(err) if err.is_transient() => {
            let retry_after = match err {
                GeneratorError::RateLimited => RETRY_AFTER_RATE_LIMITED_SECONDS,
                _ => RETRY_AFTER_TRANSIENT_SECONDS,
            };
            tracing::warn!(
                generation_id = %generation.id,
                job_id = %envelope.job_id,
                request_id = %envelope.request_id,
                error = %err,
                "transient generation failure, requesting retry"
            );
            JobOutcome::Retry {
                retry_after,
                error: err.to_string(),
            }
        }
        Err(err) => fail_terminally(state, envelope, &err.to_string()).await,
    }
}

/// Persist the terminal failure and report it as non-retryable. The status
/// guard keeps completed rows untouched.
async fn fail_terminally(
    state: &GenerationsState,
    envelope: &JobEnvelope,
    message: &str,
) -> JobOutcome {
    match state
        .repos
        .generations
        .mark_failed(envelope.generation_id, message)
        .await
    {
        Ok(true) => {
            state.metrics.record_lifecycle(Lifecycle::Failed);
            state.metrics.record_job_outcome(false);
            state.metrics.observe_job_latency(envelope.age(Utc::now()));
            tracing::warn!(
                generation_id = %envelope.generation_id,
                job_id = %envelope.job_id,
                request_id = %envelope.request_id,
                duration_ms = envelope.age(Utc::now()).as_millis() as u64,
                error = message,
                "generation failed"
            );
        }
        Ok(false) => {
            tracing::debug!(
                generation_id = %envelope.generation_id,
                "generation already terminal, failure not recorded"
            );
        }
        Err(e) => {
            tracing::error!(
                generation_id = %envelope.generation_id,
                error = %e,
                "failed to record terminal failure"
            );
        }
    }
    JobOutcome::Terminal(message.to_string())
}

/// Variants (dense indices from 1), the usage ledger row, and the completed
/// status land in one transaction. Returns false when a concurrent delivery
/// completed first.
async fn persist_completion(
    state: &GenerationsState,
    generation: &Generation,
    envelope: &JobEnvelope,
    output: reelcast_generator::GenerationOutput,
) -> Result<bool> {
    let now = Utc::now();
    let mut tx = state.repos.begin().await.map_err(Error::Database)?;

    if !mark_completed_tx(&mut tx, generation.id)
        .await
        .map_err(Error::Database)?
    {
        return Ok(false);
    }

    for (index, variant_content) in output.variants.iter().enumerate() {
        let variant = Variant::new(
            generation,
            index as i32 + 1,
            serde_json::to_value(variant_content)?,
        )?;
        create_variant_tx(&mut tx, &variant)
            .await
            .map_err(Error::Database)?;
    }

    let entry = UsageEntry::new(
        envelope.user_id,
        generation.id,
        timewin::ledger_month(now),
        output.usage.input_tokens,
        output.usage.output_tokens,
        cost_estimate(
            &output.model,
            output.usage.input_tokens,
            output.usage.output_tokens,
        ),
        output.model.clone(),
    )?;
    create_usage_entry_tx(&mut tx, &entry)
        .await
        .map_err(Error::Database)?;

    tx.commit().await.map_err(Error::Database)?;
    Ok(true)
}

/// The provider and model chosen at admission, recorded in the generation's
/// metadata so the worker and the lease release agree with the semaphore
/// that was actually taken. Falls back to re-routing from the current plan.
fn admitted_route(
    generation: &Generation,
    effective_plan: Plan,
    envelope: &JobEnvelope,
) -> (ProviderKind, String) {
    let metadata = &generation.metadata.0;
    if let (Some(provider), Some(model)) = (
        metadata
            .get("provider")
            .and_then(|v| v.as_str())
            .and_then(|s| ProviderKind::from_str(s).ok()),
        metadata.get("model").and_then(|v| v.as_str()),
    ) {
        return (provider, model.to_string());
    }
    let rerouted = route(effective_plan, action_type(envelope));
    (rerouted.provider, rerouted.model.to_string())
}

fn action_type(envelope: &JobEnvelope) -> ActionType {
    if !envelope.is_regen {
        ActionType::Create
    } else if envelope.regen_type.as_deref() == Some("full") {
        ActionType::FullRegen
    } else {
        ActionType::TargetedRegen
    }
}

/// Release both leases. Runs on every exit path; failures are logged only,
/// the lease TTL bounds any leakage.
async fn release_leases(state: &GenerationsState, envelope: &JobEnvelope) {
    if let Err(e) = state
        .enforcer
        .release_user_lease(envelope.user_id, &envelope.user_lease_id)
        .await
    {
        tracing::warn!(
            error = %e,
            job_id = %envelope.job_id,
            "Failed to release user lease"
        );
    }

    let (provider, model, lane) = provider_release_route(state, envelope).await;
    if let Err(e) = state
        .enforcer
        .release_provider_lease(&provider, &model, &lane, &envelope.provider_lease_id)
        .await
    {
        tracing::warn!(
            error = %e,
            job_id = %envelope.job_id,
            "Failed to release provider lease"
        );
    }
}

/// The semaphore key for the provider lease, reconstructed the same way it
/// was built at admission.
async fn provider_release_route(
    state: &GenerationsState,
    envelope: &JobEnvelope,
) -> (String, String, String) {
    if let Ok(Some(generation)) = state.repos.generations.find(envelope.generation_id).await {
        let metadata = &generation.metadata.0;
        if let (Some(provider), Some(model), Some(lane)) = (
            metadata.get("provider").and_then(|v| v.as_str()),
            metadata.get("model").and_then(|v| v.as_str()),
            metadata.get("lane").and_then(|v| v.as_str()),
        ) {
            return (provider.to_string(), model.to_string(), lane.to_string());
        }
    }

    let plan = state
        .accounts
        .resolve_effective_limits(envelope.user_id, Utc::now())
        .await
        .map(|e| e.effective_plan)
        .unwrap_or(Plan::Basic);
    let rerouted = route(plan, action_type(envelope));
    (
        rerouted.provider.as_str().to_string(),
        rerouted.model.to_string(),
        rerouted.lane.as_str().to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelcast_plans::Lane;
    use serde_json::json;
    use uuid::Uuid;

    fn envelope_with(is_regen: bool, regen_type: Option<&str>) -> JobEnvelope {
        JobEnvelope {
            job_type: JobEnvelope::JOB_TYPE.to_string(),
            job_id: Uuid::new_v4(),
            request_id: "req-1".to_string(),
            user_id: Uuid::new_v4(),
            draft_id: Uuid::new_v4(),
            generation_id: Uuid::new_v4(),
            lane: Lane::Interactive,
            variant_count: 1,
            prompt: "A perfectly reasonable prompt".to_string(),
            platform: "tiktok".to_string(),
            is_regen,
            parent_generation_id: None,
            regen_type: regen_type.map(str::to_string),
            regen_changes: None,
            user_lease_id: "ul-1".to_string(),
            provider_lease_id: "pl-1".to_string(),
            retry_count: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_action_type_mapping() {
        assert_eq!(action_type(&envelope_with(false, None)), ActionType::Create);
        assert_eq!(
            action_type(&envelope_with(true, Some("full"))),
            ActionType::FullRegen
        );
        assert_eq!(
            action_type(&envelope_with(true, Some("targeted"))),
            ActionType::TargetedRegen
        );
        assert_eq!(
            action_type(&envelope_with(true, None)),
            ActionType::TargetedRegen
        );
    }

    #[test]
    fn test_admitted_route_prefers_metadata() {
        let envelope = envelope_with(false, None);
        let generation = Generation::new(
            envelope.draft_id,
            envelope.user_id,
            None,
            false,
            None,
            None,
            json!({"provider": "anthropic", "model": "claude-sonnet-4", "lane": "interactive"}),
        )
        .unwrap();

        // Metadata wins even when the current plan would route elsewhere
        let (provider, model) = admitted_route(&generation, Plan::Basic, &envelope);
        assert_eq!(provider, ProviderKind::Anthropic);
        assert_eq!(model, "claude-sonnet-4");
    }

    #[test]
    fn test_admitted_route_falls_back_to_plan() {
        let envelope = envelope_with(false, None);
        let generation = Generation::new(
            envelope.draft_id,
            envelope.user_id,
            None,
            false,
            None,
            None,
            json!({}),
        )
        .unwrap();

        let (provider, model) = admitted_route(&generation, Plan::Basic, &envelope);
        assert_eq!(provider, ProviderKind::OpenAi);
        assert_eq!(model, "gpt-4o-mini");
    }
}
