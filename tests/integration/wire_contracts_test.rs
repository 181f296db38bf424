//! Wire-contract properties: the job envelope, the delivery signature, the
//! pagination cursor, and plan resolution behave as published.

use chrono::{Duration, TimeZone, Utc};
use uuid::Uuid;

use reelcast_common::{timewin, PageCursor};
use reelcast_plans::{
    limits_for, resolve_effective_plan, route, ActionType, Lane, Plan, ProviderKind,
};
use reelcast_queue::{sign_body, verify_signature, JobEnvelope};

fn envelope() -> JobEnvelope {
    JobEnvelope {
        job_type: JobEnvelope::JOB_TYPE.to_string(),
        job_id: Uuid::new_v4(),
        request_id: Uuid::new_v4().to_string(),
        user_id: Uuid::new_v4(),
        draft_id: Uuid::new_v4(),
        generation_id: Uuid::new_v4(),
        lane: Lane::Interactive,
        variant_count: 2,
        prompt: "Write a hook about sourdough starters".to_string(),
        platform: "instagram_reels".to_string(),
        is_regen: true,
        parent_generation_id: Some(Uuid::new_v4()),
        regen_type: Some("targeted".to_string()),
        regen_changes: Some("tighten the first sentence".to_string()),
        user_lease_id: Uuid::new_v4().to_string(),
        provider_lease_id: Uuid::new_v4().to_string(),
        retry_count: 1,
        created_at: Utc.with_ymd_and_hms(2026, 5, 20, 12, 0, 0).unwrap(),
    }
}

/// The envelope survives the bus byte-for-byte: serialize, sign, verify,
/// deserialize.
#[test]
fn envelope_round_trips_through_a_signed_delivery() {
    let envelope = envelope();
    let body = serde_json::to_vec(&envelope).unwrap();

    let signature = sign_body(&body, "current-signing-key");
    assert!(verify_signature(
        &body,
        &signature,
        "current-signing-key",
        "next-signing-key"
    ));

    let decoded: JobEnvelope = serde_json::from_slice(&body).unwrap();
    assert_eq!(decoded, envelope);
}

/// A tampered body or wrong key fails verification.
#[test]
fn signature_rejects_tampering() {
    let envelope = envelope();
    let body = serde_json::to_vec(&envelope).unwrap();
    let signature = sign_body(&body, "current-signing-key");

    let mut tampered = envelope.clone();
    tampered.variant_count = 5;
    let tampered_body = serde_json::to_vec(&tampered).unwrap();

    assert!(!verify_signature(
        &tampered_body,
        &signature,
        "current-signing-key",
        "next-signing-key"
    ));
    assert!(!verify_signature(
        &body,
        &signature,
        "some-other-key",
        "yet-another-key"
    ));
}

/// Key rotation: deliveries signed with the next key verify too.
#[test]
fn signature_accepts_rotated_key() {
    let body = serde_json::to_vec(&envelope()).unwrap();
    let signature = sign_body(&body, "next-signing-key");
    assert!(verify_signature(
        &body,
        &signature,
        "current-signing-key",
        "next-signing-key"
    ));
}

/// Cursor pagination is a bijection: decoding then re-encoding yields the
/// identical opaque token.
#[test]
fn cursor_is_a_bijection() {
    let original = PageCursor::new(
        Uuid::new_v4(),
        Utc.with_ymd_and_hms(2026, 5, 20, 9, 41, 7).unwrap(),
    );
    let token = original.encode();
    let decoded = PageCursor::decode(&token).unwrap();
    assert_eq!(decoded, original);
    assert_eq!(decoded.encode(), token);
}

/// Pro-boost scenario: an active boost lifts a basic user to pro
/// entitlements (variantCount 5 admissible); expiry drops them back.
#[test]
fn boost_lifts_and_expires() {
    let now = Utc::now();

    let boosted = resolve_effective_plan(Plan::Basic, Some(now + Duration::days(1)), now);
    assert_eq!(boosted, Plan::Pro);
    assert_eq!(limits_for(boosted).max_variants, 5);

    let lapsed = resolve_effective_plan(Plan::Basic, Some(now - Duration::seconds(1)), now);
    assert_eq!(lapsed, Plan::Basic);
    assert_eq!(limits_for(lapsed).max_variants, 1);
}

/// Routing is a pure function of plan and action, and the provider
/// semaphore key components come straight from it.
#[test]
fn routing_is_deterministic_per_plan_and_action() {
    for _ in 0..3 {
        let basic = route(Plan::Basic, ActionType::Create);
        assert_eq!(basic.provider, ProviderKind::OpenAi);
        assert_eq!(basic.model, "gpt-4o-mini");
        assert_eq!(basic.lane, Lane::Interactive);
    }

    let pro = route(Plan::Pro, ActionType::TargetedRegen);
    assert_eq!(pro.provider, ProviderKind::Anthropic);
}

/// Month boundary: the instant a calendar month rolls over, the bucket key
/// changes and the new window gets fresh quota.
#[test]
fn month_rollover_is_sharp() {
    let last_instant = Utc.with_ymd_and_hms(2026, 5, 31, 23, 59, 59).unwrap();
    let first_instant = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();

    assert_eq!(timewin::month_key(last_instant), "202605");
    assert_eq!(timewin::month_key(first_instant), "202606");
    assert_ne!(
        timewin::month_key(last_instant),
        timewin::month_key(first_instant)
    );
    assert_eq!(timewin::seconds_until_month_end(last_instant), 1);
}

/// The envelope's lane decides the bus retry budget: 3 interactive, 1 batch.
#[test]
fn lane_retry_budgets() {
    assert_eq!(Lane::Interactive.retries(), 3);
    assert_eq!(Lane::Batch.retries(), 1);
}

mod generator_contract {
    use super::*;
    use reelcast_generator::{
        GenerationTask, Generator, GeneratorError, MockBehavior, MockGenerator,
    };

    fn task(variant_count: i32) -> GenerationTask {
        GenerationTask {
            prompt: "Write a hook about sourdough starters".to_string(),
            platform: "tiktok".to_string(),
            variant_count,
            lane: Lane::Interactive,
            is_regen: false,
            regen_type: None,
            regen_changes: None,
            model: "gpt-4o-mini".to_string(),
            max_output_tokens: 2000,
        }
    }

    /// Worker retry policy hinges on the transience split: 429/5xx/network/
    /// timeout retry, everything else is terminal.
    #[test]
    fn failure_transience_split() {
        assert!(GeneratorError::RateLimited.is_transient());
        assert!(GeneratorError::Upstream("503".into()).is_transient());
        assert!(GeneratorError::Network("ECONNRESET".into()).is_transient());
        assert!(GeneratorError::Timeout.is_transient());

        assert!(!GeneratorError::Validation("bad request".into()).is_transient());
        assert!(!GeneratorError::Disabled.is_transient());
        assert!(!GeneratorError::InvalidOutput("junk".into()).is_transient());
    }

    /// The generator honors the requested variant count and reports usage
    /// the ledger can record (total = input + output by construction).
    #[tokio::test]
    async fn output_matches_requested_variant_count() {
        let generator = MockGenerator::new();
        let output = generator.generate(&task(5)).await.unwrap();

        assert_eq!(output.variants.len(), 5);
        assert!(output.variants.iter().all(|v| !v.text.is_empty()));
        assert!(output.usage.input_tokens > 0);
        assert!(output.usage.output_tokens > 0);
    }

    /// An output-token overrun is visible to the worker, which treats it as
    /// a permanent failure rather than a retry.
    #[tokio::test]
    async fn output_token_overrun_is_observable() {
        let generator = MockGenerator::new();
        generator.set_behavior(MockBehavior::SucceedWithOutputTokens(5000));

        let task = task(1);
        let output = generator.generate(&task).await.unwrap();
        assert!(output.usage.output_tokens > task.max_output_tokens);
    }
}
