//! Transaction helpers for the Generations domain
//!
//! The two multi-row writes in the core both happen here: admission persists
//! the draft and its generation atomically, and the worker persists variants,
//! the usage ledger row, and the completed status atomically. Either
//! everything in a step is visible or nothing is.

use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use super::generations::GENERATION_COLUMNS;
use super::usage::USAGE_COLUMNS;
use super::variants::VARIANT_COLUMNS;
use crate::domain::entities::{Generation, UsageEntry, Variant};

/// Insert a generation within a transaction
pub async fn create_generation_tx(
    tx: &mut Transaction<'_, Postgres>,
    generation: &Generation,
) -> Result<Generation, sqlx::Error> {
    let query = format!(
        "INSERT INTO generations ({GENERATION_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
         RETURNING {GENERATION_COLUMNS}"
    );
    let row = sqlx::query_as::<_, Generation>(&query)
        .bind(generation.id)
        .bind(generation.draft_id)
        .bind(generation.owner_id)
        .bind(generation.status)
        .bind(&generation.error_message)
        .bind(&generation.idempotency_key)
        .bind(generation.is_regen)
        .bind(generation.parent_generation_id)
        .bind(generation.regen_type)
        .bind(&generation.metadata)
        .bind(generation.created_at)
        .bind(generation.updated_at)
        .bind(generation.completed_at)
        .fetch_one(&mut **tx)
        .await?;
    Ok(row)
}

/// Insert one variant within a transaction
pub async fn create_variant_tx(
    tx: &mut Transaction<'_, Postgres>,
    variant: &Variant,
) -> Result<Variant, sqlx::Error> {
    let query = format!(
        "INSERT INTO variants ({VARIANT_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         RETURNING {VARIANT_COLUMNS}"
    );
    let row = sqlx::query_as::<_, Variant>(&query)
        .bind(variant.id)
        .bind(variant.generation_id)
        .bind(variant.variant_index)
        .bind(variant.draft_id)
        .bind(variant.owner_id)
        .bind(&variant.content)
        .bind(&variant.video_url)
        .bind(&variant.thumbnail_url)
        .bind(variant.created_at)
        .fetch_one(&mut **tx)
        .await?;
    Ok(row)
}

/// Append a usage ledger row within a transaction
pub async fn create_usage_entry_tx(
    tx: &mut Transaction<'_, Postgres>,
    entry: &UsageEntry,
) -> Result<UsageEntry, sqlx::Error> {
    let query = format!(
        "INSERT INTO usage_ledger ({USAGE_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         RETURNING {USAGE_COLUMNS}"
    );
    let row = sqlx::query_as::<_, UsageEntry>(&query)
        .bind(entry.id)
        .bind(entry.user_id)
        .bind(entry.generation_id)
        .bind(&entry.month)
        .bind(entry.prompt_tokens)
        .bind(entry.completion_tokens)
        .bind(entry.total_tokens)
        .bind(entry.cost_estimate)
        .bind(&entry.model)
        .bind(entry.created_at)
        .fetch_one(&mut **tx)
        .await?;
    Ok(row)
}

/// Guarded completion within a transaction. Returns false when the row was
/// not in `processing` (a concurrent delivery finished first); the caller
/// should roll back and treat the job as already done.
pub async fn mark_completed_tx(
    tx: &mut Transaction<'_, Postgres>,
    generation_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE generations SET status = 'completed', completed_at = NOW(), updated_at = NOW() \
         WHERE id = $1 AND status = 'processing'",
    )
    .bind(generation_id)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected() > 0)
}
