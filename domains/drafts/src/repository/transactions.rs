//! Transaction helpers for the Drafts domain

use sqlx::{Postgres, Transaction};

use super::drafts::DRAFT_COLUMNS;
use crate::domain::entities::Draft;

/// Insert a draft within a transaction. The admission pipeline persists the
/// draft and its first generation atomically.
pub async fn create_draft_tx(
    tx: &mut Transaction<'_, Postgres>,
    draft: &Draft,
) -> Result<Draft, sqlx::Error> {
    let query = format!(
        "INSERT INTO drafts ({DRAFT_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         RETURNING {DRAFT_COLUMNS}"
    );
    let row = sqlx::query_as::<_, Draft>(&query)
        .bind(draft.id)
        .bind(draft.owner_id)
        .bind(&draft.title)
        .bind(&draft.prompt)
        .bind(draft.platform)
        .bind(&draft.settings)
        .bind(draft.selected_variant_id)
        .bind(draft.is_archived)
        .bind(draft.created_at)
        .bind(draft.updated_at)
        .fetch_one(&mut **tx)
        .await?;
    Ok(row)
}
