//! Draft repository

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entities::Draft;
use reelcast_common::Result;

/// All columns in the drafts table, used for SELECT and RETURNING clauses.
pub(crate) const DRAFT_COLUMNS: &str = "id, owner_id, title, prompt, platform, settings, selected_variant_id, is_archived, created_at, updated_at";

#[derive(Clone)]
pub struct DraftRepository {
    pool: PgPool,
}

impl DraftRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a draft by ID
    pub async fn find(&self, id: Uuid) -> Result<Option<Draft>> {
        let query = format!("SELECT {DRAFT_COLUMNS} FROM drafts WHERE id = $1");
        let row = sqlx::query_as::<_, Draft>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// List a user's drafts with keyset pagination on `(created_at, id)`.
    pub async fn list_for_owner(
        &self,
        owner_id: Uuid,
        after: Option<(DateTime<Utc>, Uuid)>,
        limit: i64,
        include_archived: bool,
    ) -> Result<Vec<Draft>> {
        let mut query = format!("SELECT {DRAFT_COLUMNS} FROM drafts WHERE owner_id = $1");
        if !include_archived {
            query.push_str(" AND NOT is_archived");
        }
        if after.is_some() {
            query.push_str(" AND (created_at, id) < ($3, $4)");
        }
        query.push_str(" ORDER BY created_at DESC, id DESC LIMIT $2");

        let rows = if let Some((created_at, id)) = after {
            sqlx::query_as::<_, Draft>(&query)
                .bind(owner_id)
                .bind(limit)
                .bind(created_at)
                .bind(id)
                .fetch_all(&self.pool)
                .await?
        } else {
            sqlx::query_as::<_, Draft>(&query)
                .bind(owner_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
        };
        Ok(rows)
    }

    /// Apply an owner mutation. Only the mutable fields change; `updated_at`
    /// is bumped by the statement.
    pub async fn update(&self, draft: &Draft) -> Result<Draft> {
        let query = format!(
            "UPDATE drafts SET \
                title = $2, settings = $3, selected_variant_id = $4, \
                is_archived = $5, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {DRAFT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, Draft>(&query)
            .bind(draft.id)
            .bind(&draft.title)
            .bind(&draft.settings)
            .bind(draft.selected_variant_id)
            .bind(draft.is_archived)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }
}
