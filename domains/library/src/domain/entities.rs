//! Library domain entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use reelcast_common::{Error, Result};
use reelcast_drafts::Platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "asset_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AssetStatus {
    Draft,
    #[default]
    Active,
    Archived,
}

/// A persisted library item, optionally linked to the draft and variant it
/// was saved from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Asset {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub draft_id: Option<Uuid>,
    pub variant_id: Option<Uuid>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub platform: Option<Platform>,
    pub tags: Vec<String>,
    pub status: AssetStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Asset {
    const MAX_TAGS: usize = 20;

    /// Create a new asset with validation
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        owner_id: Uuid,
        draft_id: Option<Uuid>,
        variant_id: Option<Uuid>,
        title: Option<String>,
        content: Option<String>,
        platform: Option<Platform>,
        tags: Vec<String>,
    ) -> Result<Self> {
        if title.is_none() && content.is_none() && variant_id.is_none() {
            return Err(Error::Validation(
                "An asset needs a title, content, or a source variant".to_string(),
            ));
        }
        if tags.len() > Self::MAX_TAGS {
            return Err(Error::Validation(format!(
                "At most {} tags per asset",
                Self::MAX_TAGS
            )));
        }
        if tags.iter().any(|t| t.is_empty() || t.len() > 50) {
            return Err(Error::Validation(
                "Tags must be 1-50 characters".to_string(),
            ));
        }

        // Tags are a set: dedupe while preserving order
        let mut seen = std::collections::HashSet::new();
        let tags: Vec<String> = tags.into_iter().filter(|t| seen.insert(t.clone())).collect();

        let now = Utc::now();
        Ok(Asset {
            id: Uuid::new_v4(),
            owner_id,
            draft_id,
            variant_id,
            title,
            content,
            platform,
            tags,
            status: AssetStatus::default(),
            created_at: now,
            updated_at: now,
        })
    }
}
