//! Draft domain entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

use reelcast_common::{Error, Result};

/// Target platform for a piece of content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "platform_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Tiktok,
    InstagramReels,
    YoutubeShorts,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Tiktok => "tiktok",
            Platform::InstagramReels => "instagram_reels",
            Platform::YoutubeShorts => "youtube_shorts",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "tiktok" => Ok(Platform::Tiktok),
            "instagram_reels" => Ok(Platform::InstagramReels),
            "youtube_shorts" => Ok(Platform::YoutubeShorts),
            other => Err(format!("unknown platform '{}'", other)),
        }
    }
}

/// A logical piece of content. Mutated only by its owner; soft-archived,
/// never hard-deleted from within the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Draft {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: Option<String>,
    pub prompt: String,
    pub platform: Platform,
    pub settings: Json<serde_json::Value>,
    pub selected_variant_id: Option<Uuid>,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Draft {
    pub const PROMPT_MIN: usize = 10;
    pub const PROMPT_MAX: usize = 5000;

    /// Create a new draft with validation
    pub fn new(
        owner_id: Uuid,
        title: Option<String>,
        prompt: String,
        platform: Platform,
        settings: Option<serde_json::Value>,
    ) -> Result<Self> {
        let prompt_len = prompt.chars().count();
        if !(Self::PROMPT_MIN..=Self::PROMPT_MAX).contains(&prompt_len) {
            return Err(Error::Validation(format!(
                "prompt must be {}-{} characters",
                Self::PROMPT_MIN,
                Self::PROMPT_MAX
            )));
        }
        if let Some(ref t) = title {
            if t.chars().count() > 200 {
                return Err(Error::Validation(
                    "title must be at most 200 characters".to_string(),
                ));
            }
        }

        let now = Utc::now();
        Ok(Draft {
            id: Uuid::new_v4(),
            owner_id,
            title,
            prompt,
            platform,
            settings: Json(settings.unwrap_or_else(|| serde_json::json!({}))),
            selected_variant_id: None,
            is_archived: false,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.owner_id == user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_creation() {
        let owner = Uuid::new_v4();
        let draft = Draft::new(
            owner,
            Some("Coffee hooks".to_string()),
            "Write three hooks about cold brew coffee".to_string(),
            Platform::Tiktok,
            None,
        )
        .unwrap();

        assert_eq!(draft.owner_id, owner);
        assert!(draft.is_owned_by(owner));
        assert!(!draft.is_owned_by(Uuid::new_v4()));
        assert!(!draft.is_archived);
        assert!(draft.selected_variant_id.is_none());
    }

    #[test]
    fn test_prompt_length_bounds() {
        let owner = Uuid::new_v4();
        assert!(Draft::new(owner, None, "too short".to_string(), Platform::Tiktok, None).is_err());
        assert!(Draft::new(owner, None, "x".repeat(5001), Platform::Tiktok, None).is_err());
        assert!(Draft::new(owner, None, "x".repeat(10), Platform::Tiktok, None).is_ok());
        assert!(Draft::new(owner, None, "x".repeat(5000), Platform::Tiktok, None).is_ok());
    }

    #[test]
    fn test_title_length_bound() {
        let owner = Uuid::new_v4();
        let result = Draft::new(
            owner,
            Some("t".repeat(201)),
            "a perfectly fine prompt".to_string(),
            Platform::YoutubeShorts,
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_platform_serde_snake_case() {
        assert_eq!(
            serde_json::to_string(&Platform::InstagramReels).unwrap(),
            "\"instagram_reels\""
        );
        assert_eq!(
            serde_json::from_str::<Platform>("\"youtube_shorts\"").unwrap(),
            Platform::YoutubeShorts
        );
    }

    #[test]
    fn test_platform_from_str() {
        assert_eq!("tiktok".parse::<Platform>().unwrap(), Platform::Tiktok);
        assert!("vine".parse::<Platform>().is_err());
    }
}
