//! Opaque pagination cursors
//!
//! Keyset pagination over `(created_at, id)` uses an opaque base64 token of
//! the form `{id}::{createdAt}`. Decoding then re-encoding a cursor yields
//! the identical token.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::error::Error;

const SEPARATOR: &str = "::";

/// Decoded position in a keyset-paginated listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl PageCursor {
    pub fn new(id: Uuid, created_at: DateTime<Utc>) -> Self {
        Self { id, created_at }
    }

    /// Encode to the opaque token handed to clients.
    pub fn encode(&self) -> String {
        let raw = format!(
            "{}{}{}",
            self.id,
            SEPARATOR,
            self.created_at.to_rfc3339_opts(SecondsFormat::Micros, true)
        );
        URL_SAFE_NO_PAD.encode(raw.as_bytes())
    }

    /// Decode a client-supplied token; malformed input is a validation error.
    pub fn decode(token: &str) -> Result<Self, Error> {
        let raw = URL_SAFE_NO_PAD
            .decode(token.as_bytes())
            .map_err(|_| Error::Validation("Invalid pagination cursor".to_string()))?;
        let raw = String::from_utf8(raw)
            .map_err(|_| Error::Validation("Invalid pagination cursor".to_string()))?;

        let (id_part, ts_part) = raw
            .split_once(SEPARATOR)
            .ok_or_else(|| Error::Validation("Invalid pagination cursor".to_string()))?;

        let id = id_part
            .parse::<Uuid>()
            .map_err(|_| Error::Validation("Invalid pagination cursor".to_string()))?;
        let created_at = DateTime::parse_from_rfc3339(ts_part)
            .map_err(|_| Error::Validation("Invalid pagination cursor".to_string()))?
            .with_timezone(&Utc);

        Ok(Self { id, created_at })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_cursor_round_trip() {
        let cursor = PageCursor::new(
            Uuid::new_v4(),
            Utc.with_ymd_and_hms(2026, 5, 20, 14, 30, 45).unwrap(),
        );
        let token = cursor.encode();
        let decoded = PageCursor::decode(&token).unwrap();
        assert_eq!(decoded, cursor);
        // Bijection: decode then re-encode yields the same token
        assert_eq!(decoded.encode(), token);
    }

    #[test]
    fn test_cursor_preserves_sub_second_precision() {
        let created_at = Utc
            .with_ymd_and_hms(2026, 5, 20, 14, 30, 45)
            .unwrap()
            .checked_add_signed(chrono::Duration::microseconds(123456))
            .unwrap();
        let cursor = PageCursor::new(Uuid::new_v4(), created_at);
        let decoded = PageCursor::decode(&cursor.encode()).unwrap();
        assert_eq!(decoded.created_at, created_at);
    }

    #[test]
    fn test_cursor_rejects_garbage() {
        assert!(PageCursor::decode("not base64 at all!!!").is_err());
        let not_a_cursor = URL_SAFE_NO_PAD.encode(b"hello world");
        assert!(PageCursor::decode(&not_a_cursor).is_err());
        let bad_uuid = URL_SAFE_NO_PAD.encode(b"nope::2026-01-01T00:00:00Z");
        assert!(PageCursor::decode(&bad_uuid).is_err());
    }

    #[test]
    fn test_cursor_rejects_bad_timestamp() {
        let raw = format!("{}::not-a-timestamp", Uuid::new_v4());
        let token = URL_SAFE_NO_PAD.encode(raw.as_bytes());
        assert!(PageCursor::decode(&token).is_err());
    }
}
