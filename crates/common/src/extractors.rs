//! Custom axum extractors for Reelcast

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::Error;

/// JSON extractor that validates the deserialized value automatically.
///
/// Unparseable bodies map to `INVALID_REQUEST`; schema violations map to
/// `VALIDATION_ERROR` with the offending fields in the message.
#[derive(Debug)]
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) =
            Json::<T>::from_request(req, state)
                .await
                .map_err(|e: JsonRejection| {
                    Error::InvalidRequest(format!("Invalid request body: {}", e))
                })?;
        value.validate().map_err(|e| {
            let details: Vec<String> = e
                .field_errors()
                .iter()
                .map(|(field, errors)| {
                    let messages: Vec<String> = errors
                        .iter()
                        .map(|err| {
                            err.message
                                .as_ref()
                                .map(|m| m.to_string())
                                .unwrap_or_else(|| err.code.to_string())
                        })
                        .collect();
                    format!("{}: {}", field, messages.join(", "))
                })
                .collect();
            Error::Validation(details.join("; "))
        })?;
        Ok(ValidatedJson(value))
    }
}
