//! Caller identity extractor.
//!
//! Authentication happens upstream; the authenticated principal arrives in
//! the `X-Actor-Id` header as a UUID.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::domain::ActorId;
use crate::error::BookingError;

/// Header carrying the caller's id.
pub const ACTOR_HEADER: &str = "x-actor-id";

impl<S: Send + Sync> FromRequestParts<S> for ActorId {
    type Rejection = BookingError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(ACTOR_HEADER)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| {
                BookingError::InvalidRequest(format!("missing {ACTOR_HEADER} header"))
            })?;
        let uuid = Uuid::parse_str(raw.trim()).map_err(|_| {
            tracing::warn!(uri = %parts.uri, "malformed actor header");
            BookingError::InvalidRequest(format!("{ACTOR_HEADER} must be a UUID"))
        })?;
        Ok(Self::from_uuid(uuid))
    }
}
