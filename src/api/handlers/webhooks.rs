//! Payment gateway webhook endpoint.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::dto::WebhookAck;
use crate::app_state::AppState;
use crate::error::{BookingError, ErrorResponse};

/// Header carrying the payload signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// `POST /webhooks/payments`: Gateway event delivery.
///
/// The raw body is needed for signature verification, so it is taken as
/// bytes and parsed only after the signature checks out.
///
/// # Errors
///
/// Returns [`BookingError::SignatureInvalid`] (400) for unsigned or forged
/// deliveries and 503 when the dedup record cannot be written, so the
/// gateway redelivers.
#[utoipa::path(
    post,
    path = "/api/v1/webhooks/payments",
    tag = "Webhooks",
    summary = "Receive a payment gateway event",
    description = "Verifies the `Stripe-Signature` header, deduplicates by event id and payment, and applies the event to its booking. Every authenticated delivery is acknowledged with 200.",
    params(("stripe-signature" = String, Header, description = "`t=<unix>,v1=<hex hmac>`")),
    request_body(content = String, description = "Raw gateway event JSON", content_type = "application/json"),
    responses(
        (status = 200, description = "Delivery acknowledged", body = WebhookAck),
        (status = 400, description = "Missing or invalid signature", body = ErrorResponse),
        (status = 503, description = "Storage unavailable; retry", body = ErrorResponse),
    )
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, BookingError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    let outcome = state.webhooks.dispatch(&body, signature).await?;
    Ok(Json(WebhookAck {
        received: true,
        outcome,
    }))
}

/// Webhook routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/webhooks/payments", post(payment_webhook))
}
