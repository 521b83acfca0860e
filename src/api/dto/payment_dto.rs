//! Payment initiation and webhook acknowledgement DTOs.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{BookingId, BookingStatus, PaymentStatus};
use crate::service::{PaymentMode, PaymentSession, WebhookOutcome};

/// Request body for `POST /bookings/{id}/payment`.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct InitiatePaymentRequest {
    /// `intent` (default) or `checkout`.
    #[serde(default)]
    pub mode: Option<PaymentMode>,
}

/// Response body for `POST /bookings/{id}/payment`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PaymentSessionResponse {
    /// Booking being paid.
    pub booking_id: BookingId,
    /// Mode used.
    pub mode: PaymentMode,
    /// Payment intent or checkout session id.
    pub artifact_id: String,
    /// Client secret for confirming an intent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Hosted checkout page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
    /// Amount charged, minor units.
    pub amount_cents: i64,
    /// Currency code.
    pub currency: String,
    /// Booking status after initiation.
    pub status: BookingStatus,
    /// Payment status after initiation.
    pub payment_status: PaymentStatus,
}

impl From<PaymentSession> for PaymentSessionResponse {
    fn from(session: PaymentSession) -> Self {
        Self {
            booking_id: session.booking.id,
            mode: session.mode,
            artifact_id: session.artifact_id,
            client_secret: session.client_secret,
            checkout_url: session.checkout_url,
            amount_cents: session.booking.total_cents,
            currency: session.booking.currency,
            status: session.booking.status,
            payment_status: session.booking.payment_status,
        }
    }
}

/// Response body for `POST /webhooks/payments`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    /// Always `true`: the delivery was authenticated and will not be retried.
    pub received: bool,
    /// What was done with it.
    pub outcome: WebhookOutcome,
}
