//! Inbound payment webhooks: verify, deduplicate, route.
//!
//! A verified event is always acknowledged. Processing failures are stored
//! for operators and published on the event bus instead of being returned to
//! the gateway, which would otherwise redeliver indefinitely.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use super::booking_service::Commit;
use super::payment_orchestrator::PaymentOrchestrator;
use crate::domain::{Booking, BookingId, DomainEvent};
use crate::error::BookingError;
use crate::payment::signature::verify_webhook_signature;
use crate::persistence::WebhookFailure;

/// What the dispatcher did with a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// The event changed (or confirmed) booking state.
    Applied,
    /// The event, or another report of the same payment, was seen before.
    Duplicate,
    /// The event type is not one the booking flow reacts to.
    Ignored,
    /// Processing failed; the failure was recorded for operators.
    Failed,
}

/// Payment lifecycle change carried by a recognised event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentSignal {
    /// Funds held, or taken when `captured`.
    FundsSecured {
        /// Funds were captured outright.
        captured: bool,
    },
    /// The charge was rejected or the checkout lapsed unpaid.
    PaymentFailed,
    /// The hold was voided by the gateway before capture.
    AuthorizationExpired,
}

impl PaymentSignal {
    /// Effect name used in the per-artifact dedup key.
    #[must_use]
    pub const fn effect(&self) -> &'static str {
        match self {
            Self::FundsSecured { captured: false } => "authorized",
            Self::FundsSecured { captured: true } => "captured",
            Self::PaymentFailed => "failed",
            Self::AuthorizationExpired => "expired",
        }
    }
}

/// A recognised gateway event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayEvent {
    /// Gateway event id.
    pub id: String,
    /// Gateway event type, e.g. `payment_intent.succeeded`.
    pub event_type: String,
    /// What happened to the payment.
    pub signal: PaymentSignal,
    /// The payment the event reports on: the intent id when known, the
    /// checkout session id otherwise.
    pub artifact_id: String,
    /// Booking named in the event metadata.
    pub booking_id: Option<BookingId>,
    /// Payment intent id, when the event carries one.
    pub payment_intent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: RawData,
}

#[derive(Debug, Default, Deserialize)]
struct RawData {
    #[serde(default)]
    object: Value,
}

#[derive(Debug, Deserialize)]
struct RawObject {
    id: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
    #[serde(default)]
    payment_intent: Option<Value>,
    #[serde(default)]
    cancellation_reason: Option<String>,
    #[serde(default)]
    client_reference_id: Option<String>,
}

const HANDLED_TYPES: &[&str] = &[
    "checkout.session.completed",
    "checkout.session.expired",
    "payment_intent.amount_capturable_updated",
    "payment_intent.succeeded",
    "payment_intent.payment_failed",
    "payment_intent.canceled",
];

/// Parses a verified payload. `Ok(None)` means "not for us".
///
/// # Errors
///
/// [`BookingError::InvalidRequest`] if the payload is not a gateway event.
pub fn parse_event(payload: &[u8]) -> Result<Option<GatewayEvent>, BookingError> {
    let raw: RawEvent = serde_json::from_slice(payload)
        .map_err(|e| BookingError::InvalidRequest(format!("malformed webhook payload: {e}")))?;
    if !HANDLED_TYPES.contains(&raw.event_type.as_str()) {
        return Ok(None);
    }
    let object: RawObject = serde_json::from_value(raw.data.object).map_err(|e| {
        BookingError::InvalidRequest(format!("malformed {} object: {e}", raw.event_type))
    })?;

    let is_checkout = raw.event_type.starts_with("checkout.session.");
    let signal = match raw.event_type.as_str() {
        "checkout.session.completed" | "payment_intent.amount_capturable_updated" => {
            PaymentSignal::FundsSecured { captured: false }
        }
        "payment_intent.succeeded" => PaymentSignal::FundsSecured { captured: true },
        "payment_intent.canceled" => match object.cancellation_reason.as_deref() {
            Some("automatic" | "abandoned") => PaymentSignal::AuthorizationExpired,
            // Our own voids and any manual cancellation.
            _ => return Ok(None),
        },
        _ => PaymentSignal::PaymentFailed,
    };

    let payment_intent_id = if is_checkout {
        object.payment_intent.as_ref().and_then(intent_id)
    } else {
        Some(object.id.clone())
    };
    let booking_id = object
        .metadata
        .get("booking_id")
        .or(object.client_reference_id.as_ref())
        .and_then(|id| Uuid::parse_str(id).ok())
        .map(BookingId::from_uuid);

    Ok(Some(GatewayEvent {
        id: raw.id,
        event_type: raw.event_type,
        signal,
        artifact_id: payment_intent_id.clone().unwrap_or(object.id),
        booking_id,
        payment_intent_id,
    }))
}

/// `payment_intent` is an id string, or an object when expanded.
fn intent_id(value: &Value) -> Option<String> {
    value
        .as_str()
        .or_else(|| value.get("id").and_then(Value::as_str))
        .map(String::from)
}

/// Best-effort `id` and `type` of a payload that did not parse.
fn envelope_ids(payload: &[u8]) -> (String, String) {
    let value: Value = serde_json::from_slice(payload).unwrap_or(Value::Null);
    let field = |name: &str| {
        value
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string()
    };
    (field("id"), field("type"))
}

/// Entry point for signed gateway webhooks.
#[derive(Debug, Clone)]
pub struct WebhookDispatcher {
    orchestrator: PaymentOrchestrator,
    secret: String,
    tolerance_secs: i64,
}

impl WebhookDispatcher {
    /// Creates a dispatcher verifying with `secret`.
    #[must_use]
    pub fn new(orchestrator: PaymentOrchestrator, secret: String, tolerance_secs: i64) -> Self {
        Self {
            orchestrator,
            secret,
            tolerance_secs,
        }
    }

    /// Verifies, deduplicates and applies one delivery.
    ///
    /// # Errors
    ///
    /// [`BookingError::SignatureInvalid`] if verification fails (nothing is
    /// recorded), or a storage error from the dedup record. A signed body
    /// that does not parse and processing failures are not errors: they are
    /// recorded and yield [`WebhookOutcome::Failed`], since redelivery
    /// cannot fix them.
    pub async fn dispatch(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, BookingError> {
        let header = signature.ok_or_else(|| {
            BookingError::SignatureInvalid("missing signature header".to_string())
        })?;
        verify_webhook_signature(payload, header, &self.secret, self.tolerance_secs).map_err(
            |e| {
                tracing::warn!(error = %e, "webhook signature rejected");
                BookingError::SignatureInvalid(e.to_string())
            },
        )?;

        let event = match parse_event(payload) {
            Ok(Some(event)) => event,
            Ok(None) => {
                tracing::debug!("webhook ignored");
                return Ok(WebhookOutcome::Ignored);
            }
            Err(err) => {
                let (event_id, event_type) = envelope_ids(payload);
                self.record_failure(&event_id, &event_type, payload, None, &err)
                    .await;
                return Ok(WebhookOutcome::Failed);
            }
        };

        let store = self.orchestrator.bookings().store();
        if !store
            .record_idempotency_key(&format!("event:{}", event.id))
            .await?
        {
            tracing::info!(event_id = %event.id, "duplicate webhook event");
            return Ok(WebhookOutcome::Duplicate);
        }
        let artifact_key = format!("artifact:{}:{}", event.signal.effect(), event.artifact_id);
        if !store.record_idempotency_key(&artifact_key).await? {
            tracing::info!(
                event_id = %event.id,
                artifact_id = %event.artifact_id,
                "payment already reported by another event"
            );
            return Ok(WebhookOutcome::Duplicate);
        }

        let (booking, result) = self.apply(&event).await;
        match result {
            Ok(commit) => {
                tracing::info!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    booking_id = %commit.booking().id,
                    status = %commit.booking().status,
                    changed = commit.changed(),
                    "webhook applied"
                );
                Ok(WebhookOutcome::Applied)
            }
            Err(err) => {
                self.record_failure(
                    &event.id,
                    &event.event_type,
                    payload,
                    booking.as_ref(),
                    &err,
                )
                .await;
                Ok(WebhookOutcome::Failed)
            }
        }
    }

    async fn apply(&self, event: &GatewayEvent) -> (Option<Booking>, Result<Commit, BookingError>) {
        let booking = match self.resolve_booking(event).await {
            Ok(booking) => booking,
            Err(e) => return (None, Err(e)),
        };
        let result = match event.signal {
            PaymentSignal::FundsSecured { captured } => {
                self.orchestrator
                    .on_funds_secured(booking.id, captured, event.payment_intent_id.clone())
                    .await
            }
            PaymentSignal::PaymentFailed => self.orchestrator.on_payment_failed(booking.id).await,
            PaymentSignal::AuthorizationExpired => {
                self.orchestrator.on_authorization_expired(booking.id).await
            }
        };
        (Some(booking), result)
    }

    async fn resolve_booking(&self, event: &GatewayEvent) -> Result<Booking, BookingError> {
        let store = self.orchestrator.bookings().store();
        match event.booking_id {
            Some(id) => Ok(store.get_booking(id).await?),
            None => Ok(store.find_booking_by_payment_ref(&event.artifact_id).await?),
        }
    }

    async fn record_failure(
        &self,
        event_id: &str,
        event_type: &str,
        payload: &[u8],
        booking: Option<&Booking>,
        err: &BookingError,
    ) {
        tracing::error!(
            event_id,
            event_type,
            booking_id = ?booking.map(|b| b.id),
            error = %err,
            "webhook processing failed"
        );
        let failure = WebhookFailure {
            event_id: event_id.to_string(),
            event_type: event_type.to_string(),
            booking_id: booking.map(|b| b.id),
            reason: err.to_string(),
            payload: serde_json::from_slice(payload)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(payload).into_owned())),
            failed_at: Utc::now(),
        };
        let store = self.orchestrator.bookings().store();
        if let Err(e) = store.record_webhook_failure(&failure).await {
            tracing::error!(event_id, error = %e, "could not record webhook failure");
        }
        let _ = self
            .orchestrator
            .bookings()
            .event_bus()
            .publish(DomainEvent::WebhookFailed {
                event_id: event_id.to_string(),
                gateway_event_type: event_type.to_string(),
                provider_id: booking.map(|b| b.provider_id),
                reason: err.to_string(),
                timestamp: Utc::now(),
            });
    }
}
