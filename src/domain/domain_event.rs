//! Domain events reflecting booking and payment state changes.
//!
//! Every committed transition, and every money-moving failure that needs a
//! human, emits a [`DomainEvent`] through the [`super::EventBus`]. The
//! operator WebSocket feed subscribes to these.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{BookingId, BookingStatus, CustomerId, ProviderId};

/// Domain event emitted after a booking mutation or an operator-relevant failure.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A booking row was inserted.
    BookingCreated {
        /// Booking identifier.
        booking_id: BookingId,
        /// Provider whose schedule the booking targets.
        provider_id: ProviderId,
        /// Requesting customer.
        customer_id: CustomerId,
        /// Amount to be charged, minor units.
        total_cents: i64,
        /// Creation timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A booking moved between lifecycle states.
    BookingTransitioned {
        /// Booking identifier.
        booking_id: BookingId,
        /// Provider of the booking.
        provider_id: ProviderId,
        /// Previous status.
        from: BookingStatus,
        /// New status.
        to: BookingStatus,
        /// Name of the event that caused the move.
        cause: &'static str,
        /// Commit timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A payment intent or checkout session was created for a booking.
    PaymentInitiated {
        /// Booking identifier.
        booking_id: BookingId,
        /// Provider of the booking.
        provider_id: ProviderId,
        /// Gateway artifact id.
        artifact_id: String,
        /// Timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Money is in a state that needs manual follow-up.
    ReconciliationRequired {
        /// Booking identifier.
        booking_id: BookingId,
        /// Provider of the booking.
        provider_id: ProviderId,
        /// Gateway operation that failed (`capture`, `release`, ...).
        operation: &'static str,
        /// Failure description.
        reason: String,
        /// Timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A verified webhook could not be applied.
    WebhookFailed {
        /// Gateway event id.
        event_id: String,
        /// Gateway event type.
        gateway_event_type: String,
        /// Provider of the affected booking, when it could be resolved.
        provider_id: Option<ProviderId>,
        /// Failure description.
        reason: String,
        /// Timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Returns the provider this event concerns, if known.
    #[must_use]
    pub fn provider_id(&self) -> Option<ProviderId> {
        match self {
            Self::BookingCreated { provider_id, .. }
            | Self::BookingTransitioned { provider_id, .. }
            | Self::PaymentInitiated { provider_id, .. }
            | Self::ReconciliationRequired { provider_id, .. } => Some(*provider_id),
            Self::WebhookFailed { provider_id, .. } => *provider_id,
        }
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::BookingCreated { .. } => "booking_created",
            Self::BookingTransitioned { .. } => "booking_transitioned",
            Self::PaymentInitiated { .. } => "payment_initiated",
            Self::ReconciliationRequired { .. } => "reconciliation_required",
            Self::WebhookFailed { .. } => "webhook_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitioned_serializes_with_tag() {
        let event = DomainEvent::BookingTransitioned {
            booking_id: BookingId::new(),
            provider_id: ProviderId::new(),
            from: BookingStatus::PendingAcceptance,
            to: BookingStatus::Confirmed,
            cause: "accept",
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap_or_default();
        assert!(json.contains("\"event_type\":\"booking_transitioned\""));
        assert!(json.contains("\"to\":\"confirmed\""));
    }

    #[test]
    fn webhook_failure_may_lack_provider() {
        let event = DomainEvent::WebhookFailed {
            event_id: "evt_1".to_string(),
            gateway_event_type: "payment_intent.succeeded".to_string(),
            provider_id: None,
            reason: "booking not found".to_string(),
            timestamp: Utc::now(),
        };
        assert_eq!(event.provider_id(), None);
        assert_eq!(event.event_type_str(), "webhook_failed");
    }
}
