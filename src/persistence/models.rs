//! Storage models: write descriptors and database rows.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::StoreError;
use crate::domain::{
    Booking, BookingId, BookingStatus, CustomerId, PaymentStatus, ProviderId, ServiceId,
};

/// A guarded status transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    /// Status the row must currently have.
    pub expected: BookingStatus,
    /// Status to write.
    pub status: BookingStatus,
    /// Payment status to write.
    pub payment_status: PaymentStatus,
    /// Decline / cancel reason; `None` keeps the stored value.
    pub reason: Option<String>,
    /// Payment intent id reported by the gateway; `None` keeps the stored value.
    pub payment_intent_id: Option<String>,
    /// Increment `failed_payment_attempts`.
    pub count_failed_attempt: bool,
}

impl StatusUpdate {
    /// A plain `expected -> status` move with a new payment status.
    #[must_use]
    pub fn new(expected: BookingStatus, status: BookingStatus, payment_status: PaymentStatus) -> Self {
        Self {
            expected,
            status,
            payment_status,
            reason: None,
            payment_intent_id: None,
            count_failed_attempt: false,
        }
    }
}

/// Gateway artifact ids to attach to a booking when payment starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentArtifact {
    /// Payment intent id.
    pub payment_intent_id: Option<String>,
    /// Checkout session id.
    pub checkout_session_id: Option<String>,
}

/// A verified webhook that could not be applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookFailure {
    /// Gateway event id.
    pub event_id: String,
    /// Gateway event type.
    pub event_type: String,
    /// Affected booking, if it could be resolved.
    pub booking_id: Option<BookingId>,
    /// Failure description.
    pub reason: String,
    /// Raw event payload, for replay.
    pub payload: serde_json::Value,
    /// When the failure was recorded.
    pub failed_at: DateTime<Utc>,
}

/// Column list shared by every query returning a booking row.
pub(crate) const BOOKING_COLUMNS: &str = "id, customer_id, provider_id, service_id, date, \
     time_start, time_end, status, payment_status, service_price_cents, platform_fee_cents, \
     total_cents, currency, payment_intent_id, checkout_session_id, failed_payment_attempts, \
     reason, created_at, updated_at";

/// A row of the `bookings` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BookingRow {
    /// Primary key.
    pub id: Uuid,
    /// Customer reference.
    pub customer_id: Uuid,
    /// Provider reference.
    pub provider_id: Uuid,
    /// Service reference.
    pub service_id: Option<Uuid>,
    /// Slot date.
    pub date: NaiveDate,
    /// Slot start.
    pub time_start: NaiveTime,
    /// Slot end.
    pub time_end: NaiveTime,
    /// Status as text.
    pub status: String,
    /// Payment status as text.
    pub payment_status: String,
    /// Price snapshot.
    pub service_price_cents: i64,
    /// Platform fee.
    pub platform_fee_cents: i64,
    /// Total charge.
    pub total_cents: i64,
    /// Currency code.
    pub currency: String,
    /// Payment intent id.
    pub payment_intent_id: Option<String>,
    /// Checkout session id.
    pub checkout_session_id: Option<String>,
    /// Failed payment attempts.
    pub failed_payment_attempts: i32,
    /// Decline / cancel reason.
    pub reason: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<BookingStatus>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let payment_status = row
            .payment_status
            .parse::<PaymentStatus>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        Ok(Self {
            id: BookingId::from_uuid(row.id),
            customer_id: CustomerId::from_uuid(row.customer_id),
            provider_id: ProviderId::from_uuid(row.provider_id),
            service_id: row.service_id.map(ServiceId::from_uuid),
            date: row.date,
            time_start: row.time_start,
            time_end: row.time_end,
            status,
            payment_status,
            service_price_cents: row.service_price_cents,
            platform_fee_cents: row.platform_fee_cents,
            total_cents: row.total_cents,
            currency: row.currency,
            payment_intent_id: row.payment_intent_id,
            checkout_session_id: row.checkout_session_id,
            failed_payment_attempts: row.failed_payment_attempts,
            reason: row.reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn row(status: &str) -> BookingRow {
        let (Some(date), Some(start), Some(end)) = (
            NaiveDate::from_ymd_opt(2026, 1, 15),
            NaiveTime::from_hms_opt(14, 0, 0),
            NaiveTime::from_hms_opt(15, 0, 0),
        ) else {
            panic!("valid date/time");
        };
        BookingRow {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            provider_id: Uuid::new_v4(),
            service_id: None,
            date,
            time_start: start,
            time_end: end,
            status: status.to_string(),
            payment_status: "authorized".to_string(),
            service_price_cents: 5_000,
            platform_fee_cents: 500,
            total_cents: 5_500,
            currency: "usd".to_string(),
            payment_intent_id: Some("pi_123".to_string()),
            checkout_session_id: None,
            failed_payment_attempts: 0,
            reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn row_converts_to_booking() {
        let Ok(booking) = Booking::try_from(row("pending_acceptance")) else {
            panic!("row should convert");
        };
        assert_eq!(booking.status, BookingStatus::PendingAcceptance);
        assert_eq!(booking.payment_status, PaymentStatus::Authorized);
        assert_eq!(booking.payment_ref(), Some("pi_123"));
    }

    #[test]
    fn unknown_status_is_corrupt() {
        assert!(matches!(
            Booking::try_from(row("accepted")),
            Err(StoreError::Corrupt(_))
        ));
    }
}
