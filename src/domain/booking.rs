//! Booking aggregate and the read-only catalog records it is built from.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::interval::TimeInterval;
use super::{BookingId, CustomerId, ProviderId, ServiceId};
use crate::error::BookingError;

/// Lifecycle state of a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// Created, no funds committed yet.
    AwaitingPayment,
    /// Funds authorized or captured, awaiting the provider's decision.
    PendingAcceptance,
    /// Accepted by the provider. Terminal.
    Confirmed,
    /// Rejected by the provider. Terminal.
    Declined,
    /// Withdrawn by the customer. Terminal.
    Cancelled,
    /// The payment hold lapsed before capture. Terminal.
    Expired,
}

impl BookingStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 6] = [
        Self::AwaitingPayment,
        Self::PendingAcceptance,
        Self::Confirmed,
        Self::Declined,
        Self::Cancelled,
        Self::Expired,
    ];

    /// Database / wire representation.
    #[must_use]
    pub const fn as_db(&self) -> &'static str {
        match self {
            Self::AwaitingPayment => "awaiting_payment",
            Self::PendingAcceptance => "pending_acceptance",
            Self::Confirmed => "confirmed",
            Self::Declined => "declined",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }

    /// Statuses that participate in provider scheduling.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::PendingAcceptance | Self::Confirmed)
    }

    /// No further transitions are possible from a terminal status.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Confirmed | Self::Declined | Self::Cancelled | Self::Expired
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db())
    }
}

impl FromStr for BookingStatus {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_db() == s)
            .ok_or_else(|| BookingError::Internal(format!("unknown booking status: {s}")))
    }
}

/// State of the money attached to a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// No payment artifact created yet.
    Unpaid,
    /// A payment intent or checkout session exists; customer has not paid.
    Pending,
    /// Funds held on the customer's card, not yet captured.
    Authorized,
    /// Funds captured.
    Captured,
    /// Hold voided without capture.
    Released,
    /// Captured funds returned to the customer.
    Refunded,
    /// The gateway rejected the charge or the hold lapsed.
    Failed,
}

impl PaymentStatus {
    /// Every payment status.
    pub const ALL: [Self; 7] = [
        Self::Unpaid,
        Self::Pending,
        Self::Authorized,
        Self::Captured,
        Self::Released,
        Self::Refunded,
        Self::Failed,
    ];

    /// Database / wire representation.
    #[must_use]
    pub const fn as_db(&self) -> &'static str {
        match self {
            Self::Unpaid => "unpaid",
            Self::Pending => "pending",
            Self::Authorized => "authorized",
            Self::Captured => "captured",
            Self::Released => "released",
            Self::Refunded => "refunded",
            Self::Failed => "failed",
        }
    }

    /// `true` once the gateway has reported the funds as held or taken.
    #[must_use]
    pub const fn funds_secured(&self) -> bool {
        matches!(self, Self::Authorized | Self::Captured)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db())
    }
}

impl FromStr for PaymentStatus {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_db() == s)
            .ok_or_else(|| BookingError::Internal(format!("unknown payment status: {s}")))
    }
}

/// A reservation of a provider's time slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Booking {
    /// Unique booking identifier (immutable after creation).
    pub id: BookingId,
    /// Customer who requested the slot.
    pub customer_id: CustomerId,
    /// Provider whose schedule the slot occupies.
    pub provider_id: ProviderId,
    /// Service the slot was booked for, if any.
    pub service_id: Option<ServiceId>,
    /// Calendar date of the slot.
    pub date: NaiveDate,
    /// Inclusive slot start.
    pub time_start: NaiveTime,
    /// Exclusive slot end.
    pub time_end: NaiveTime,
    /// Lifecycle state.
    pub status: BookingStatus,
    /// Payment state.
    pub payment_status: PaymentStatus,
    /// Service price snapshot in minor currency units.
    pub service_price_cents: i64,
    /// Platform fee in minor currency units.
    pub platform_fee_cents: i64,
    /// Amount charged to the customer in minor currency units.
    pub total_cents: i64,
    /// ISO 4217 currency code, lowercase.
    pub currency: String,
    /// Gateway payment intent, once one exists.
    pub payment_intent_id: Option<String>,
    /// Gateway hosted checkout session, once one exists.
    pub checkout_session_id: Option<String>,
    /// Number of payment attempts that ended in failure. Part of the
    /// idempotency key for re-initiated payments.
    pub failed_payment_attempts: i32,
    /// Decline or cancellation reason.
    pub reason: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Creates a booking in `AwaitingPayment` / `Unpaid` from a validated request.
    #[must_use]
    pub fn new(draft: NewBooking) -> Self {
        let now = Utc::now();
        Self {
            id: BookingId::new(),
            customer_id: draft.customer_id,
            provider_id: draft.provider_id,
            service_id: draft.service_id,
            date: draft.date,
            time_start: draft.time_start,
            time_end: draft.time_end,
            status: BookingStatus::AwaitingPayment,
            payment_status: PaymentStatus::Unpaid,
            service_price_cents: draft.service_price_cents,
            platform_fee_cents: draft.platform_fee_cents,
            total_cents: draft.service_price_cents + draft.platform_fee_cents,
            currency: draft.currency,
            payment_intent_id: None,
            checkout_session_id: None,
            failed_payment_attempts: 0,
            reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The half-open interval this booking occupies.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::InvalidRequest`] if the stored times are
    /// inverted, which the create path never allows.
    pub fn interval(&self) -> Result<TimeInterval, BookingError> {
        TimeInterval::on_date(self.date, self.time_start, self.time_end)
    }

    /// Gateway artifact that currently owns this booking's money movement.
    ///
    /// A payment intent wins over a checkout session: completed sessions
    /// report their underlying intent, which is what capture and refund act on.
    #[must_use]
    pub fn payment_ref(&self) -> Option<&str> {
        self.payment_intent_id
            .as_deref()
            .or(self.checkout_session_id.as_deref())
    }
}

/// Validated, priced input for [`Booking::new`].
#[derive(Debug, Clone)]
pub struct NewBooking {
    /// Requesting customer.
    pub customer_id: CustomerId,
    /// Target provider.
    pub provider_id: ProviderId,
    /// Optional service snapshot source.
    pub service_id: Option<ServiceId>,
    /// Slot date.
    pub date: NaiveDate,
    /// Slot start.
    pub time_start: NaiveTime,
    /// Slot end.
    pub time_end: NaiveTime,
    /// Resolved service price.
    pub service_price_cents: i64,
    /// Resolved platform fee.
    pub platform_fee_cents: i64,
    /// Currency code.
    pub currency: String,
}

/// A provider's offering, read from the catalog at booking time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceOffering {
    /// Service identifier.
    pub id: ServiceId,
    /// Owning provider.
    pub provider_id: ProviderId,
    /// Price in minor currency units.
    pub price_cents: i64,
    /// Default slot length.
    pub duration_minutes: i32,
    /// Inactive services cannot be booked.
    pub active: bool,
}

/// A provider's payout sub-account at the payment gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutAccount {
    /// Provider owning the account.
    pub provider_id: ProviderId,
    /// Gateway account identifier (destination of charges).
    pub account_id: String,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn status_db_round_trip() {
        for status in BookingStatus::ALL {
            let Ok(parsed) = status.as_db().parse::<BookingStatus>() else {
                panic!("{status} should parse");
            };
            assert_eq!(parsed, status);
        }
        assert!("accepted".parse::<BookingStatus>().is_err());
    }

    #[test]
    fn active_set_is_pending_and_confirmed() {
        let active: Vec<_> = BookingStatus::ALL
            .into_iter()
            .filter(BookingStatus::is_active)
            .collect();
        assert_eq!(
            active,
            vec![BookingStatus::PendingAcceptance, BookingStatus::Confirmed]
        );
    }

    #[test]
    fn funds_secured_only_for_authorized_and_captured() {
        for status in PaymentStatus::ALL {
            let expected = matches!(status, PaymentStatus::Authorized | PaymentStatus::Captured);
            assert_eq!(status.funds_secured(), expected, "{status}");
        }
    }

    #[test]
    fn new_booking_totals_price_and_fee() {
        let Some(date) = NaiveDate::from_ymd_opt(2026, 1, 15) else {
            panic!("valid date");
        };
        let (Some(start), Some(end)) = (
            NaiveTime::from_hms_opt(14, 0, 0),
            NaiveTime::from_hms_opt(15, 0, 0),
        ) else {
            panic!("valid times");
        };
        let booking = Booking::new(NewBooking {
            customer_id: CustomerId::new(),
            provider_id: ProviderId::new(),
            service_id: None,
            date,
            time_start: start,
            time_end: end,
            service_price_cents: 10_000,
            platform_fee_cents: 1_000,
            currency: "usd".to_string(),
        });
        assert_eq!(booking.total_cents, 11_000);
        assert_eq!(booking.status, BookingStatus::AwaitingPayment);
        assert_eq!(booking.payment_status, PaymentStatus::Unpaid);
        assert!(booking.payment_ref().is_none());
    }
}
