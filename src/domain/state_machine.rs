//! Legal booking transitions.
//!
//! [`plan`] is a pure function over `(status, payment_status, event)`. It
//! decides whether an event moves a booking, is a repeat of a transition that
//! already happened, or is illegal. Persisting the decision is the caller's
//! job and must be a conditional update guarded by the `from` status.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::booking::{BookingStatus, PaymentStatus};
use crate::error::BookingError;

/// Something that can happen to a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BookingEvent {
    /// The gateway reports funds held (`captured = false`) or taken.
    PaymentSecured {
        /// Whether the funds were captured outright.
        captured: bool,
    },
    /// The gateway rejected the charge.
    PaymentFailed,
    /// The provider accepts the booking.
    ProviderAccept,
    /// The provider rejects the booking.
    ProviderDecline,
    /// The customer withdraws the booking.
    CustomerCancel,
    /// The payment hold lapsed before capture.
    AuthorizationExpired,
}

impl BookingEvent {
    /// Stable name, used in logs and idempotency keys.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::PaymentSecured { .. } => "payment_secured",
            Self::PaymentFailed => "payment_failed",
            Self::ProviderAccept => "accept",
            Self::ProviderDecline => "decline",
            Self::CustomerCancel => "cancel",
            Self::AuthorizationExpired => "authorization_expired",
        }
    }
}

impl fmt::Display for BookingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of planning an event against a booking's current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Persist `from -> to` with the given payment status.
    Apply {
        /// Status the conditional update must find.
        from: BookingStatus,
        /// Status to write.
        to: BookingStatus,
        /// Payment status to write alongside.
        payment_status: PaymentStatus,
    },
    /// The event was already applied; return the booking unchanged.
    AlreadyApplied,
}

/// Decides what `event` does to a booking in `status` / `payment`.
///
/// Decline and cancel keep the current payment status: releasing funds
/// happens after the status commit and records its own outcome.
///
/// # Errors
///
/// Returns [`BookingError::InvalidStateTransition`] when the event is not
/// legal from the current state and is not a repeat of an applied one.
pub fn plan(
    status: BookingStatus,
    payment: PaymentStatus,
    event: BookingEvent,
) -> Result<Transition, BookingError> {
    use BookingStatus as S;

    let apply = |to, payment_status| Transition::Apply {
        from: status,
        to,
        payment_status,
    };

    let outcome = match (event, status) {
        (BookingEvent::PaymentSecured { captured }, S::AwaitingPayment) => {
            let secured = if captured {
                PaymentStatus::Captured
            } else {
                PaymentStatus::Authorized
            };
            Some(apply(S::PendingAcceptance, secured))
        }
        (BookingEvent::PaymentSecured { .. }, S::PendingAcceptance | S::Confirmed) => {
            Some(Transition::AlreadyApplied)
        }

        (BookingEvent::PaymentFailed, S::AwaitingPayment) => {
            if payment == PaymentStatus::Failed {
                Some(Transition::AlreadyApplied)
            } else {
                Some(apply(S::AwaitingPayment, PaymentStatus::Failed))
            }
        }

        (BookingEvent::ProviderAccept, S::PendingAcceptance) if payment.funds_secured() => {
            Some(apply(S::Confirmed, PaymentStatus::Captured))
        }
        (BookingEvent::ProviderAccept, S::Confirmed) => Some(Transition::AlreadyApplied),

        (BookingEvent::ProviderDecline, S::PendingAcceptance) if payment.funds_secured() => {
            Some(apply(S::Declined, payment))
        }
        (BookingEvent::ProviderDecline, S::Declined) => Some(Transition::AlreadyApplied),

        (BookingEvent::CustomerCancel, S::AwaitingPayment | S::PendingAcceptance) => {
            Some(apply(S::Cancelled, payment))
        }
        (BookingEvent::CustomerCancel, S::Cancelled) => Some(Transition::AlreadyApplied),

        (BookingEvent::AuthorizationExpired, S::PendingAcceptance) => {
            Some(apply(S::Expired, PaymentStatus::Failed))
        }
        // A hold that lapses before it was ever reported secured leaves the
        // booking unpaid; the customer can start a new payment.
        (BookingEvent::AuthorizationExpired, S::AwaitingPayment) => {
            if payment == PaymentStatus::Failed {
                Some(Transition::AlreadyApplied)
            } else {
                Some(apply(S::AwaitingPayment, PaymentStatus::Failed))
            }
        }
        (BookingEvent::AuthorizationExpired, S::Expired) => Some(Transition::AlreadyApplied),

        _ => None,
    };

    outcome.ok_or(BookingError::InvalidStateTransition {
        from: status,
        event: event.name(),
    })
}
