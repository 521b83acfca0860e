//! Payment orchestration: ties gateway money movement to booking transitions.
//!
//! Every gateway call carries an idempotency key derived from the booking id
//! and the operation, so client retries and webhook redelivery cause at most
//! one financial effect. Capture happens before the accept commit; releases
//! happen after the decline / cancel commit and never block it.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::booking_service::{
    BookingService, Commit, CommitDetails, ensure_customer, ensure_provider,
};
use crate::domain::state_machine::{self, BookingEvent, Transition};
use crate::domain::{ActorId, Booking, BookingId, BookingStatus, DomainEvent, PaymentStatus};
use crate::error::BookingError;
use crate::payment::{
    ChargeRequest, PaymentGateway, PaymentGatewayError, RetryPolicy, SessionRequest,
};
use crate::persistence::{PaymentArtifact, StoreError};

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    /// Manual-capture payment intent confirmed client-side.
    Intent,
    /// Gateway-hosted checkout page.
    Checkout,
}

impl PaymentMode {
    const fn key_verb(self) -> &'static str {
        match self {
            Self::Intent => "authorize",
            Self::Checkout => "checkout",
        }
    }
}

/// Redirect targets for hosted checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutUrls {
    /// Where the gateway sends the customer after paying.
    pub success_url: String,
    /// Where the gateway sends the customer after abandoning.
    pub cancel_url: String,
}

/// What the client needs to complete a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSession {
    /// The booking with the artifact attached.
    pub booking: Booking,
    /// Mode used.
    pub mode: PaymentMode,
    /// Intent or session id.
    pub artifact_id: String,
    /// Client secret (intent mode).
    pub client_secret: Option<String>,
    /// Hosted page URL (checkout mode).
    pub checkout_url: Option<String>,
}

/// Drives payment-dependent transitions.
#[derive(Debug, Clone)]
pub struct PaymentOrchestrator {
    bookings: BookingService,
    gateway: Arc<dyn PaymentGateway>,
    retry: RetryPolicy,
    checkout: CheckoutUrls,
}

impl PaymentOrchestrator {
    /// Creates a new `PaymentOrchestrator`.
    #[must_use]
    pub fn new(
        bookings: BookingService,
        gateway: Arc<dyn PaymentGateway>,
        retry: RetryPolicy,
        checkout: CheckoutUrls,
    ) -> Self {
        Self {
            bookings,
            gateway,
            retry,
            checkout,
        }
    }

    /// Returns the booking service this orchestrator commits through.
    #[must_use]
    pub fn bookings(&self) -> &BookingService {
        &self.bookings
    }

    /// Creates a payment intent or checkout session for an unpaid booking.
    ///
    /// The amount is the booking's stored total. Repeating the call before
    /// a payment failure returns the same artifact.
    ///
    /// # Errors
    ///
    /// [`BookingError::PermissionDenied`] unless `actor` is the customer,
    /// [`BookingError::InvalidStateTransition`] if the booking is not
    /// awaiting payment, [`BookingError::PayoutAccountMissing`] if the
    /// provider cannot receive funds, or a translated gateway error.
    pub async fn initiate_payment(
        &self,
        actor: ActorId,
        booking_id: BookingId,
        mode: PaymentMode,
    ) -> Result<PaymentSession, BookingError> {
        let store = self.bookings.store();
        let booking = store.get_booking(booking_id).await?;
        ensure_customer(&booking, actor)?;

        let payable = matches!(
            booking.payment_status,
            PaymentStatus::Unpaid | PaymentStatus::Pending | PaymentStatus::Failed
        );
        if booking.status != BookingStatus::AwaitingPayment || !payable {
            return Err(BookingError::InvalidStateTransition {
                from: booking.status,
                event: "initiate_payment",
            });
        }
        if booking.payment_status == PaymentStatus::Pending {
            let open_other = match mode {
                PaymentMode::Intent => {
                    booking.checkout_session_id.is_some() && booking.payment_intent_id.is_none()
                }
                PaymentMode::Checkout => {
                    booking.payment_intent_id.is_some() && booking.checkout_session_id.is_none()
                }
            };
            if open_other {
                return Err(BookingError::InvalidRequest(format!(
                    "booking {booking_id} already has an open payment of another kind"
                )));
            }
        }

        let payout = store
            .get_payout_account(booking.provider_id)
            .await?
            .ok_or(BookingError::PayoutAccountMissing(booking.provider_id))?;

        let charge = ChargeRequest {
            booking_id,
            amount_cents: booking.total_cents,
            currency: booking.currency.clone(),
            destination_account: payout.account_id,
            application_fee_cents: booking.platform_fee_cents,
            idempotency_key: payment_key(
                booking_id,
                mode.key_verb(),
                booking.failed_payment_attempts,
            ),
        };

        let (artifact, artifact_id, client_secret, checkout_url) = match mode {
            PaymentMode::Intent => {
                let payment = self
                    .retry
                    .run("authorize", || self.gateway.authorize(&charge))
                    .await?;
                let artifact = PaymentArtifact {
                    payment_intent_id: Some(payment.id.clone()),
                    checkout_session_id: None,
                };
                (artifact, payment.id, payment.client_secret, None)
            }
            PaymentMode::Checkout => {
                let request = SessionRequest {
                    charge: charge.clone(),
                    success_url: self.checkout.success_url.clone(),
                    cancel_url: self.checkout.cancel_url.clone(),
                };
                let session = self
                    .retry
                    .run("create_hosted_session", || {
                        self.gateway.create_hosted_session(&request)
                    })
                    .await?;
                let artifact = PaymentArtifact {
                    payment_intent_id: None,
                    checkout_session_id: Some(session.id.clone()),
                };
                (artifact, session.id, None, Some(session.url))
            }
        };

        let booking = match store.attach_payment_artifact(booking_id, &artifact).await {
            Ok(booking) => booking,
            Err(StoreError::StaleState { current }) => {
                // Cancelled while we were talking to the gateway.
                let key = format!("booking:{booking_id}:void:{artifact_id}");
                if let Err(e) = self.gateway.cancel(&artifact_id, &key).await {
                    self.reconciliation(&booking, "void", &e);
                }
                return Err(BookingError::InvalidStateTransition {
                    from: current,
                    event: "initiate_payment",
                });
            }
            Err(e) => return Err(e.into()),
        };

        let _ = self
            .bookings
            .event_bus()
            .publish(DomainEvent::PaymentInitiated {
                booking_id,
                provider_id: booking.provider_id,
                artifact_id: artifact_id.clone(),
                timestamp: Utc::now(),
            });
        tracing::info!(
            %booking_id,
            ?mode,
            %artifact_id,
            amount_cents = charge.amount_cents,
            "payment initiated"
        );

        Ok(PaymentSession {
            booking,
            mode,
            artifact_id,
            client_secret,
            checkout_url,
        })
    }

    /// The gateway reports funds held or captured.
    ///
    /// A booking that already ended (declined, cancelled, expired) does not
    /// come back to life: the late funds are released instead.
    ///
    /// # Errors
    ///
    /// [`BookingError::ResourceMissing`] or a commit error.
    pub async fn on_funds_secured(
        &self,
        booking_id: BookingId,
        captured: bool,
        payment_intent_id: Option<String>,
    ) -> Result<Commit, BookingError> {
        let booking = self.bookings.store().get_booking(booking_id).await?;
        if booking.status.is_terminal() && booking.status != BookingStatus::Confirmed {
            let booking = self
                .release_late_funds(booking, captured, payment_intent_id.as_deref())
                .await;
            return Ok(Commit::Unchanged(booking));
        }
        self.bookings
            .apply(
                &booking,
                BookingEvent::PaymentSecured { captured },
                CommitDetails {
                    payment_intent_id,
                    ..CommitDetails::default()
                },
            )
            .await
    }

    /// The gateway rejected the charge; the booking stays unpaid.
    ///
    /// # Errors
    ///
    /// [`BookingError::ResourceMissing`] or a commit error.
    pub async fn on_payment_failed(&self, booking_id: BookingId) -> Result<Commit, BookingError> {
        let booking = self.bookings.store().get_booking(booking_id).await?;
        let commit = self
            .bookings
            .apply(
                &booking,
                BookingEvent::PaymentFailed,
                CommitDetails {
                    count_failed_attempt: true,
                    ..CommitDetails::default()
                },
            )
            .await?;
        if commit.changed() {
            tracing::warn!(%booking_id, "payment failed");
        }
        Ok(commit)
    }

    /// The hold lapsed before capture.
    ///
    /// # Errors
    ///
    /// [`BookingError::ResourceMissing`] or a commit error.
    pub async fn on_authorization_expired(
        &self,
        booking_id: BookingId,
    ) -> Result<Commit, BookingError> {
        let booking = self.bookings.store().get_booking(booking_id).await?;
        self.expire(&booking).await
    }

    /// Provider accepts: capture if only authorized, then commit `Confirmed`.
    ///
    /// # Errors
    ///
    /// [`BookingError::BookingConflict`] if a confirmed booking overlaps,
    /// [`BookingError::PaymentAuthorizationExpired`] if the hold lapsed (the
    /// booking is then `Expired`), [`BookingError::PaymentFailed`] for other
    /// capture rejections, [`BookingError::UpstreamUnavailable`] when the
    /// gateway stays unreachable, [`BookingError::InvalidStateTransition`]
    /// if the booking cannot be accepted.
    pub async fn accept_booking(
        &self,
        actor: ActorId,
        booking_id: BookingId,
    ) -> Result<Booking, BookingError> {
        let booking = self.bookings.store().get_booking(booking_id).await?;
        ensure_provider(&booking, actor)?;

        if state_machine::plan(
            booking.status,
            booking.payment_status,
            BookingEvent::ProviderAccept,
        )? == Transition::AlreadyApplied
        {
            return Ok(booking);
        }

        let interval = booking.interval()?;
        self.bookings
            .conflicts()
            .ensure_free(booking.provider_id, &interval, Some(booking_id))
            .await?;

        let captured_now = booking.payment_status == PaymentStatus::Authorized;
        if captured_now {
            self.capture(&booking).await?;
        }

        match self
            .bookings
            .apply(&booking, BookingEvent::ProviderAccept, CommitDetails::default())
            .await
        {
            Ok(commit) => Ok(commit.into_booking()),
            Err(err @ BookingError::BookingConflict(_)) if captured_now => {
                self.refund_lost_slot(&booking).await;
                Err(err)
            }
            Err(err) => {
                if captured_now {
                    tracing::error!(
                        %booking_id,
                        reconciliation = true,
                        error = %err,
                        "funds captured but accept did not commit"
                    );
                    self.publish_reconciliation(&booking, "capture", err.to_string());
                }
                Err(err)
            }
        }
    }

    /// Provider declines; held funds are released afterwards.
    ///
    /// # Errors
    ///
    /// [`BookingError::PermissionDenied`] unless `actor` is the provider,
    /// [`BookingError::InvalidStateTransition`] if the booking is unpaid or final.
    pub async fn decline_booking(
        &self,
        actor: ActorId,
        booking_id: BookingId,
        reason: Option<String>,
    ) -> Result<Booking, BookingError> {
        let booking = self.bookings.store().get_booking(booking_id).await?;
        ensure_provider(&booking, actor)?;
        self.close(&booking, BookingEvent::ProviderDecline, reason)
            .await
    }

    /// Customer cancels; held funds are released afterwards.
    ///
    /// # Errors
    ///
    /// [`BookingError::PermissionDenied`] unless `actor` is the customer,
    /// [`BookingError::InvalidStateTransition`] if the booking is final.
    pub async fn cancel_booking(
        &self,
        actor: ActorId,
        booking_id: BookingId,
        reason: Option<String>,
    ) -> Result<Booking, BookingError> {
        let booking = self.bookings.store().get_booking(booking_id).await?;
        ensure_customer(&booking, actor)?;
        self.close(&booking, BookingEvent::CustomerCancel, reason)
            .await
    }

    async fn close(
        &self,
        booking: &Booking,
        event: BookingEvent,
        reason: Option<String>,
    ) -> Result<Booking, BookingError> {
        let commit = self
            .bookings
            .apply(
                booking,
                event,
                CommitDetails {
                    reason,
                    ..CommitDetails::default()
                },
            )
            .await?;
        match commit {
            Commit::Applied(closed) => Ok(self.release_funds(closed).await),
            Commit::Unchanged(current) => Ok(current),
        }
    }

    async fn capture(&self, booking: &Booking) -> Result<(), BookingError> {
        let reference = booking.payment_ref().ok_or_else(|| {
            BookingError::Internal(format!("booking {} is authorized without a payment", booking.id))
        })?;
        let key = format!("booking:{}:capture", booking.id);
        match self
            .retry
            .run("capture", || self.gateway.capture(reference, &key))
            .await
        {
            Ok(()) => {
                tracing::info!(booking_id = %booking.id, %reference, "funds captured");
                Ok(())
            }
            Err(PaymentGatewayError::AuthorizationExpired(msg)) => {
                tracing::warn!(booking_id = %booking.id, %reference, "authorization expired before capture");
                if let Err(e) = self.expire(booking).await {
                    tracing::error!(booking_id = %booking.id, error = %e, "could not mark booking expired");
                }
                Err(BookingError::PaymentAuthorizationExpired(msg))
            }
            Err(e @ PaymentGatewayError::Transient(_)) => Err(e.into()),
            Err(e) => {
                self.reconciliation(booking, "capture", &e);
                Err(e.into())
            }
        }
    }

    /// Funds were captured but another booking took the slot first. The
    /// booking stays pending with its money returned; if the refund fails the
    /// capture is recorded so a later decline or cancel retries it.
    async fn refund_lost_slot(&self, booking: &Booking) {
        let Some(reference) = booking.payment_ref() else {
            return;
        };
        let key = format!("booking:{}:conflict-refund", booking.id);
        let refunded = self
            .retry
            .run("refund", || self.gateway.refund(reference, &key))
            .await;
        match refunded {
            Ok(()) => {
                tracing::warn!(
                    booking_id = %booking.id,
                    %reference,
                    "slot taken after capture, funds refunded"
                );
                self.record_payment_status(booking.clone(), PaymentStatus::Refunded)
                    .await;
            }
            Err(e) => {
                self.record_payment_status(booking.clone(), PaymentStatus::Captured)
                    .await;
                self.reconciliation(booking, "conflict-refund", &e);
            }
        }
    }

    async fn expire(&self, booking: &Booking) -> Result<Commit, BookingError> {
        self.bookings
            .apply(
                booking,
                BookingEvent::AuthorizationExpired,
                CommitDetails {
                    count_failed_attempt: true,
                    ..CommitDetails::default()
                },
            )
            .await
    }

    /// Voids or refunds whatever the closed booking holds. Never fails: a
    /// gateway error is logged for manual follow-up and the booking returned
    /// as committed.
    async fn release_funds(&self, booking: Booking) -> Booking {
        let Some(reference) = booking.payment_ref().map(str::to_string) else {
            return booking;
        };
        let key = format!("booking:{}:release", booking.id);
        let (result, released) = match booking.payment_status {
            PaymentStatus::Authorized => (
                self.retry
                    .run("cancel", || self.gateway.cancel(&reference, &key))
                    .await,
                Some(PaymentStatus::Released),
            ),
            PaymentStatus::Captured => (
                self.retry
                    .run("refund", || self.gateway.refund(&reference, &key))
                    .await,
                Some(PaymentStatus::Refunded),
            ),
            // Close the open intent or session so the customer cannot pay
            // for a booking that no longer exists.
            PaymentStatus::Pending => {
                let key = format!("booking:{}:void", booking.id);
                (
                    self.retry
                        .run("cancel", || self.gateway.cancel(&reference, &key))
                        .await,
                    None,
                )
            }
            _ => return booking,
        };

        if let Err(e) = result {
            self.reconciliation(&booking, "release", &e);
            return booking;
        }
        tracing::info!(booking_id = %booking.id, %reference, "payment released");
        let Some(status) = released else {
            return booking;
        };
        self.record_payment_status(booking, status).await
    }

    async fn release_late_funds(
        &self,
        booking: Booking,
        captured: bool,
        reported_intent: Option<&str>,
    ) -> Booking {
        let Some(reference) = reported_intent
            .or(booking.payment_ref())
            .map(str::to_string)
        else {
            return booking;
        };
        let already_released = matches!(
            booking.payment_status,
            PaymentStatus::Released | PaymentStatus::Refunded
        ) && booking.payment_intent_id.as_deref() == Some(reference.as_str());
        if already_released {
            return booking;
        }

        tracing::warn!(
            booking_id = %booking.id,
            status = %booking.status,
            %reference,
            "funds secured for a closed booking, releasing"
        );
        let key = format!("booking:{}:late-release:{reference}", booking.id);
        let (result, status) = if captured {
            (
                self.retry
                    .run("refund", || self.gateway.refund(&reference, &key))
                    .await,
                PaymentStatus::Refunded,
            )
        } else {
            (
                self.retry
                    .run("cancel", || self.gateway.cancel(&reference, &key))
                    .await,
                PaymentStatus::Released,
            )
        };
        match result {
            Ok(()) => self.record_payment_status(booking, status).await,
            Err(e) => {
                self.reconciliation(&booking, "release", &e);
                booking
            }
        }
    }

    async fn record_payment_status(&self, booking: Booking, status: PaymentStatus) -> Booking {
        match self
            .bookings
            .store()
            .set_payment_status(booking.id, booking.status, status)
            .await
        {
            Ok(updated) => updated,
            Err(e) => {
                tracing::warn!(booking_id = %booking.id, error = %e, "payment status not recorded");
                booking
            }
        }
    }

    fn reconciliation(&self, booking: &Booking, operation: &'static str, err: &PaymentGatewayError) {
        tracing::error!(
            booking_id = %booking.id,
            provider_id = %booking.provider_id,
            operation,
            reconciliation = true,
            error = %err,
            "payment operation failed, manual follow-up required"
        );
        self.publish_reconciliation(booking, operation, err.to_string());
    }

    fn publish_reconciliation(&self, booking: &Booking, operation: &'static str, reason: String) {
        let _ = self
            .bookings
            .event_bus()
            .publish(DomainEvent::ReconciliationRequired {
                booking_id: booking.id,
                provider_id: booking.provider_id,
                operation,
                reason,
                timestamp: Utc::now(),
            });
    }
}

/// `booking:{id}:{verb}`, suffixed with the attempt number after failures.
fn payment_key(booking_id: BookingId, verb: &str, failed_attempts: i32) -> String {
    if failed_attempts == 0 {
        format!("booking:{booking_id}:{verb}")
    } else {
        format!("booking:{booking_id}:{verb}:{failed_attempts}")
    }
}
