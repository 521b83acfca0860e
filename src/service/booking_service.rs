//! Booking service: creation, reads, and guarded state-machine commits.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, TimeDelta, Utc};

use super::conflict::ConflictDetector;
use crate::domain::state_machine::{self, BookingEvent, Transition};
use crate::domain::{
    ActorId, Booking, BookingId, CustomerId, DomainEvent, EventBus, NewBooking, ProviderId,
    ServiceId, TimeInterval,
};
use crate::error::BookingError;
use crate::persistence::{BookingStore, StatusUpdate, StoreError};

/// Platform pricing applied at creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pricing {
    /// Platform fee in basis points of the service price.
    pub platform_fee_bps: u32,
    /// Currency every booking is charged in.
    pub currency: String,
}

impl Pricing {
    /// Fee for `price_cents`, rounded down.
    #[must_use]
    pub fn platform_fee(&self, price_cents: i64) -> i64 {
        price_cents.saturating_mul(i64::from(self.platform_fee_bps)) / 10_000
    }
}

/// A customer's request for a slot.
#[derive(Debug, Clone)]
pub struct CreateBooking {
    /// Provider to book.
    pub provider_id: ProviderId,
    /// Service to book; required, it determines the price.
    pub service_id: Option<ServiceId>,
    /// Slot date.
    pub date: NaiveDate,
    /// Slot start.
    pub time_start: NaiveTime,
    /// Slot end; defaults to start plus the service duration.
    pub time_end: Option<NaiveTime>,
}

/// Extra fields written alongside a status change.
#[derive(Debug, Clone, Default)]
pub struct CommitDetails {
    /// Decline / cancel reason.
    pub reason: Option<String>,
    /// Payment intent reported by the gateway.
    pub payment_intent_id: Option<String>,
    /// Count this transition as a failed payment attempt.
    pub count_failed_attempt: bool,
}

/// Result of applying an event to a booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Commit {
    /// The booking moved; carries the stored row.
    Applied(Booking),
    /// The event had already been applied; carries the current row.
    Unchanged(Booking),
}

impl Commit {
    /// The booking after the commit.
    #[must_use]
    pub fn booking(&self) -> &Booking {
        match self {
            Self::Applied(b) | Self::Unchanged(b) => b,
        }
    }

    /// Consumes the commit, returning the booking.
    #[must_use]
    pub fn into_booking(self) -> Booking {
        match self {
            Self::Applied(b) | Self::Unchanged(b) => b,
        }
    }

    /// Whether this call changed the booking.
    #[must_use]
    pub const fn changed(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Coordinates booking creation and every status commit.
///
/// Commits follow one pattern: plan the transition from the booking as read,
/// write it as a conditional update guarded by the expected status, emit a
/// [`DomainEvent`], and translate storage races back into state-machine terms.
#[derive(Debug, Clone)]
pub struct BookingService {
    store: Arc<dyn BookingStore>,
    conflicts: ConflictDetector,
    event_bus: EventBus,
    pricing: Pricing,
}

impl BookingService {
    /// Creates a new `BookingService`.
    #[must_use]
    pub fn new(
        store: Arc<dyn BookingStore>,
        conflicts: ConflictDetector,
        event_bus: EventBus,
        pricing: Pricing,
    ) -> Self {
        Self {
            store,
            conflicts,
            event_bus,
            pricing,
        }
    }

    /// Returns the storage collaborator.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn BookingStore> {
        &self.store
    }

    /// Returns the conflict detector.
    #[must_use]
    pub fn conflicts(&self) -> &ConflictDetector {
        &self.conflicts
    }

    /// Returns a reference to the inner [`EventBus`].
    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Creates a booking in `AwaitingPayment` for the calling customer.
    ///
    /// Price comes from the service catalog, never from the caller.
    ///
    /// # Errors
    ///
    /// [`BookingError::InvalidRequest`] for a missing, inactive or foreign
    /// service or a malformed slot, [`BookingError::ResourceMissing`] for an
    /// unknown service, [`BookingError::BookingConflict`] if the slot is taken.
    pub async fn create_booking(
        &self,
        actor: ActorId,
        request: CreateBooking,
    ) -> Result<Booking, BookingError> {
        let service_id = request
            .service_id
            .ok_or_else(|| BookingError::InvalidRequest("service_id is required".to_string()))?;
        let service = self.store.get_service(service_id).await?;
        if service.provider_id != request.provider_id {
            return Err(BookingError::InvalidRequest(format!(
                "service {service_id} is not offered by provider {}",
                request.provider_id
            )));
        }
        if !service.active {
            return Err(BookingError::InvalidRequest(format!(
                "service {service_id} is not active"
            )));
        }

        let time_end = match request.time_end {
            Some(end) => end,
            None => end_after(request.time_start, service.duration_minutes)?,
        };
        let interval = TimeInterval::on_date(request.date, request.time_start, time_end)?;
        self.conflicts
            .check_new_slot(request.provider_id, &interval)
            .await?;

        let booking = Booking::new(NewBooking {
            customer_id: CustomerId::from_uuid(*actor.as_uuid()),
            provider_id: request.provider_id,
            service_id: Some(service_id),
            date: request.date,
            time_start: request.time_start,
            time_end,
            service_price_cents: service.price_cents,
            platform_fee_cents: self.pricing.platform_fee(service.price_cents),
            currency: self.pricing.currency.clone(),
        });
        let booking = self.store.insert_booking(&booking).await?;

        let _ = self.event_bus.publish(DomainEvent::BookingCreated {
            booking_id: booking.id,
            provider_id: booking.provider_id,
            customer_id: booking.customer_id,
            total_cents: booking.total_cents,
            timestamp: Utc::now(),
        });

        tracing::info!(
            booking_id = %booking.id,
            provider_id = %booking.provider_id,
            %interval,
            total_cents = booking.total_cents,
            "booking created"
        );
        Ok(booking)
    }

    /// Loads a booking visible to `actor`.
    ///
    /// # Errors
    ///
    /// [`BookingError::ResourceMissing`] or [`BookingError::PermissionDenied`].
    pub async fn get_booking(&self, actor: ActorId, id: BookingId) -> Result<Booking, BookingError> {
        let booking = self.store.get_booking(id).await?;
        if !actor.is_customer(booking.customer_id) && !actor.is_provider(booking.provider_id) {
            return Err(BookingError::PermissionDenied(format!(
                "booking {id} belongs to another customer and provider"
            )));
        }
        Ok(booking)
    }

    /// Lists a provider's own bookings, optionally for one date.
    ///
    /// # Errors
    ///
    /// [`BookingError::PermissionDenied`] unless `actor` is the provider.
    pub async fn list_provider_bookings(
        &self,
        actor: ActorId,
        provider_id: ProviderId,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Booking>, BookingError> {
        if !actor.is_provider(provider_id) {
            return Err(BookingError::PermissionDenied(
                "only the provider may list their bookings".to_string(),
            ));
        }
        Ok(self.store.list_provider_bookings(provider_id, date).await?)
    }

    /// Applies `event` to `booking` as read by the caller.
    ///
    /// # Errors
    ///
    /// [`BookingError::InvalidStateTransition`] if the event is illegal now,
    /// [`BookingError::BookingConflict`] if the store refuses a confirm.
    pub async fn apply(
        &self,
        booking: &Booking,
        event: BookingEvent,
        details: CommitDetails,
    ) -> Result<Commit, BookingError> {
        let (from, to, payment_status) =
            match state_machine::plan(booking.status, booking.payment_status, event)? {
                Transition::AlreadyApplied => {
                    tracing::debug!(booking_id = %booking.id, %event, "transition already applied");
                    return Ok(Commit::Unchanged(booking.clone()));
                }
                Transition::Apply {
                    from,
                    to,
                    payment_status,
                } => (from, to, payment_status),
            };

        let update = StatusUpdate {
            expected: from,
            status: to,
            payment_status,
            reason: details.reason,
            payment_intent_id: details.payment_intent_id,
            count_failed_attempt: details.count_failed_attempt,
        };

        match self.store.update_booking_status(booking.id, &update).await {
            Ok(updated) => {
                let _ = self.event_bus.publish(DomainEvent::BookingTransitioned {
                    booking_id: updated.id,
                    provider_id: updated.provider_id,
                    from,
                    to,
                    cause: event.name(),
                    timestamp: Utc::now(),
                });
                tracing::info!(
                    booking_id = %updated.id,
                    provider_id = %updated.provider_id,
                    %from,
                    %to,
                    payment_status = %updated.payment_status,
                    cause = event.name(),
                    "booking transitioned"
                );
                Ok(Commit::Applied(updated))
            }
            Err(StoreError::StaleState { current }) => {
                // Lost a race: someone else moved the row first.
                if current == to {
                    let fresh = self.store.get_booking(booking.id).await?;
                    tracing::debug!(booking_id = %booking.id, %event, "concurrent duplicate transition");
                    Ok(Commit::Unchanged(fresh))
                } else {
                    Err(BookingError::InvalidStateTransition {
                        from: current,
                        event: event.name(),
                    })
                }
            }
            Err(StoreError::Conflict) => {
                tracing::info!(
                    booking_id = %booking.id,
                    provider_id = %booking.provider_id,
                    "commit rejected by schedule constraint"
                );
                Err(BookingError::BookingConflict(format!(
                    "booking {} overlaps a confirmed booking of provider {}",
                    booking.id, booking.provider_id
                )))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// `start + minutes`, refusing slots that would run past midnight.
fn end_after(start: NaiveTime, minutes: i32) -> Result<NaiveTime, BookingError> {
    let (end, wrapped) = start.overflowing_add_signed(TimeDelta::minutes(i64::from(minutes)));
    if wrapped != 0 || end <= start {
        return Err(BookingError::InvalidRequest(format!(
            "a {minutes} minute slot starting at {start} does not end on the same day"
        )));
    }
    Ok(end)
}

/// Fails unless `actor` is the booking's customer.
pub(crate) fn ensure_customer(booking: &Booking, actor: ActorId) -> Result<(), BookingError> {
    if actor.is_customer(booking.customer_id) {
        Ok(())
    } else {
        Err(BookingError::PermissionDenied(format!(
            "only the customer may do this to booking {}",
            booking.id
        )))
    }
}

/// Fails unless `actor` is the booking's provider.
pub(crate) fn ensure_provider(booking: &Booking, actor: ActorId) -> Result<(), BookingError> {
    if actor.is_provider(booking.provider_id) {
        Ok(())
    } else {
        Err(BookingError::PermissionDenied(format!(
            "only the provider may do this to booking {}",
            booking.id
        )))
    }
}
