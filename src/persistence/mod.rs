//! Persistence layer: the storage collaborator the booking core relies on.
//!
//! [`BookingStore`] is the narrow set of operations the core needs: atomic
//! insert and guarded status update with conflict detection, a range-overlap
//! query, and an atomic check-and-set for idempotency keys. Two
//! implementations exist:
//!
//! - [`postgres::PostgresStore`]: production. A range exclusion constraint
//!   restricted to confirmed rows is the authoritative conflict guard.
//! - [`memory::MemoryStore`]: tests and local development. A single writer
//!   lock plus a verifying read provides the same guarantee within one
//!   process.

pub mod memory;
pub mod models;
pub mod postgres;

use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::{
    Booking, BookingId, BookingStatus, PaymentStatus, PayoutAccount, ProviderId, ServiceId,
    ServiceOffering, TimeInterval,
};

pub use models::{PaymentArtifact, StatusUpdate, WebhookFailure};

/// Statuses covered by the no-overlap constraint at commit time.
pub const COMMITTED_STATUSES: &[BookingStatus] = &[BookingStatus::Confirmed];

/// Every status in the active set.
pub const ACTIVE_STATUSES: &[BookingStatus] =
    &[BookingStatus::PendingAcceptance, BookingStatus::Confirmed];

/// Storage-level failures, translated into [`crate::error::BookingError`]
/// by the service layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The write would give a provider two overlapping committed bookings.
    #[error("slot overlaps a confirmed booking")]
    Conflict,

    /// A guarded update found the row in a different status.
    #[error("booking is in state {current}")]
    StaleState {
        /// Status the row actually has.
        current: BookingStatus,
    },

    /// No such row.
    #[error("{0} not found")]
    NotFound(String),

    /// Connection or I/O failure; retryable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A stored row could not be decoded.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Storage operations consumed by the booking core.
///
/// Implementations must make `update_booking_status` a single conditional
/// write: the status predicate and, for transitions into a committed
/// status, the overlap check happen atomically with the write.
#[async_trait]
pub trait BookingStore: Send + Sync + fmt::Debug {
    /// Inserts a new booking.
    ///
    /// # Errors
    ///
    /// [`StoreError::Conflict`] if the row is committed and overlaps another
    /// committed booking of the same provider.
    async fn insert_booking(&self, booking: &Booking) -> Result<Booking, StoreError>;

    /// Loads a booking by id.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] for unknown ids.
    async fn get_booking(&self, id: BookingId) -> Result<Booking, StoreError>;

    /// Loads the booking owning a payment intent or checkout session id.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if no booking references the artifact.
    async fn find_booking_by_payment_ref(&self, reference: &str) -> Result<Booking, StoreError>;

    /// Moves a booking from `update.expected` to `update.status`.
    ///
    /// # Errors
    ///
    /// [`StoreError::StaleState`] if the current status differs from
    /// `update.expected`; [`StoreError::Conflict`] if the new status is
    /// committed and the slot overlaps another committed booking.
    async fn update_booking_status(
        &self,
        id: BookingId,
        update: &StatusUpdate,
    ) -> Result<Booking, StoreError>;

    /// Rewrites only the payment status, guarded by the booking status.
    ///
    /// # Errors
    ///
    /// [`StoreError::StaleState`] if the booking left `expected_status`.
    async fn set_payment_status(
        &self,
        id: BookingId,
        expected_status: BookingStatus,
        payment_status: PaymentStatus,
    ) -> Result<Booking, StoreError>;

    /// Records gateway artifact ids on a booking that is still awaiting
    /// payment and marks its payment as pending.
    ///
    /// Both ids are replaced: the newest attempt supersedes earlier ones, so
    /// a later void acts on the artifact the customer can still pay.
    ///
    /// # Errors
    ///
    /// [`StoreError::StaleState`] if the booking is no longer awaiting payment.
    async fn attach_payment_artifact(
        &self,
        id: BookingId,
        artifact: &PaymentArtifact,
    ) -> Result<Booking, StoreError>;

    /// Returns `true` if `provider_id` has a booking in one of `statuses`
    /// overlapping `interval`, ignoring `exclude`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Unavailable`] on storage failure.
    async fn find_active_overlap(
        &self,
        provider_id: ProviderId,
        interval: &TimeInterval,
        exclude: Option<BookingId>,
        statuses: &[BookingStatus],
    ) -> Result<bool, StoreError>;

    /// Atomically records `key`. Returns `true` the first time only.
    ///
    /// # Errors
    ///
    /// [`StoreError::Unavailable`] on storage failure.
    async fn record_idempotency_key(&self, key: &str) -> Result<bool, StoreError>;

    /// Loads a service offering.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] for unknown services.
    async fn get_service(&self, id: ServiceId) -> Result<ServiceOffering, StoreError>;

    /// Looks up a provider's payout account. Absence is not an error here.
    ///
    /// # Errors
    ///
    /// [`StoreError::Unavailable`] on storage failure.
    async fn get_payout_account(
        &self,
        provider_id: ProviderId,
    ) -> Result<Option<PayoutAccount>, StoreError>;

    /// Persists a webhook processing failure for operators.
    ///
    /// # Errors
    ///
    /// [`StoreError::Unavailable`] on storage failure.
    async fn record_webhook_failure(&self, failure: &WebhookFailure) -> Result<(), StoreError>;

    /// Lists a provider's bookings, optionally for one date, ordered by start.
    ///
    /// # Errors
    ///
    /// [`StoreError::Unavailable`] on storage failure.
    async fn list_provider_bookings(
        &self,
        provider_id: ProviderId,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Booking>, StoreError>;
}
