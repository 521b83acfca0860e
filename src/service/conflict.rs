//! Provider schedule conflict checks.
//!
//! These are fast paths. The store's commit-time guard (the exclusion
//! constraint in Postgres, the writer lock in memory) is what actually
//! prevents two committed bookings from overlapping.

use std::sync::Arc;

use crate::domain::{BookingId, BookingStatus, ProviderId, TimeInterval};
use crate::error::BookingError;
use crate::persistence::{ACTIVE_STATUSES, BookingStore, COMMITTED_STATUSES};

/// Answers "is this slot free for this provider?".
#[derive(Debug, Clone)]
pub struct ConflictDetector {
    store: Arc<dyn BookingStore>,
    creation_statuses: &'static [BookingStatus],
}

impl ConflictDetector {
    /// Creates a detector.
    ///
    /// With `block_pending_overlap`, new bookings are also refused when they
    /// overlap a booking still waiting for the provider's decision.
    #[must_use]
    pub fn new(store: Arc<dyn BookingStore>, block_pending_overlap: bool) -> Self {
        let creation_statuses = if block_pending_overlap {
            ACTIVE_STATUSES
        } else {
            COMMITTED_STATUSES
        };
        Self {
            store,
            creation_statuses,
        }
    }

    /// Whether `interval` overlaps a committed booking of `provider_id`,
    /// ignoring `exclude`.
    ///
    /// # Errors
    ///
    /// [`BookingError::UpstreamUnavailable`] if storage cannot be queried.
    pub async fn has_conflict(
        &self,
        provider_id: ProviderId,
        interval: &TimeInterval,
        exclude: Option<BookingId>,
    ) -> Result<bool, BookingError> {
        Ok(self
            .store
            .find_active_overlap(provider_id, interval, exclude, COMMITTED_STATUSES)
            .await?)
    }

    /// Fails with [`BookingError::BookingConflict`] when [`Self::has_conflict`]
    /// reports an overlap.
    ///
    /// # Errors
    ///
    /// [`BookingError::BookingConflict`] or a storage error.
    pub async fn ensure_free(
        &self,
        provider_id: ProviderId,
        interval: &TimeInterval,
        exclude: Option<BookingId>,
    ) -> Result<(), BookingError> {
        if self.has_conflict(provider_id, interval, exclude).await? {
            return Err(conflict(provider_id, interval));
        }
        Ok(())
    }

    /// Pre-check for a booking that does not exist yet.
    ///
    /// # Errors
    ///
    /// [`BookingError::BookingConflict`] or a storage error.
    pub async fn check_new_slot(
        &self,
        provider_id: ProviderId,
        interval: &TimeInterval,
    ) -> Result<(), BookingError> {
        let taken = self
            .store
            .find_active_overlap(provider_id, interval, None, self.creation_statuses)
            .await?;
        if taken {
            return Err(conflict(provider_id, interval));
        }
        Ok(())
    }
}

fn conflict(provider_id: ProviderId, interval: &TimeInterval) -> BookingError {
    BookingError::BookingConflict(format!(
        "provider {provider_id} already has a booking overlapping {interval}"
    ))
}
