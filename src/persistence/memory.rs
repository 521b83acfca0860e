//! In-process [`BookingStore`] for tests and local development.
//!
//! Every mutation runs inside the map's write lock, so the status predicate,
//! the overlap verification, and the write form one critical section. That
//! is the single-writer equivalent of the Postgres exclusion constraint. The
//! store is not durable: idempotency records vanish on restart, so it must
//! not back a multi-instance deployment.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};

use super::{
    BookingStore, COMMITTED_STATUSES, PaymentArtifact, StatusUpdate, StoreError, WebhookFailure,
};
use crate::domain::{
    Booking, BookingId, BookingStatus, PaymentStatus, PayoutAccount, ProviderId, ServiceId,
    ServiceOffering, TimeInterval,
};

/// Catalog data preloaded into a [`MemoryStore`].
#[derive(Debug, Default, Deserialize)]
pub struct MemorySeed {
    /// Service offerings.
    #[serde(default)]
    pub services: Vec<ServiceOffering>,
    /// Provider payout accounts.
    #[serde(default)]
    pub payout_accounts: Vec<PayoutAccount>,
}

/// Map-backed store guarded by `tokio` locks.
#[derive(Debug, Default)]
pub struct MemoryStore {
    bookings: RwLock<HashMap<BookingId, Booking>>,
    idempotency_keys: Mutex<HashSet<String>>,
    services: RwLock<HashMap<ServiceId, ServiceOffering>>,
    payout_accounts: RwLock<HashMap<ProviderId, PayoutAccount>>,
    webhook_failures: Mutex<Vec<WebhookFailure>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store preloaded with catalog data.
    #[must_use]
    pub fn with_seed(seed: MemorySeed) -> Self {
        let services = seed.services.into_iter().map(|s| (s.id, s)).collect();
        let accounts = seed
            .payout_accounts
            .into_iter()
            .map(|a| (a.provider_id, a))
            .collect();
        Self {
            services: RwLock::new(services),
            payout_accounts: RwLock::new(accounts),
            ..Self::default()
        }
    }

    /// Loads catalog data from a JSON file shaped like [`MemorySeed`].
    ///
    /// # Errors
    ///
    /// [`StoreError::Unavailable`] if the file cannot be read,
    /// [`StoreError::Corrupt`] if it is not valid seed JSON.
    pub async fn from_seed_file(path: &Path) -> Result<Self, StoreError> {
        let raw = tokio::fs::read(path)
            .await
            .map_err(|e| StoreError::Unavailable(format!("{}: {e}", path.display())))?;
        let seed: MemorySeed =
            serde_json::from_slice(&raw).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        Ok(Self::with_seed(seed))
    }

    /// Adds or replaces a service offering.
    pub async fn insert_service(&self, service: ServiceOffering) {
        self.services.write().await.insert(service.id, service);
    }

    /// Adds or replaces a provider payout account.
    pub async fn insert_payout_account(&self, account: PayoutAccount) {
        self.payout_accounts
            .write()
            .await
            .insert(account.provider_id, account);
    }

    /// Returns every recorded webhook failure.
    pub async fn webhook_failures(&self) -> Vec<WebhookFailure> {
        self.webhook_failures.lock().await.clone()
    }

    /// Returns every booking, in no particular order.
    pub async fn all_bookings(&self) -> Vec<Booking> {
        self.bookings.read().await.values().cloned().collect()
    }
}

/// `true` if any booking other than `exclude` in `statuses` overlaps.
fn any_overlap<'a>(
    bookings: impl Iterator<Item = &'a Booking>,
    provider_id: ProviderId,
    interval: &TimeInterval,
    exclude: Option<BookingId>,
    statuses: &[BookingStatus],
) -> Result<bool, StoreError> {
    for other in bookings {
        if other.provider_id != provider_id
            || Some(other.id) == exclude
            || !statuses.contains(&other.status)
        {
            continue;
        }
        let other_interval = other
            .interval()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        if other_interval.overlaps(interval) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn booking_not_found(id: BookingId) -> StoreError {
    StoreError::NotFound(format!("booking {id}"))
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn insert_booking(&self, booking: &Booking) -> Result<Booking, StoreError> {
        let mut map = self.bookings.write().await;
        if COMMITTED_STATUSES.contains(&booking.status) {
            let interval = booking
                .interval()
                .map_err(|e| StoreError::Corrupt(e.to_string()))?;
            if any_overlap(
                map.values(),
                booking.provider_id,
                &interval,
                Some(booking.id),
                COMMITTED_STATUSES,
            )? {
                return Err(StoreError::Conflict);
            }
        }
        map.insert(booking.id, booking.clone());
        Ok(booking.clone())
    }

    async fn get_booking(&self, id: BookingId) -> Result<Booking, StoreError> {
        self.bookings
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| booking_not_found(id))
    }

    async fn find_booking_by_payment_ref(&self, reference: &str) -> Result<Booking, StoreError> {
        self.bookings
            .read()
            .await
            .values()
            .find(|b| {
                b.payment_intent_id.as_deref() == Some(reference)
                    || b.checkout_session_id.as_deref() == Some(reference)
            })
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("booking for payment {reference}")))
    }

    async fn update_booking_status(
        &self,
        id: BookingId,
        update: &StatusUpdate,
    ) -> Result<Booking, StoreError> {
        let mut map = self.bookings.write().await;

        let current = map.get(&id).ok_or_else(|| booking_not_found(id))?;
        if current.status != update.expected {
            return Err(StoreError::StaleState {
                current: current.status,
            });
        }
        if COMMITTED_STATUSES.contains(&update.status) {
            let interval = current
                .interval()
                .map_err(|e| StoreError::Corrupt(e.to_string()))?;
            if any_overlap(
                map.values(),
                current.provider_id,
                &interval,
                Some(id),
                COMMITTED_STATUSES,
            )? {
                return Err(StoreError::Conflict);
            }
        }

        let booking = map.get_mut(&id).ok_or_else(|| booking_not_found(id))?;
        booking.status = update.status;
        booking.payment_status = update.payment_status;
        if let Some(reason) = &update.reason {
            booking.reason = Some(reason.clone());
        }
        if let Some(intent) = &update.payment_intent_id {
            booking.payment_intent_id = Some(intent.clone());
        }
        if update.count_failed_attempt {
            booking.failed_payment_attempts = booking.failed_payment_attempts.saturating_add(1);
        }
        booking.updated_at = Utc::now();
        Ok(booking.clone())
    }

    async fn set_payment_status(
        &self,
        id: BookingId,
        expected_status: BookingStatus,
        payment_status: PaymentStatus,
    ) -> Result<Booking, StoreError> {
        let mut map = self.bookings.write().await;
        let booking = map.get_mut(&id).ok_or_else(|| booking_not_found(id))?;
        if booking.status != expected_status {
            return Err(StoreError::StaleState {
                current: booking.status,
            });
        }
        booking.payment_status = payment_status;
        booking.updated_at = Utc::now();
        Ok(booking.clone())
    }

    async fn attach_payment_artifact(
        &self,
        id: BookingId,
        artifact: &PaymentArtifact,
    ) -> Result<Booking, StoreError> {
        let mut map = self.bookings.write().await;
        let booking = map.get_mut(&id).ok_or_else(|| booking_not_found(id))?;
        if booking.status != BookingStatus::AwaitingPayment {
            return Err(StoreError::StaleState {
                current: booking.status,
            });
        }
        booking.payment_intent_id.clone_from(&artifact.payment_intent_id);
        booking.checkout_session_id.clone_from(&artifact.checkout_session_id);
        booking.payment_status = PaymentStatus::Pending;
        booking.updated_at = Utc::now();
        Ok(booking.clone())
    }

    async fn find_active_overlap(
        &self,
        provider_id: ProviderId,
        interval: &TimeInterval,
        exclude: Option<BookingId>,
        statuses: &[BookingStatus],
    ) -> Result<bool, StoreError> {
        let map = self.bookings.read().await;
        any_overlap(map.values(), provider_id, interval, exclude, statuses)
    }

    async fn record_idempotency_key(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.idempotency_keys.lock().await.insert(key.to_string()))
    }

    async fn get_service(&self, id: ServiceId) -> Result<ServiceOffering, StoreError> {
        self.services
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("service {id}")))
    }

    async fn get_payout_account(
        &self,
        provider_id: ProviderId,
    ) -> Result<Option<PayoutAccount>, StoreError> {
        Ok(self.payout_accounts.read().await.get(&provider_id).cloned())
    }

    async fn record_webhook_failure(&self, failure: &WebhookFailure) -> Result<(), StoreError> {
        self.webhook_failures.lock().await.push(failure.clone());
        Ok(())
    }

    async fn list_provider_bookings(
        &self,
        provider_id: ProviderId,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Booking>, StoreError> {
        let map = self.bookings.read().await;
        let mut bookings: Vec<Booking> = map
            .values()
            .filter(|b| b.provider_id == provider_id && date.is_none_or(|d| b.date == d))
            .cloned()
            .collect();
        bookings.sort_by_key(|b| (b.date, b.time_start, b.created_at));
        Ok(bookings)
    }
}
