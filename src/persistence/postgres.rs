//! PostgreSQL implementation of the booking store.
//!
//! The `bookings_no_overlap` exclusion constraint (see `migrations/`) is the
//! authoritative conflict guard: a `tsrange` over the slot, gist-indexed per
//! provider, restricted to `status = 'confirmed'`. Violations surface as
//! SQLSTATE `23P01` and are translated into [`StoreError::Conflict`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use super::models::{BOOKING_COLUMNS, BookingRow};
use super::{BookingStore, PaymentArtifact, StatusUpdate, StoreError, WebhookFailure};
use crate::config::GatewayConfig;
use crate::domain::{
    Booking, BookingId, BookingStatus, PaymentStatus, PayoutAccount, ProviderId, ServiceId,
    ServiceOffering, TimeInterval,
};

/// SQLSTATE for `exclusion_violation`.
const EXCLUSION_VIOLATION: &str = "23P01";

/// PostgreSQL-backed store using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store over an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool using the database settings in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the database cannot be reached.
    pub async fn connect(config: &GatewayConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
            .connect(&config.database_url)
            .await
            .map_err(map_sqlx)?;
        Ok(Self::new(pool))
    }

    /// Applies pending migrations from `migrations/`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("migration failed: {e}")))
    }

    /// Explains why a guarded update touched no row.
    async fn stale_or_missing(&self, id: BookingId) -> StoreError {
        let current = sqlx::query_scalar::<_, String>("SELECT status FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await;
        match current {
            Ok(Some(status)) => match status.parse::<BookingStatus>() {
                Ok(current) => StoreError::StaleState { current },
                Err(e) => StoreError::Corrupt(e.to_string()),
            },
            Ok(None) => StoreError::NotFound(format!("booking {id}")),
            Err(e) => map_sqlx(e),
        }
    }
}

/// Translates driver errors into [`StoreError`].
fn map_sqlx(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(EXCLUSION_VIOLATION) => {
            StoreError::Conflict
        }
        sqlx::Error::RowNotFound => StoreError::NotFound("row".to_string()),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Corrupt(err.to_string())
        }
        _ => StoreError::Unavailable(err.to_string()),
    }
}

fn to_booking(row: BookingRow) -> Result<Booking, StoreError> {
    Booking::try_from(row)
}

#[async_trait]
impl BookingStore for PostgresStore {
    async fn insert_booking(&self, booking: &Booking) -> Result<Booking, StoreError> {
        let sql = format!(
            "INSERT INTO bookings (id, customer_id, provider_id, service_id, date, time_start, \
             time_end, status, payment_status, service_price_cents, platform_fee_cents, \
             total_cents, currency, payment_intent_id, checkout_session_id, \
             failed_payment_attempts, reason, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, \
             $17, $18, $19) RETURNING {BOOKING_COLUMNS}"
        );
        let row = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(booking.id)
            .bind(booking.customer_id)
            .bind(booking.provider_id)
            .bind(booking.service_id)
            .bind(booking.date)
            .bind(booking.time_start)
            .bind(booking.time_end)
            .bind(booking.status.as_db())
            .bind(booking.payment_status.as_db())
            .bind(booking.service_price_cents)
            .bind(booking.platform_fee_cents)
            .bind(booking.total_cents)
            .bind(&booking.currency)
            .bind(&booking.payment_intent_id)
            .bind(&booking.checkout_session_id)
            .bind(booking.failed_payment_attempts)
            .bind(&booking.reason)
            .bind(booking.created_at)
            .bind(booking.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)?;
        to_booking(row)
    }

    async fn get_booking(&self, id: BookingId) -> Result<Booking, StoreError> {
        let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1");
        let row = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?
            .ok_or_else(|| StoreError::NotFound(format!("booking {id}")))?;
        to_booking(row)
    }

    async fn find_booking_by_payment_ref(&self, reference: &str) -> Result<Booking, StoreError> {
        let sql = format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings \
             WHERE payment_intent_id = $1 OR checkout_session_id = $1 LIMIT 1"
        );
        let row = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(reference)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?
            .ok_or_else(|| StoreError::NotFound(format!("booking for payment {reference}")))?;
        to_booking(row)
    }

    async fn update_booking_status(
        &self,
        id: BookingId,
        update: &StatusUpdate,
    ) -> Result<Booking, StoreError> {
        let sql = format!(
            "UPDATE bookings SET status = $3, payment_status = $4, \
             reason = COALESCE($5, reason), \
             payment_intent_id = COALESCE($6, payment_intent_id), \
             failed_payment_attempts = failed_payment_attempts + $7, \
             updated_at = now() \
             WHERE id = $1 AND status = $2 RETURNING {BOOKING_COLUMNS}"
        );
        let row = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(id)
            .bind(update.expected.as_db())
            .bind(update.status.as_db())
            .bind(update.payment_status.as_db())
            .bind(&update.reason)
            .bind(&update.payment_intent_id)
            .bind(i32::from(update.count_failed_attempt))
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        match row {
            Some(row) => to_booking(row),
            None => Err(self.stale_or_missing(id).await),
        }
    }

    async fn set_payment_status(
        &self,
        id: BookingId,
        expected_status: BookingStatus,
        payment_status: PaymentStatus,
    ) -> Result<Booking, StoreError> {
        let sql = format!(
            "UPDATE bookings SET payment_status = $3, updated_at = now() \
             WHERE id = $1 AND status = $2 RETURNING {BOOKING_COLUMNS}"
        );
        let row = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(id)
            .bind(expected_status.as_db())
            .bind(payment_status.as_db())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        match row {
            Some(row) => to_booking(row),
            None => Err(self.stale_or_missing(id).await),
        }
    }

    async fn attach_payment_artifact(
        &self,
        id: BookingId,
        artifact: &PaymentArtifact,
    ) -> Result<Booking, StoreError> {
        let sql = format!(
            "UPDATE bookings SET \
             payment_intent_id = $2, checkout_session_id = $3, \
             payment_status = $4, updated_at = now() \
             WHERE id = $1 AND status = $5 RETURNING {BOOKING_COLUMNS}"
        );
        let row = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(id)
            .bind(&artifact.payment_intent_id)
            .bind(&artifact.checkout_session_id)
            .bind(PaymentStatus::Pending.as_db())
            .bind(BookingStatus::AwaitingPayment.as_db())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        match row {
            Some(row) => to_booking(row),
            None => Err(self.stale_or_missing(id).await),
        }
    }

    async fn find_active_overlap(
        &self,
        provider_id: ProviderId,
        interval: &TimeInterval,
        exclude: Option<BookingId>,
        statuses: &[BookingStatus],
    ) -> Result<bool, StoreError> {
        let (start, end) = interval
            .to_utc_range()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let statuses: Vec<String> = statuses.iter().map(|s| s.as_db().to_string()).collect();
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM bookings \
             WHERE provider_id = $1 AND status = ANY($2) \
             AND slot && tsrange($3, $4, '[)') \
             AND ($5::uuid IS NULL OR id <> $5))",
        )
        .bind(provider_id)
        .bind(statuses)
        .bind(start.naive_utc())
        .bind(end.naive_utc())
        .bind(exclude.map(Uuid::from))
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)
    }

    async fn record_idempotency_key(&self, key: &str) -> Result<bool, StoreError> {
        // INSERT first and inspect rows_affected: no read-then-write window.
        let result =
            sqlx::query("INSERT INTO idempotency_keys (key) VALUES ($1) ON CONFLICT DO NOTHING")
                .bind(key)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx)?;
        Ok(result.rows_affected() == 1)
    }

    async fn get_service(&self, id: ServiceId) -> Result<ServiceOffering, StoreError> {
        let row = sqlx::query_as::<_, (Uuid, Uuid, i64, i32, bool)>(
            "SELECT id, provider_id, price_cents, duration_minutes, active \
             FROM services WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?
        .ok_or_else(|| StoreError::NotFound(format!("service {id}")))?;

        let (id, provider_id, price_cents, duration_minutes, active) = row;
        Ok(ServiceOffering {
            id: ServiceId::from_uuid(id),
            provider_id: ProviderId::from_uuid(provider_id),
            price_cents,
            duration_minutes,
            active,
        })
    }

    async fn get_payout_account(
        &self,
        provider_id: ProviderId,
    ) -> Result<Option<PayoutAccount>, StoreError> {
        let account = sqlx::query_scalar::<_, String>(
            "SELECT account_id FROM provider_payout_accounts WHERE provider_id = $1",
        )
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(account.map(|account_id| PayoutAccount {
            provider_id,
            account_id,
        }))
    }

    async fn record_webhook_failure(&self, failure: &WebhookFailure) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO webhook_failures (event_id, event_type, booking_id, reason, payload, failed_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&failure.event_id)
        .bind(&failure.event_type)
        .bind(failure.booking_id)
        .bind(&failure.reason)
        .bind(&failure.payload)
        .bind(failure.failed_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn list_provider_bookings(
        &self,
        provider_id: ProviderId,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Booking>, StoreError> {
        let sql = format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings \
             WHERE provider_id = $1 AND ($2::date IS NULL OR date = $2) \
             ORDER BY date, time_start, created_at"
        );
        let rows = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(provider_id)
            .bind(date)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;
        rows.into_iter().map(to_booking).collect()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use chrono::NaiveTime;

    use super::*;
    use crate::domain::{CustomerId, NewBooking};

    #[test]
    fn row_not_found_maps_to_not_found() {
        assert!(matches!(
            map_sqlx(sqlx::Error::RowNotFound),
            StoreError::NotFound(_)
        ));
    }

    #[test]
    fn pool_timeout_is_unavailable() {
        assert!(matches!(
            map_sqlx(sqlx::Error::PoolTimedOut),
            StoreError::Unavailable(_)
        ));
    }

    // The tests below run against a live server: `DATABASE_URL=... cargo test -- --ignored`.
    // `sqlx::test` creates a scratch database per test and applies `migrations/`.

    fn booking(provider_id: ProviderId, start: (u32, u32), end: (u32, u32)) -> Booking {
        let (Some(date), Some(time_start), Some(time_end)) = (
            NaiveDate::from_ymd_opt(2026, 1, 15),
            NaiveTime::from_hms_opt(start.0, start.1, 0),
            NaiveTime::from_hms_opt(end.0, end.1, 0),
        ) else {
            panic!("valid date/time");
        };
        Booking::new(NewBooking {
            customer_id: CustomerId::new(),
            provider_id,
            service_id: None,
            date,
            time_start,
            time_end,
            service_price_cents: 10_000,
            platform_fee_cents: 1_000,
            currency: "usd".to_string(),
        })
    }

    async fn inserted(store: &PostgresStore, b: &Booking) -> Booking {
        let Ok(stored) = store.insert_booking(b).await else {
            panic!("insert failed");
        };
        stored
    }

    async fn move_to(store: &PostgresStore, b: &Booking, update: StatusUpdate) -> Booking {
        let Ok(updated) = store.update_booking_status(b.id, &update).await else {
            panic!("transition to {} failed", update.status);
        };
        updated
    }

    fn pending() -> StatusUpdate {
        StatusUpdate::new(
            BookingStatus::AwaitingPayment,
            BookingStatus::PendingAcceptance,
            PaymentStatus::Authorized,
        )
    }

    fn confirm() -> StatusUpdate {
        StatusUpdate::new(
            BookingStatus::PendingAcceptance,
            BookingStatus::Confirmed,
            PaymentStatus::Captured,
        )
    }

    #[sqlx::test]
    #[ignore = "needs DATABASE_URL"]
    async fn guarded_update_reports_current_status(pool: PgPool) {
        let store = PostgresStore::new(pool);
        let b = inserted(&store, &booking(ProviderId::new(), (9, 0), (10, 0))).await;

        assert!(matches!(
            store.update_booking_status(b.id, &confirm()).await,
            Err(StoreError::StaleState {
                current: BookingStatus::AwaitingPayment
            })
        ));

        let updated = move_to(&store, &b, pending()).await;
        assert_eq!(updated.status, BookingStatus::PendingAcceptance);
        assert_eq!(updated.payment_status, PaymentStatus::Authorized);

        // The same move again no longer matches the expected status.
        assert!(matches!(
            store.update_booking_status(b.id, &pending()).await,
            Err(StoreError::StaleState {
                current: BookingStatus::PendingAcceptance
            })
        ));
        assert!(matches!(
            store
                .update_booking_status(BookingId::new(), &pending())
                .await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[sqlx::test]
    #[ignore = "needs DATABASE_URL"]
    async fn exclusion_constraint_refuses_overlapping_confirm(pool: PgPool) {
        let store = PostgresStore::new(pool);
        let provider = ProviderId::new();
        let first = inserted(&store, &booking(provider, (14, 0), (15, 0))).await;
        let second = inserted(&store, &booking(provider, (14, 30), (15, 30))).await;
        let adjacent = inserted(&store, &booking(provider, (15, 0), (16, 0))).await;
        for b in [&first, &second, &adjacent] {
            move_to(&store, b, pending()).await;
        }

        move_to(&store, &first, confirm()).await;
        assert!(matches!(
            store.update_booking_status(second.id, &confirm()).await,
            Err(StoreError::Conflict)
        ));
        // Half-open slots: ending at 15:00 does not block 15:00.
        let touching = move_to(&store, &adjacent, confirm()).await;
        assert_eq!(touching.status, BookingStatus::Confirmed);

        let Ok(loser) = store.get_booking(second.id).await else {
            panic!("booking exists");
        };
        assert_eq!(loser.status, BookingStatus::PendingAcceptance);

        let Ok(interval) = loser.interval() else {
            panic!("valid interval");
        };
        assert!(matches!(
            store
                .find_active_overlap(provider, &interval, Some(loser.id), &[BookingStatus::Confirmed])
                .await,
            Ok(true)
        ));
    }

    #[sqlx::test]
    #[ignore = "needs DATABASE_URL"]
    async fn idempotency_key_is_recorded_once(pool: PgPool) {
        let store = PostgresStore::new(pool);
        assert!(matches!(store.record_idempotency_key("event:evt_1").await, Ok(true)));
        assert!(matches!(store.record_idempotency_key("event:evt_1").await, Ok(false)));
        assert!(matches!(store.record_idempotency_key("event:evt_2").await, Ok(true)));
    }

    #[sqlx::test]
    #[ignore = "needs DATABASE_URL"]
    async fn newer_artifact_replaces_the_previous_attempt(pool: PgPool) {
        let store = PostgresStore::new(pool);
        let b = inserted(&store, &booking(ProviderId::new(), (9, 0), (10, 0))).await;
        let intent = PaymentArtifact {
            payment_intent_id: Some("pi_failed".to_string()),
            checkout_session_id: None,
        };
        let session = PaymentArtifact {
            payment_intent_id: None,
            checkout_session_id: Some("cs_open".to_string()),
        };
        let Ok(_) = store.attach_payment_artifact(b.id, &intent).await else {
            panic!("attach failed");
        };
        let Ok(updated) = store.attach_payment_artifact(b.id, &session).await else {
            panic!("attach failed");
        };
        assert_eq!(updated.payment_intent_id, None);
        assert_eq!(updated.payment_ref(), Some("cs_open"));
    }
}
