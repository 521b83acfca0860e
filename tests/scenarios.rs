//! Service-level booking scenarios, including concurrent accepts.

#![allow(clippy::panic)]

mod common;

use std::sync::Arc;

use booking_gateway::app_state::AppState;
use booking_gateway::domain::{ActorId, Booking, BookingStatus, PaymentStatus, ProviderId, ServiceId};
use booking_gateway::error::BookingError;
use booking_gateway::payment::{GatewayOp, PaymentGatewayError};
use booking_gateway::persistence::BookingStore;
use booking_gateway::service::{CreateBooking, PaymentMode};
use chrono::{NaiveDate, NaiveTime};
use tokio_test::assert_ok;

fn at(h: u32, m: u32) -> NaiveTime {
    let Some(t) = NaiveTime::from_hms_opt(h, m, 0) else {
        panic!("valid time");
    };
    t
}

fn day() -> NaiveDate {
    let Some(d) = NaiveDate::from_ymd_opt(2026, 1, 15) else {
        panic!("valid date");
    };
    d
}

async fn paid_booking(
    state: &AppState,
    provider: ProviderId,
    service: ServiceId,
    start: NaiveTime,
    end: NaiveTime,
) -> Booking {
    secured_booking(state, provider, service, (start, end), false).await
}

async fn secured_booking(
    state: &AppState,
    provider: ProviderId,
    service: ServiceId,
    (start, end): (NaiveTime, NaiveTime),
    captured: bool,
) -> Booking {
    let customer = ActorId::new();
    let request = CreateBooking {
        provider_id: provider,
        service_id: Some(service),
        date: day(),
        time_start: start,
        time_end: Some(end),
    };
    let booking = assert_ok!(state.bookings.create_booking(customer, request).await);
    let session = assert_ok!(
        state
            .payments
            .initiate_payment(customer, booking.id, PaymentMode::Intent)
            .await
    );
    let commit = assert_ok!(
        state
            .payments
            .on_funds_secured(booking.id, captured, Some(session.artifact_id))
            .await
    );
    assert_eq!(commit.booking().status, BookingStatus::PendingAcceptance);
    commit.into_booking()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_overlapping_accepts_confirm_exactly_one() {
    for _ in 0..20 {
        let (state, store, _gateway, provider, service) = common::state(false).await;
        let first = paid_booking(&state, provider, service, at(14, 0), at(15, 0)).await;
        let second = paid_booking(&state, provider, service, at(14, 30), at(15, 30)).await;
        let actor = ActorId::from_uuid(*provider.as_uuid());

        let (a, b) = {
            let (pa, pb) = (state.payments.clone(), state.payments.clone());
            let ha = tokio::spawn(async move { pa.accept_booking(actor, first.id).await });
            let hb = tokio::spawn(async move { pb.accept_booking(actor, second.id).await });
            let (Ok(a), Ok(b)) = (ha.await, hb.await) else {
                panic!("accept tasks should not panic");
            };
            (a, b)
        };

        let outcomes = [&a, &b];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            outcomes
                .iter()
                .filter(|r| matches!(r, Err(BookingError::BookingConflict(_))))
                .count(),
            1
        );

        let confirmed = store
            .all_bookings()
            .await
            .into_iter()
            .filter(|b| b.status == BookingStatus::Confirmed)
            .count();
        assert_eq!(confirmed, 1);
    }
}

#[tokio::test]
async fn accept_before_payment_then_after() {
    let (state, _store, _gateway, provider, service) = common::state(false).await;
    let customer = ActorId::new();
    let actor = ActorId::from_uuid(*provider.as_uuid());
    let request = CreateBooking {
        provider_id: provider,
        service_id: Some(service),
        date: day(),
        time_start: at(9, 0),
        time_end: None,
    };
    let booking = assert_ok!(state.bookings.create_booking(customer, request).await);

    assert!(matches!(
        state.payments.accept_booking(actor, booking.id).await,
        Err(BookingError::InvalidStateTransition {
            from: BookingStatus::AwaitingPayment,
            ..
        })
    ));

    let session = assert_ok!(
        state
            .payments
            .initiate_payment(customer, booking.id, PaymentMode::Intent)
            .await
    );
    assert_ok!(
        state
            .payments
            .on_funds_secured(booking.id, false, Some(session.artifact_id))
            .await
    );
    let confirmed = assert_ok!(state.payments.accept_booking(actor, booking.id).await);
    assert_eq!(confirmed.status, BookingStatus::Confirmed);
}

#[tokio::test]
async fn strict_mode_refuses_overlap_with_pending_request() {
    let (state, _store, _gateway, provider, service) = common::state(true).await;
    paid_booking(&state, provider, service, at(10, 0), at(11, 0)).await;

    let request = CreateBooking {
        provider_id: provider,
        service_id: Some(service),
        date: day(),
        time_start: at(10, 30),
        time_end: Some(at(11, 30)),
    };
    assert!(matches!(
        state.bookings.create_booking(ActorId::new(), request).await,
        Err(BookingError::BookingConflict(_))
    ));
}

#[tokio::test]
async fn cancelling_captured_booking_refunds_once() {
    let (state, store, gateway, provider, service) = common::state(false).await;
    let booking = secured_booking(&state, provider, service, (at(12, 0), at(13, 0)), true).await;
    assert_eq!(booking.payment_status, PaymentStatus::Captured);

    let customer = ActorId::from_uuid(*booking.customer_id.as_uuid());
    let cancelled = assert_ok!(
        state
            .payments
            .cancel_booking(customer, booking.id, Some("sick".into()))
            .await
    );
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert_eq!(cancelled.payment_status, PaymentStatus::Refunded);

    // A retried cancel is a no-op and moves no money.
    let again = assert_ok!(state.payments.cancel_booking(customer, booking.id, None).await);
    assert_eq!(again.status, BookingStatus::Cancelled);
    assert_eq!(gateway.effects(GatewayOp::Refund).await, 1);

    let stored = assert_ok!(store.get_booking(booking.id).await);
    assert_eq!(stored.reason.as_deref(), Some("sick"));
}

#[tokio::test]
async fn confirmed_booking_cannot_be_cancelled() {
    let (state, _store, _gateway, provider, service) = common::state(false).await;
    let booking = paid_booking(&state, provider, service, at(17, 0), at(18, 0)).await;
    let actor = ActorId::from_uuid(*provider.as_uuid());
    assert_ok!(state.payments.accept_booking(actor, booking.id).await);

    let customer = ActorId::from_uuid(*booking.customer_id.as_uuid());
    assert!(matches!(
        state.payments.cancel_booking(customer, booking.id, None).await,
        Err(BookingError::InvalidStateTransition {
            from: BookingStatus::Confirmed,
            ..
        })
    ));
}

#[tokio::test]
async fn unreachable_gateway_surfaces_as_retryable() {
    let (state, _store, gateway, provider, service) = common::state(false).await;
    let booking = paid_booking(&state, provider, service, at(15, 0), at(16, 0)).await;
    for _ in 0..3 {
        gateway
            .fail_next(GatewayOp::Capture, PaymentGatewayError::Transient("timeout".into()))
            .await;
    }
    let actor = ActorId::from_uuid(*provider.as_uuid());
    let Err(err) = state.payments.accept_booking(actor, booking.id).await else {
        panic!("accept should fail while the gateway is down");
    };
    assert!(err.is_retryable());

    // The booking is untouched, so the provider can simply retry.
    let confirmed = assert_ok!(state.payments.accept_booking(actor, booking.id).await);
    assert_eq!(confirmed.status, BookingStatus::Confirmed);
    assert_eq!(gateway.effects(GatewayOp::Capture).await, 1);
}

#[test]
fn store_handle_is_shareable() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Arc<dyn BookingStore>>();
    assert_send_sync::<AppState>();
}
