//! Booking handlers: create, read, pay, accept, decline, cancel, list.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use uuid::Uuid;

use crate::api::dto::{
    BookingListResponse, CreateBookingRequest, InitiatePaymentRequest, PaginationMeta,
    PaymentSessionResponse, ProviderBookingsQuery, ReasonRequest,
};
use crate::app_state::AppState;
use crate::domain::{ActorId, Booking, BookingId, ProviderId};
use crate::error::{BookingError, ErrorResponse};
use crate::service::PaymentMode;

/// `POST /bookings`: Request a slot.
///
/// # Errors
///
/// Returns [`BookingError`] on invalid input or a taken slot.
#[utoipa::path(
    post,
    path = "/api/v1/bookings",
    tag = "Bookings",
    summary = "Create a booking",
    description = "Reserves a provider slot for the calling customer. The booking starts in `awaiting_payment`; price is taken from the service catalog.",
    params(("x-actor-id" = Uuid, Header, description = "Calling customer")),
    request_body = CreateBookingRequest,
    responses(
        (status = 201, description = "Booking created", body = Booking),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "Unknown service", body = ErrorResponse),
        (status = 409, description = "Slot overlaps a confirmed booking", body = ErrorResponse),
    )
)]
pub async fn create_booking(
    State(state): State<AppState>,
    actor: ActorId,
    Json(req): Json<CreateBookingRequest>,
) -> Result<impl IntoResponse, BookingError> {
    let booking = state.bookings.create_booking(actor, req.into()).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

/// `GET /bookings/{id}`: Booking details for its customer or provider.
///
/// # Errors
///
/// Returns [`BookingError::ResourceMissing`] or [`BookingError::PermissionDenied`].
#[utoipa::path(
    get,
    path = "/api/v1/bookings/{id}",
    tag = "Bookings",
    summary = "Get a booking",
    params(
        ("id" = Uuid, Path, description = "Booking UUID"),
        ("x-actor-id" = Uuid, Header, description = "Customer or provider"),
    ),
    responses(
        (status = 200, description = "Booking", body = Booking),
        (status = 403, description = "Not a party to the booking", body = ErrorResponse),
        (status = 404, description = "Booking not found", body = ErrorResponse),
    )
)]
pub async fn get_booking(
    State(state): State<AppState>,
    actor: ActorId,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, BookingError> {
    let booking = state
        .bookings
        .get_booking(actor, BookingId::from_uuid(id))
        .await?;
    Ok(Json(booking))
}

/// `POST /bookings/{id}/payment`: Start paying for a booking.
///
/// # Errors
///
/// Returns [`BookingError`] if the booking cannot be paid now or the
/// gateway refuses.
#[utoipa::path(
    post,
    path = "/api/v1/bookings/{id}/payment",
    tag = "Payments",
    summary = "Initiate payment",
    description = "Creates a manual-capture payment intent (`intent`) or a hosted checkout session (`checkout`) for the booking total. Repeating the call returns the same artifact.",
    params(
        ("id" = Uuid, Path, description = "Booking UUID"),
        ("x-actor-id" = Uuid, Header, description = "Booking customer"),
    ),
    request_body(content = InitiatePaymentRequest, description = "Payment mode", content_type = "application/json"),
    responses(
        (status = 200, description = "Payment artifact", body = PaymentSessionResponse),
        (status = 409, description = "Booking is not awaiting payment", body = ErrorResponse),
        (status = 422, description = "Provider has no payout account", body = ErrorResponse),
        (status = 503, description = "Gateway unavailable", body = ErrorResponse),
    )
)]
pub async fn initiate_payment(
    State(state): State<AppState>,
    actor: ActorId,
    Path(id): Path<Uuid>,
    body: Option<Json<InitiatePaymentRequest>>,
) -> Result<impl IntoResponse, BookingError> {
    let mode = body
        .and_then(|Json(req)| req.mode)
        .unwrap_or(PaymentMode::Intent);
    let session = state
        .payments
        .initiate_payment(actor, BookingId::from_uuid(id), mode)
        .await?;
    Ok(Json(PaymentSessionResponse::from(session)))
}

/// `POST /bookings/{id}/accept`: Provider accepts a paid booking.
///
/// # Errors
///
/// Returns [`BookingError`] on conflict, capture failure or an illegal state.
#[utoipa::path(
    post,
    path = "/api/v1/bookings/{id}/accept",
    tag = "Bookings",
    summary = "Accept a booking",
    description = "Captures held funds and confirms the booking. Fails with 409 if a confirmed booking already overlaps the slot. Repeating an accept is a no-op.",
    params(
        ("id" = Uuid, Path, description = "Booking UUID"),
        ("x-actor-id" = Uuid, Header, description = "Booking provider"),
    ),
    responses(
        (status = 200, description = "Confirmed booking", body = Booking),
        (status = 402, description = "Capture failed or authorization expired", body = ErrorResponse),
        (status = 409, description = "Conflict or illegal transition", body = ErrorResponse),
    )
)]
pub async fn accept_booking(
    State(state): State<AppState>,
    actor: ActorId,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, BookingError> {
    let booking = state
        .payments
        .accept_booking(actor, BookingId::from_uuid(id))
        .await?;
    Ok(Json(booking))
}

/// `POST /bookings/{id}/decline`: Provider declines a paid booking.
///
/// # Errors
///
/// Returns [`BookingError`] on an illegal state or foreign caller.
#[utoipa::path(
    post,
    path = "/api/v1/bookings/{id}/decline",
    tag = "Bookings",
    summary = "Decline a booking",
    description = "Declines the booking and releases the customer's funds.",
    params(
        ("id" = Uuid, Path, description = "Booking UUID"),
        ("x-actor-id" = Uuid, Header, description = "Booking provider"),
    ),
    request_body(content = ReasonRequest, description = "Optional reason", content_type = "application/json"),
    responses(
        (status = 200, description = "Declined booking", body = Booking),
        (status = 409, description = "Illegal transition", body = ErrorResponse),
    )
)]
pub async fn decline_booking(
    State(state): State<AppState>,
    actor: ActorId,
    Path(id): Path<Uuid>,
    body: Option<Json<ReasonRequest>>,
) -> Result<impl IntoResponse, BookingError> {
    let reason = body.and_then(|Json(req)| req.reason);
    let booking = state
        .payments
        .decline_booking(actor, BookingId::from_uuid(id), reason)
        .await?;
    Ok(Json(booking))
}

/// `POST /bookings/{id}/cancel`: Customer withdraws a booking.
///
/// # Errors
///
/// Returns [`BookingError`] on an illegal state or foreign caller.
#[utoipa::path(
    post,
    path = "/api/v1/bookings/{id}/cancel",
    tag = "Bookings",
    summary = "Cancel a booking",
    description = "Cancels the booking; held or captured funds are released.",
    params(
        ("id" = Uuid, Path, description = "Booking UUID"),
        ("x-actor-id" = Uuid, Header, description = "Booking customer"),
    ),
    request_body(content = ReasonRequest, description = "Optional reason", content_type = "application/json"),
    responses(
        (status = 200, description = "Cancelled booking", body = Booking),
        (status = 409, description = "Illegal transition", body = ErrorResponse),
    )
)]
pub async fn cancel_booking(
    State(state): State<AppState>,
    actor: ActorId,
    Path(id): Path<Uuid>,
    body: Option<Json<ReasonRequest>>,
) -> Result<impl IntoResponse, BookingError> {
    let reason = body.and_then(|Json(req)| req.reason);
    let booking = state
        .payments
        .cancel_booking(actor, BookingId::from_uuid(id), reason)
        .await?;
    Ok(Json(booking))
}

/// `GET /providers/{id}/bookings`: A provider's schedule.
///
/// # Errors
///
/// Returns [`BookingError::PermissionDenied`] for anyone but the provider.
#[utoipa::path(
    get,
    path = "/api/v1/providers/{id}/bookings",
    tag = "Bookings",
    summary = "List provider bookings",
    description = "Returns the provider's bookings ordered by start, optionally for one date.",
    params(
        ("id" = Uuid, Path, description = "Provider UUID"),
        ("x-actor-id" = Uuid, Header, description = "The provider"),
        ProviderBookingsQuery,
    ),
    responses(
        (status = 200, description = "Paginated bookings", body = BookingListResponse),
        (status = 403, description = "Not the provider", body = ErrorResponse),
    )
)]
pub async fn list_provider_bookings(
    State(state): State<AppState>,
    actor: ActorId,
    Path(id): Path<Uuid>,
    Query(query): Query<ProviderBookingsQuery>,
) -> Result<impl IntoResponse, BookingError> {
    let bookings = state
        .bookings
        .list_provider_bookings(actor, ProviderId::from_uuid(id), query.date)
        .await?;

    let pagination = PaginationMeta::new(query.page, query.per_page, bookings.len());
    let per_page = usize::try_from(pagination.per_page).unwrap_or(usize::MAX);
    let data: Vec<Booking> = bookings
        .into_iter()
        .skip(pagination.offset())
        .take(per_page)
        .collect();

    Ok(Json(BookingListResponse { data, pagination }))
}

/// Booking routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/bookings", post(create_booking))
        .route("/bookings/{id}", get(get_booking))
        .route("/bookings/{id}/payment", post(initiate_payment))
        .route("/bookings/{id}/accept", post(accept_booking))
        .route("/bookings/{id}/decline", post(decline_booking))
        .route("/bookings/{id}/cancel", post(cancel_booking))
        .route("/providers/{id}/bookings", get(list_provider_bookings))
}
