//! REST API layer: route handlers, DTOs, and router composition.
//!
//! All endpoints are mounted under `/api/v1`; `/health` is also served at
//! the root for load balancers.

pub mod dto;
pub mod extract;
pub mod handlers;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::app_state::AppState;

/// OpenAPI document for the REST surface.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "booking-gateway",
        description = "Slot booking with conflict-free scheduling and payment-driven lifecycle."
    ),
    paths(
        handlers::bookings::create_booking,
        handlers::bookings::get_booking,
        handlers::bookings::initiate_payment,
        handlers::bookings::accept_booking,
        handlers::bookings::decline_booking,
        handlers::bookings::cancel_booking,
        handlers::bookings::list_provider_bookings,
        handlers::webhooks::payment_webhook,
        handlers::system::health_handler,
    ),
    tags(
        (name = "Bookings", description = "Booking lifecycle"),
        (name = "Payments", description = "Payment initiation"),
        (name = "Webhooks", description = "Gateway notifications"),
        (name = "System", description = "Operational endpoints"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    let router = Router::new()
        .nest(
            "/api/v1",
            handlers::routes().merge(handlers::system::routes()),
        )
        .merge(handlers::system::routes());
    with_docs(router)
}

/// The full HTTP application: REST routes, operator feed, tracing and CORS.
pub fn build_app(state: AppState) -> Router {
    build_router()
        .merge(crate::ws::routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

#[cfg(feature = "swagger-ui")]
fn with_docs(router: Router<AppState>) -> Router<AppState> {
    router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    )
}

#[cfg(not(feature = "swagger-ui"))]
fn with_docs(router: Router<AppState>) -> Router<AppState> {
    router.route(
        "/api-docs/openapi.json",
        axum::routing::get(|| async { axum::Json(ApiDoc::openapi()) }),
    )
}
