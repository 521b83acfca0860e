//! Booking DTOs: create, transition and list.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::common_dto::{PaginationMeta, default_page, default_per_page};
use crate::domain::{Booking, ProviderId, ServiceId};
use crate::service::CreateBooking;

/// Request body for `POST /bookings`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateBookingRequest {
    /// Provider whose schedule the slot is on.
    pub provider_id: ProviderId,
    /// Service being booked; its price is snapshotted.
    #[serde(default)]
    pub service_id: Option<ServiceId>,
    /// Slot date (`YYYY-MM-DD`).
    pub date: NaiveDate,
    /// Slot start (`HH:MM` or `HH:MM:SS`).
    pub time_start: NaiveTime,
    /// Slot end; defaults to start plus the service duration.
    #[serde(default)]
    pub time_end: Option<NaiveTime>,
}

impl From<CreateBookingRequest> for CreateBooking {
    fn from(req: CreateBookingRequest) -> Self {
        Self {
            provider_id: req.provider_id,
            service_id: req.service_id,
            date: req.date,
            time_start: req.time_start,
            time_end: req.time_end,
        }
    }
}

/// Optional body for decline and cancel.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ReasonRequest {
    /// Free-text reason stored on the booking.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Query parameters for `GET /providers/{id}/bookings`.
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct ProviderBookingsQuery {
    /// Only bookings on this date.
    #[serde(default)]
    pub date: Option<NaiveDate>,
    /// Page number (1-indexed). Defaults to 1.
    #[serde(default = "default_page")]
    pub page: u32,
    /// Items per page (max 100). Defaults to 20.
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

/// Paginated response for `GET /providers/{id}/bookings`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BookingListResponse {
    /// Bookings on this page, ordered by start.
    pub data: Vec<Booking>,
    /// Pagination metadata.
    pub pagination: PaginationMeta,
}
