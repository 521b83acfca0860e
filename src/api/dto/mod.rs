//! Data Transfer Objects for REST request/response serialization.
//!
//! Money is always an integer amount of minor currency units.

pub mod booking_dto;
pub mod common_dto;
pub mod payment_dto;

pub use booking_dto::*;
pub use common_dto::*;
pub use payment_dto::*;
