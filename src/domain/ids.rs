//! Type-safe identifiers for bookings and the parties involved in them.
//!
//! Each identifier is a newtype around [`uuid::Uuid`] so a provider id can
//! never be passed where a customer id is expected.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            Serialize, Deserialize, ToSchema, sqlx::Type,
        )]
        #[serde(transparent)]
        #[sqlx(transparent)]
        pub struct $name(uuid::Uuid);

        impl $name {
            /// Creates a new random identifier (UUID v4).
            #[must_use]
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            /// Wraps an existing [`uuid::Uuid`].
            #[must_use]
            pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner [`uuid::Uuid`].
            #[must_use]
            pub const fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<uuid::Uuid> for $name {
            fn from(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for uuid::Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a booking. Generated at creation, immutable.
    BookingId
);

uuid_id!(
    /// Identifier of the customer who requested a booking.
    CustomerId
);

uuid_id!(
    /// Identifier of the provider whose schedule a booking occupies.
    ProviderId
);

uuid_id!(
    /// Identifier of a provider's service offering.
    ServiceId
);

uuid_id!(
    /// Authenticated caller, as asserted by the upstream auth layer.
    ///
    /// Compared against a booking's customer and provider to decide which
    /// transitions the caller may request.
    ActorId
);

impl ActorId {
    /// `true` if the caller is `customer`.
    #[must_use]
    pub fn is_customer(&self, customer: CustomerId) -> bool {
        self.0 == customer.0
    }

    /// `true` if the caller is `provider`.
    #[must_use]
    pub fn is_provider(&self, provider: ProviderId) -> bool {
        self.0 == provider.0
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn new_generates_unique_ids() {
        assert_ne!(BookingId::new(), BookingId::new());
    }

    #[test]
    fn display_is_uuid_format() {
        let s = ProviderId::new().to_string();
        assert_eq!(s.len(), 36);
        assert!(s.contains('-'));
    }

    #[test]
    fn serializes_as_bare_uuid() {
        let uuid = uuid::Uuid::new_v4();
        let id = BookingId::from_uuid(uuid);
        let Ok(json) = serde_json::to_string(&id) else {
            panic!("serialization failed");
        };
        assert_eq!(json, format!("\"{uuid}\""));
    }

    #[test]
    fn actor_matches_by_uuid() {
        let uuid = uuid::Uuid::new_v4();
        let actor = ActorId::from_uuid(uuid);
        assert!(actor.is_customer(CustomerId::from_uuid(uuid)));
        assert!(actor.is_provider(ProviderId::from_uuid(uuid)));
        assert!(!actor.is_customer(CustomerId::new()));
    }

    #[test]
    fn from_uuid_round_trip() {
        let uuid = uuid::Uuid::new_v4();
        let id = CustomerId::from(uuid);
        assert_eq!(*id.as_uuid(), uuid);
        assert_eq!(uuid::Uuid::from(id), uuid);
    }
}
