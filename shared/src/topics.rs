//! Command topics
//!
//! Topic names are the only type discriminator on the wire, so the set is
//! closed and case-sensitive.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    CreateBooking,
    BookingCancelled,
    PaymentProcessed,
    ReviewSubmitted,
    CreateNotification,
    /// Routable, but no producer publishes to it.
    BookingUpdated,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown topic: {0}")]
pub struct UnknownTopic(pub String);

impl Topic {
    /// Topics that producers publish to.
    pub const LIVE: [Topic; 5] = [
        Topic::CreateBooking,
        Topic::BookingCancelled,
        Topic::PaymentProcessed,
        Topic::ReviewSubmitted,
        Topic::CreateNotification,
    ];

    pub const ALL: [Topic; 6] = [
        Topic::CreateBooking,
        Topic::BookingCancelled,
        Topic::PaymentProcessed,
        Topic::ReviewSubmitted,
        Topic::CreateNotification,
        Topic::BookingUpdated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::CreateBooking => "create_booking",
            Topic::BookingCancelled => "booking_cancelled",
            Topic::PaymentProcessed => "payment_processed",
            Topic::ReviewSubmitted => "review_submitted",
            Topic::CreateNotification => "create_notification",
            Topic::BookingUpdated => "booking_updated",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = UnknownTopic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .iter()
            .copied()
            .find(|topic| topic.as_str() == s)
            .ok_or_else(|| UnknownTopic(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for topic in Topic::ALL {
            assert_eq!(topic.as_str().parse::<Topic>(), Ok(topic));
        }
    }

    #[test]
    fn test_names_are_case_sensitive() {
        assert!("Create_Booking".parse::<Topic>().is_err());
        assert!("CREATE_BOOKING".parse::<Topic>().is_err());
    }

    #[test]
    fn test_booking_updated_is_not_live() {
        assert!(!Topic::LIVE.contains(&Topic::BookingUpdated));
        assert_eq!(Topic::LIVE.len() + 1, Topic::ALL.len());
    }

    #[test]
    fn test_serde_uses_wire_names() {
        for topic in Topic::ALL {
            let json = serde_json::to_string(&topic).unwrap();
            assert_eq!(json, format!("\"{}\"", topic.as_str()));
            assert_eq!(serde_json::from_str::<Topic>(&json).unwrap(), topic);
        }
        assert!(serde_json::from_str::<Topic>("\"CreateBooking\"").is_err());
    }
}
