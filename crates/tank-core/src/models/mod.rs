//! Domain models for PhoneTank
//!
//! This module contains all the core domain models used throughout the application.

pub mod call;
pub mod phone_number;
pub mod provider;
pub mod reservation;
pub mod subscriber;
pub mod tank;

pub use call::Call;
pub use phone_number::PhoneNumber;
pub use provider::{OverflowProvider, Provider};
pub use reservation::Reservation;
pub use subscriber::{ApiKey, Subscriber};
pub use tank::Tank;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque entity identity
///
/// Backed by a UUIDv7, so ids are globally unique across entity types and
/// sort in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(Uuid);

impl Id {
    /// Generate a fresh time-ordered id
    pub fn new() -> Self {
        Id(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for Id {
    fn from(u: Uuid) -> Self {
        Id(u)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Id {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_time_ordered() {
        let a = Id::new();
        let b = Id::new();
        assert!(a < b);
        assert_ne!(a, b);
    }

    #[test]
    fn test_id_parse_display() {
        let id = Id::new();
        let parsed: Id = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-an-id".parse::<Id>().is_err());
    }
}
