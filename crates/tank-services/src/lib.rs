//! Number pool services for PhoneTank
//!
//! This crate holds every rule with domain meaning, layered over the
//! storage traits from `tank-core` so it runs unchanged on any backend.
//!
//! # Architecture
//!
//! - Every public operation runs in exactly one store transaction
//! - Transaction-scoped `*_in` functions take `&mut impl StoreTx` so callers
//!   can compose several operations into one atomic unit
//! - Visibility of soft-deleted rows is always an explicit parameter
//!
//! # Services
//!
//! - `Repository` - get/list/save/delete per entity, with related data on request
//! - `ReservationLookup` - most recent lease for a number, optionally per caller
//! - `LeaseManager` - lease creation under per-number mutual exclusion
//! - `CallRouter` - dialed number to lease or tank fallback, call recording

pub mod associations;
pub mod lease;
pub mod lookup;
pub mod policy;
pub mod repository;
pub mod routing;

pub use associations::Related;
pub use lease::{LeaseManager, LeaseRequest};
pub use lookup::ReservationLookup;
pub use repository::{Persist, Record, Repository};
pub use routing::{CallRouter, Route};

/// Pool constants
pub mod constants {
    /// Scheme prefixes accepted for a tank fallback URL
    pub const FALLBACK_URL_SCHEMES: [&str; 2] = ["http://", "https://"];

    /// Longest lease accepted, in seconds (one leap year)
    pub const MAX_LEASE_TTL_SECS: i64 = 366 * 24 * 60 * 60;
}
