//! PhoneTank Core Library
//!
//! This crate provides the foundational types, traits, and error handling
//! for the PhoneTank number pool. It includes:
//!
//! - Domain models (Provider, Tank, PhoneNumber, Reservation, Call, etc.)
//! - The storage abstraction every backend implements (`Store`, `StoreTx`)
//! - Query, row and value types shared by the backends
//! - The reservation metadata codec
//! - Unified error handling and application configuration

pub mod codec;
pub mod config;
pub mod error;
pub mod models;
pub mod query;
pub mod traits;

pub use config::AppConfig;
pub use error::{AppError, BatchError};
pub use models::Id;
pub use query::{Query, Visibility};

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
