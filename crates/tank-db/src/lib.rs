//! PhoneTank Database Layer
//!
//! This crate provides the storage backends behind the `Store` trait:
//!
//! - `PgStore`: PostgreSQL via sqlx, with the schema shipped as migrations
//! - `MemoryStore`: an in-process engine with the same constraint semantics,
//!   used by tests and by embedders that do not need durability
//! - Connection pool management

pub mod memory;
pub mod pool;
pub mod postgres;

pub use memory::{MemoryStore, MemoryTx};
pub use pool::{create_pool, create_pool_from_config, run_migrations};
pub use postgres::{PgStore, PgTx};

// Re-export commonly used types
pub use sqlx::PgPool;
pub use tank_core::{AppError, AppResult};
