//! Credential issuance for PhoneTank
//!
//! Subscribers authenticate with opaque API keys. This crate generates them;
//! verifying a presented key is a lookup against the store and lives with
//! the repositories.
//!
//! # Examples
//!
//! ```
//! use tank_auth::KeyIssuer;
//!
//! let issuer = KeyIssuer::new();
//! let key = issuer.issue()?;
//! assert_eq!(key.len(), tank_auth::KEY_LENGTH);
//! # Ok::<(), tank_core::AppError>(())
//! ```

pub mod credential;

pub use credential::{KeyIssuer, KEY_LENGTH};
