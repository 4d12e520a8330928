//! API key generation
//!
//! Keys are 256 bits from the OS random source, passed through SHA-256 and
//! hex encoded, so every key is exactly [`KEY_LENGTH`] lowercase hex chars.

use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};
use tank_core::{AppError, AppResult};
use tracing::{debug, error};

/// Length of an issued key in characters
pub const KEY_LENGTH: usize = 64;

/// Number of random bytes fed into the digest
const SEED_BYTES: usize = 32;

/// API key issuer
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyIssuer;

impl KeyIssuer {
    pub fn new() -> Self {
        Self
    }

    /// Generate a fresh key
    ///
    /// # Errors
    ///
    /// Returns `AppError::Internal` if the OS random source is unavailable
    pub fn issue(&self) -> AppResult<String> {
        debug!("Issuing API key");

        let mut seed = [0u8; SEED_BYTES];
        OsRng.try_fill_bytes(&mut seed).map_err(|e| {
            error!(error = %e, "OS random source failed");
            AppError::Internal(format!("Failed to gather key entropy: {}", e))
        })?;

        let digest = Sha256::digest(seed);
        Ok(hex::encode(digest))
    }

    /// Keep a caller-supplied key, issue one when it is empty
    pub fn issue_if_empty(&self, key: &str) -> AppResult<String> {
        if key.is_empty() {
            self.issue()
        } else {
            Ok(key.to_string())
        }
    }
}
