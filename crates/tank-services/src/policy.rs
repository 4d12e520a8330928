//! Pool and tank policy
//!
//! Tank-level rules: field constraints, pool capacity, the enabled switch,
//! lease duration defaults and the overflow fallback reported when a pool
//! runs dry.

use crate::constants::{FALLBACK_URL_SCHEMES, MAX_LEASE_TTL_SECS};
use chrono::Utc;
use tank_core::config::PoolConfig;
use tank_core::models::{Id, OverflowProvider, PhoneNumber, Reservation, Subscriber, Tank};
use tank_core::query::Query;
use tank_core::traits::StoreTx;
use tank_core::{AppError, AppResult, Visibility};
use tracing::{debug, warn};
use validator::Validate;

/// Field-level tank rules
pub fn validate_tank(tank: &Tank) -> AppResult<()> {
    tank.validate()?;

    if let Some(url) = tank.fallback_url() {
        let host = FALLBACK_URL_SCHEMES
            .iter()
            .find_map(|scheme| url.strip_prefix(scheme));
        match host {
            Some(rest) if !rest.is_empty() && !rest.starts_with('/') => {}
            _ => {
                return Err(AppError::Validation(format!(
                    "fallback_url must be an absolute http(s) URL, got {}",
                    url
                )))
            }
        }
    }

    Ok(())
}

/// Verify `tank_id` can take one more live number
///
/// Locks the tank row first so two concurrent inserts cannot both see the
/// last free slot.
pub async fn check_capacity<X: StoreTx>(tx: &mut X, tank_id: Id) -> AppResult<Tank> {
    tx.lock::<Tank>(tank_id).await?;

    let tank = tx
        .find::<Tank>(tank_id, Visibility::Live)
        .await?
        .ok_or_else(|| AppError::Validation(format!("tank {} does not exist", tank_id)))?;

    let live: Vec<PhoneNumber> = tx
        .select(&Query::new().filter_eq("tank_id", tank_id))
        .await?;

    debug!(
        "Tank {} holds {} live numbers (max {})",
        tank.name,
        live.len(),
        tank.max_tank_size
    );

    if !tank.has_capacity_for(live.len()) {
        warn!("Tank {} is full", tank.name);
        return Err(AppError::Validation(format!(
            "tank {} is full: {} of {} numbers in use",
            tank.name,
            live.len(),
            tank.max_tank_size
        )));
    }

    Ok(tank)
}

/// Refuse leases on a disabled tank
pub fn ensure_enabled(tank: &Tank) -> AppResult<()> {
    if tank.enabled {
        Ok(())
    } else {
        Err(AppError::Validation(format!("tank {} is disabled", tank.name)))
    }
}

/// Lease duration: explicit value, else the tank default, else the configured default
///
/// Whichever source wins must lie in `1..=MAX_LEASE_TTL_SECS`.
pub fn lease_ttl(explicit: Option<i64>, tank: &Tank, config: &PoolConfig) -> AppResult<i64> {
    let ttl = match explicit {
        Some(ttl) => ttl,
        None if tank.default_ttl > 0 => i64::from(tank.default_ttl),
        None => config.default_ttl_secs,
    };

    if (1..=MAX_LEASE_TTL_SECS).contains(&ttl) {
        Ok(ttl)
    } else {
        Err(AppError::Validation(format!(
            "lease ttl must be between 1 and {} seconds, got {}",
            MAX_LEASE_TTL_SECS, ttl
        )))
    }
}

/// Refuse a new lease while the number still has a non-expired one
pub async fn ensure_no_active_lease<X: StoreTx>(tx: &mut X, number: &PhoneNumber) -> AppResult<()> {
    let active = tx
        .select_one::<Reservation>(
            Query::new()
                .filter_eq("phone_number_id", number.id)
                .filter_gt("expiration", Utc::now())
                .most_recent_first(),
        )
        .await?;

    match active {
        Some(active) => {
            debug!("Number {} is held until {}", number.number, active.expiration);
            Err(AppError::Conflict(format!(
                "phone number {} already has an active reservation until {}",
                number.number, active.expiration
            )))
        }
        None => Ok(()),
    }
}

/// Overflow provider configured for the tank's subscriber, if any
pub async fn overflow_for<X: StoreTx>(
    tx: &mut X,
    tank: &Tank,
) -> AppResult<Option<OverflowProvider>> {
    let subscriber = tx
        .find::<Subscriber>(tank.subscriber_id, Visibility::Live)
        .await?;

    match subscriber.and_then(|s| s.overflow_provider_id) {
        Some(id) => tx.find::<OverflowProvider>(id, Visibility::Live).await,
        None => Ok(None),
    }
}

/// Error reported when a tank has no free number
pub fn exhausted(tank: &Tank, overflow: Option<&OverflowProvider>) -> AppError {
    let message = match overflow {
        Some(o) => format!(
            "tank {} has no free number; overflow to {} (increment {})",
            tank.name, o.name, o.increment
        ),
        None => format!("tank {} has no free number", tank.name),
    };

    AppError::PoolExhausted {
        message,
        overflow_fallback_id: overflow.map(|o| o.fallback_id.clone()),
    }
}
