//! Lease manager
//!
//! Creates reservations so that at most one non-expired reservation exists
//! per phone number. Two layers guard a creation:
//!
//! - an in-process async mutex keyed by phone number id, held for the whole
//!   assignment
//! - inside the transaction, a row lock on the number followed by the
//!   reservation save check that no non-expired reservation exists for it
//!
//! Same-process contenders queue on the first layer; processes sharing a
//! database meet at the second. Lookups never take either lock.

use crate::policy;
use crate::repository::save_in;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tank_core::codec::Metadata;
use tank_core::config::PoolConfig;
use tank_core::models::{Id, PhoneNumber, Reservation, Tank};
use tank_core::query::Query;
use tank_core::traits::{Store, StoreTx};
use tank_core::{AppError, AppResult, Visibility};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, instrument, warn};

/// Caller context for a new lease
#[derive(Debug, Clone, Default)]
pub struct LeaseRequest {
    /// Originating number of the caller the lease is made for
    pub ani: u64,

    /// Lease duration in seconds; tank or pool default when `None`
    pub ttl_seconds: Option<i64>,

    pub meta: Metadata,
}

impl LeaseRequest {
    pub fn new(ani: u64) -> Self {
        Self {
            ani,
            ..Default::default()
        }
    }

    pub fn ttl(mut self, seconds: i64) -> Self {
        self.ttl_seconds = Some(seconds);
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }
}

type LockRegistry = Mutex<HashMap<Id, Arc<AsyncMutex<()>>>>;

/// Lease manager
pub struct LeaseManager<S: Store> {
    store: Arc<S>,
    config: PoolConfig,
    locks: Arc<LockRegistry>,
}

impl<S: Store> Clone for LeaseManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            locks: Arc::clone(&self.locks),
        }
    }
}

impl<S: Store> LeaseManager<S> {
    /// Create a new lease manager
    pub fn new(store: Arc<S>, config: PoolConfig) -> Self {
        Self {
            store,
            config,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lock_for(&self, phone_number_id: Id) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(phone_number_id).or_default())
    }

    /// Drop the registry entry once nobody else holds or waits on it
    fn release(&self, phone_number_id: Id, lock: Arc<AsyncMutex<()>>) {
        let mut locks = self.locks.lock();
        // One reference in the map, one here
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(&phone_number_id);
        }
    }

    /// Number of numbers with a registered lock; zero when idle
    pub fn pending_locks(&self) -> usize {
        self.locks.lock().len()
    }

    /// Lease a specific number
    ///
    /// # Errors
    ///
    /// - `NotFound` if the number is unknown or retired, or its tank is gone
    /// - `Validation` if the tank is disabled or the ttl is not positive
    /// - `Conflict` if the number already has a non-expired reservation
    #[instrument(skip(self, request), fields(ani = request.ani))]
    pub async fn reserve(&self, phone_number_id: Id, request: LeaseRequest) -> AppResult<Reservation> {
        let lock = self.lock_for(phone_number_id);
        let result = {
            let _guard = lock.lock().await;
            self.reserve_locked(phone_number_id, request).await
        };
        self.release(phone_number_id, lock);
        result
    }

    async fn reserve_locked(&self, phone_number_id: Id, request: LeaseRequest) -> AppResult<Reservation> {
        let mut tx = self.store.begin().await?;

        if !tx.lock::<PhoneNumber>(phone_number_id).await? {
            return Err(AppError::not_found("phone number", phone_number_id));
        }

        let mut number = tx
            .find::<PhoneNumber>(phone_number_id, Visibility::Live)
            .await?
            .ok_or_else(|| AppError::not_found("phone number", phone_number_id))?;

        let tank = tx
            .find::<Tank>(number.tank_id, Visibility::Live)
            .await?
            .ok_or_else(|| AppError::not_found("tank", number.tank_id))?;
        policy::ensure_enabled(&tank)?;

        let ttl = policy::lease_ttl(request.ttl_seconds, &tank, &self.config)?;
        let mut reservation = Reservation::new(phone_number_id, number.tank_id, request.ani, ttl)?;
        reservation.meta = request.meta;
        // The save hook refuses the lease while another one is active
        let reservation = save_in(&mut tx, reservation).await?;

        number.last_reservation = reservation.created_at.or_else(|| Some(Utc::now()));
        save_in(&mut tx, number.clone()).await?;

        tx.commit().await?;

        info!(
            "Leased number {} in tank {} to {} until {}",
            number.number, tank.name, request.ani, reservation.expiration
        );
        Ok(reservation)
    }

    /// Lease any free number of a tank, least recently reserved first
    ///
    /// # Errors
    ///
    /// - `NotFound` if the tank does not exist
    /// - `Validation` if the tank is disabled
    /// - `PoolExhausted` if no number could be leased, carrying the
    ///   subscriber's overflow fallback when one is configured
    #[instrument(skip(self, request), fields(ani = request.ani))]
    pub async fn assign(&self, tank_id: Id, request: LeaseRequest) -> AppResult<Reservation> {
        let (tank, mut candidates) = {
            let mut tx = self.store.begin().await?;
            let tank = tx
                .find::<Tank>(tank_id, Visibility::Live)
                .await?
                .ok_or_else(|| AppError::not_found("tank", tank_id))?;
            policy::ensure_enabled(&tank)?;

            let numbers: Vec<PhoneNumber> = tx
                .select(&Query::new().filter_eq("tank_id", tank_id))
                .await?;
            tx.commit().await?;
            (tank, numbers)
        };

        // Never-reserved numbers sort first; ties keep creation order
        candidates.sort_by_key(|n| n.last_reservation);

        for number in candidates.iter().take(self.config.max_lease_attempts) {
            let Some(id) = number.id else { continue };
            match self.reserve(id, request.clone()).await {
                Ok(reservation) => return Ok(reservation),
                Err(AppError::Conflict(_)) | Err(AppError::NotFound(_)) => {
                    debug!("Number {} unavailable, trying next", number.number);
                }
                Err(e) => return Err(e),
            }
        }

        warn!("Tank {} has no free number", tank.name);
        let mut tx = self.store.begin().await?;
        let overflow = policy::overflow_for(&mut tx, &tank).await?;
        tx.commit().await?;

        Err(policy::exhausted(&tank, overflow.as_ref()))
    }
}
