//! Call routing
//!
//! A dialed number plus the caller's ANI resolve to the caller's own live
//! lease when there is one. Otherwise the call falls through to the fallback
//! of the tank that owns the number.

use crate::lookup::most_recent_in;
use crate::repository::{get_in, live_number_in, save_in};
use std::sync::Arc;
use tank_core::models::{Call, Id, PhoneNumber, Reservation, Tank};
use tank_core::traits::{Store, StoreTx};
use tank_core::{AppError, AppResult, Visibility};
use tracing::{debug, info, instrument};

/// Where a call should go
#[derive(Debug, Clone)]
pub enum Route {
    /// The caller holds a live lease on the dialed number
    Lease {
        reservation: Box<Reservation>,
        tank: Box<Tank>,
    },
    /// No live lease for this caller
    Fallback {
        tank: Box<Tank>,
        /// Latest lease on the number from any caller, if one exists
        last_reservation: Option<Box<Reservation>>,
        number: Option<u64>,
        url: Option<String>,
    },
}

impl Route {
    pub fn tank(&self) -> &Tank {
        match self {
            Route::Lease { tank, .. } | Route::Fallback { tank, .. } => tank.as_ref(),
        }
    }

    pub fn is_lease(&self) -> bool {
        matches!(self, Route::Lease { .. })
    }
}

/// Call router
pub struct CallRouter<S: Store> {
    store: Arc<S>,
}

impl<S: Store> Clone for CallRouter<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: Store> CallRouter<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Resolve a dialed number for a caller
    ///
    /// # Errors
    ///
    /// `NotFound` if the dialed number is not a live pool number
    #[instrument(skip(self))]
    pub async fn route(&self, dialed: u64, caller: u64) -> AppResult<Route> {
        let mut tx = self.store.begin().await?;
        let route = route_in(&mut tx, dialed, caller).await?;
        tx.commit().await?;

        debug!(lease = route.is_lease(), "Routed {} from {}", dialed, caller);
        Ok(route)
    }

    /// Append a call against a reservation and stamp the number's last call
    ///
    /// # Errors
    ///
    /// `NotFound` if the reservation does not exist or was deleted
    #[instrument(skip(self))]
    pub async fn record_call(&self, reservation_id: Id, ani: u64, destination: u64) -> AppResult<Call> {
        let mut tx = self.store.begin().await?;
        let call = record_call_in(&mut tx, reservation_id, ani, destination).await?;
        tx.commit().await?;

        info!("Recorded call {:?} on reservation {}", call.id, reservation_id);
        Ok(call)
    }
}

pub async fn route_in<X: StoreTx>(tx: &mut X, dialed: u64, caller: u64) -> AppResult<Route> {
    match most_recent_in(tx, dialed, Some(caller), true).await {
        Ok(mut reservation) if !reservation.is_expired() => {
            if let Some(tank) = reservation.tank.take() {
                return Ok(Route::Lease {
                    reservation: Box::new(reservation),
                    tank: Box::new(tank),
                });
            }
        }
        Ok(_) | Err(AppError::NotFound(_)) => {}
        Err(e) => return Err(e),
    }

    let number = live_number_in(tx, dialed).await?;
    let tank: Tank = get_in(tx, number.tank_id, false).await?;

    let last_reservation = match most_recent_in(tx, dialed, None, false).await {
        Ok(reservation) => Some(Box::new(reservation)),
        Err(AppError::NotFound(_)) => None,
        Err(e) => return Err(e),
    };

    Ok(Route::Fallback {
        number: tank.fallback_number(),
        url: tank.fallback_url().map(str::to_string),
        last_reservation,
        tank: Box::new(tank),
    })
}

pub async fn record_call_in<X: StoreTx>(
    tx: &mut X,
    reservation_id: Id,
    ani: u64,
    destination: u64,
) -> AppResult<Call> {
    let reservation = tx
        .find::<Reservation>(reservation_id, Visibility::Live)
        .await?
        .ok_or_else(|| AppError::not_found("reservation", reservation_id))?;

    let call = save_in(
        tx,
        Call::new(reservation.phone_number_id, reservation_id, ani, destination),
    )
    .await?;

    // A retired number keeps its history but is no longer stamped
    if let Some(mut number) = tx
        .find::<PhoneNumber>(reservation.phone_number_id, Visibility::Live)
        .await?
    {
        number.last_call = call.created_at;
        save_in(tx, number).await?;
    }

    Ok(call)
}
