//! Reservation lookup engine
//!
//! A number is leased and released many times over its life, so its current
//! tenant is whichever reservation was created last. Both lookups order by
//! creation time descending (id as tiebreaker) and return the first match.
//! They only read; leases are created by the lease manager.

use crate::repository::{live_number_in, resolve};
use std::sync::Arc;
use tank_core::models::Reservation;
use tank_core::query::Query;
use tank_core::traits::{Store, StoreTx};
use tank_core::{AppError, AppResult};
use tracing::{debug, instrument};

/// Most recent reservation for a dialed number, optionally narrowed to one caller
///
/// # Errors
///
/// `NotFound` if the number is not live or has no matching reservation
pub async fn most_recent_in<X: StoreTx>(
    tx: &mut X,
    dialed: u64,
    caller: Option<u64>,
    with_related: bool,
) -> AppResult<Reservation> {
    let number = live_number_in(tx, dialed).await?;

    let mut query = Query::new().filter_eq("phone_number_id", number.id);
    if let Some(caller) = caller {
        query = query.filter_eq("ani_phone_number", caller);
    }

    let mut reservation = tx
        .select_one::<Reservation>(query.most_recent_first())
        .await?
        .ok_or_else(|| match caller {
            Some(caller) => AppError::NotFound(format!(
                "reservation for number {} and caller {}",
                dialed, caller
            )),
            None => AppError::NotFound(format!("reservation for number {}", dialed)),
        })?;

    debug!(
        "Number {} resolved to reservation {:?}",
        dialed, reservation.id
    );

    resolve(tx, &mut reservation, with_related).await?;
    Ok(reservation)
}

/// Reservation lookup engine
pub struct ReservationLookup<S: Store> {
    store: Arc<S>,
}

impl<S: Store> Clone for ReservationLookup<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: Store> ReservationLookup<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Latest reservation made on the dialed number
    #[instrument(skip(self))]
    pub async fn most_recent_by_number(
        &self,
        dialed: u64,
        with_related: bool,
    ) -> AppResult<Reservation> {
        let mut tx = self.store.begin().await?;
        let reservation = most_recent_in(&mut tx, dialed, None, with_related).await?;
        tx.commit().await?;
        Ok(reservation)
    }

    /// Latest reservation made on the dialed number for this caller
    ///
    /// A returning caller gets back the reservation they were bound to,
    /// never one made for a different caller.
    #[instrument(skip(self))]
    pub async fn most_recent_by_number_and_caller(
        &self,
        dialed: u64,
        caller: u64,
        with_related: bool,
    ) -> AppResult<Reservation> {
        let mut tx = self.store.begin().await?;
        let reservation = most_recent_in(&mut tx, dialed, Some(caller), with_related).await?;
        tx.commit().await?;
        Ok(reservation)
    }
}
