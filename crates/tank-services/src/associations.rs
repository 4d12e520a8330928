//! Association resolution
//!
//! Related rows are loaded live-only unless a relationship says otherwise.
//! The single exception is the number behind a reservation or a call: it is
//! loaded with [`Visibility::IncludeDeleted`] so history keeps resolving after
//! the number is retired. The override lives on that one edge; tank and
//! provider number listings stay live-only.

use async_trait::async_trait;
use tank_core::models::{
    ApiKey, Call, Id, OverflowProvider, PhoneNumber, Provider, Reservation, Subscriber, Tank,
};
use tank_core::query::Query;
use tank_core::traits::{Entity, StoreTx};
use tank_core::{AppResult, Visibility};
use tracing::debug;

/// Per-entity related data loading
#[async_trait]
pub trait Related: Entity {
    /// Associations loaded on every read
    async fn load_always<X: StoreTx>(&mut self, _tx: &mut X) -> AppResult<()> {
        Ok(())
    }

    /// Associations loaded only when related data was requested
    async fn load_related<X: StoreTx>(&mut self, _tx: &mut X) -> AppResult<()> {
        Ok(())
    }
}

/// Parent row of a belongs-to edge under the given visibility
pub async fn belongs_to<P: Entity, X: StoreTx>(
    tx: &mut X,
    id: Id,
    visibility: Visibility,
) -> AppResult<Option<P>> {
    tx.find::<P>(id, visibility).await
}

/// Live children whose `column` points at `id`, oldest first
pub async fn has_many<C: Entity, X: StoreTx>(
    tx: &mut X,
    column: &str,
    id: Option<Id>,
) -> AppResult<Vec<C>> {
    match id {
        Some(id) => tx.select::<C>(&Query::new().filter_eq(column, id)).await,
        None => Ok(Vec::new()),
    }
}

#[async_trait]
impl Related for Provider {
    async fn load_related<X: StoreTx>(&mut self, tx: &mut X) -> AppResult<()> {
        debug!("Loading overflow provider and numbers for provider {:?}", self.id);
        self.overflow_provider = match self.id {
            Some(id) => {
                tx.select_one::<OverflowProvider>(Query::new().filter_eq("provider_id", id))
                    .await?
            }
            None => None,
        };
        self.phone_numbers = has_many(tx, "provider_id", self.id).await?;
        Ok(())
    }
}

impl Related for OverflowProvider {}

#[async_trait]
impl Related for Subscriber {
    async fn load_related<X: StoreTx>(&mut self, tx: &mut X) -> AppResult<()> {
        debug!("Loading tanks and keys for subscriber {:?}", self.id);
        self.tanks = has_many(tx, "subscriber_id", self.id).await?;
        self.keys = has_many(tx, "subscriber_id", self.id).await?;
        Ok(())
    }
}

impl Related for ApiKey {}

#[async_trait]
impl Related for Tank {
    async fn load_always<X: StoreTx>(&mut self, tx: &mut X) -> AppResult<()> {
        self.subscriber = belongs_to::<Subscriber, _>(tx, self.subscriber_id, Visibility::Live)
            .await?
            .map(Box::new);
        Ok(())
    }

    async fn load_related<X: StoreTx>(&mut self, tx: &mut X) -> AppResult<()> {
        debug!("Loading live numbers for tank {:?}", self.id);
        self.phone_numbers = has_many(tx, "tank_id", self.id).await?;
        Ok(())
    }
}

impl Related for PhoneNumber {}

#[async_trait]
impl Related for Reservation {
    async fn load_related<X: StoreTx>(&mut self, tx: &mut X) -> AppResult<()> {
        self.tank = belongs_to(tx, self.tank_id, Visibility::Live).await?;
        self.phone_number =
            belongs_to(tx, self.phone_number_id, Visibility::IncludeDeleted).await?;
        Ok(())
    }
}

#[async_trait]
impl Related for Call {
    async fn load_related<X: StoreTx>(&mut self, tx: &mut X) -> AppResult<()> {
        self.reservation = belongs_to::<Reservation, _>(tx, self.reservation_id, Visibility::Live)
            .await?
            .map(Box::new);
        self.phone_number =
            belongs_to(tx, self.phone_number_id, Visibility::IncludeDeleted).await?;
        Ok(())
    }
}
