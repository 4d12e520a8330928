//! Generic entity repository
//!
//! `save` inserts when the entity carries no identity and updates in place
//! otherwise. Every [`Repository`] method is one transaction; the `*_in`
//! functions run inside a caller-owned transaction instead.

use crate::associations::Related;
use crate::policy;
use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::Arc;
use tank_auth::KeyIssuer;
use tank_core::models::{
    ApiKey, Call, Id, OverflowProvider, PhoneNumber, Provider, Reservation, Subscriber, Tank,
};
use tank_core::query::Query;
use tank_core::traits::{Entity, Store, StoreTx};
use tank_core::{AppError, AppResult, BatchError, Visibility};
use tracing::{debug, info, instrument, warn};
use validator::Validate;

/// Save-time rules per entity
#[async_trait]
pub trait Persist: Related + Validate {
    /// Check and complete an entity before it is written
    async fn before_save<X: StoreTx>(&mut self, _tx: &mut X) -> AppResult<()> {
        self.validate()?;
        Ok(())
    }
}

/// An entity the repository can manage
pub trait Record: Persist {}

impl<T: Persist> Record for T {}

impl Persist for Provider {}

impl Persist for OverflowProvider {}

impl Persist for Subscriber {}

#[async_trait]
impl Persist for ApiKey {
    async fn before_save<X: StoreTx>(&mut self, _tx: &mut X) -> AppResult<()> {
        self.key = KeyIssuer::new().issue_if_empty(&self.key)?;
        self.validate()?;
        Ok(())
    }
}

#[async_trait]
impl Persist for Tank {
    async fn before_save<X: StoreTx>(&mut self, _tx: &mut X) -> AppResult<()> {
        policy::validate_tank(self)
    }
}

#[async_trait]
impl Persist for PhoneNumber {
    async fn before_save<X: StoreTx>(&mut self, tx: &mut X) -> AppResult<()> {
        self.validate()?;

        // Only a number entering a tank takes a slot
        let entering = match self.id {
            None => true,
            Some(id) => tx
                .find::<PhoneNumber>(id, Visibility::Live)
                .await?
                .is_some_and(|stored| stored.tank_id != self.tank_id),
        };

        if entering {
            policy::check_capacity(tx, self.tank_id).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Persist for Reservation {
    async fn before_save<X: StoreTx>(&mut self, tx: &mut X) -> AppResult<()> {
        self.validate()?;

        let Some(id) = self.id else {
            // New lease: serialize against other creations for the same number
            tx.lock::<PhoneNumber>(self.phone_number_id).await?;

            let number = tx
                .find::<PhoneNumber>(self.phone_number_id, Visibility::Live)
                .await?
                .ok_or_else(|| {
                    AppError::Validation(format!(
                        "phone number {} is not in service",
                        self.phone_number_id
                    ))
                })?;

            if number.tank_id != self.tank_id {
                return Err(AppError::Validation(format!(
                    "phone number {} belongs to tank {}, not {}",
                    number.number, number.tank_id, self.tank_id
                )));
            }

            return policy::ensure_no_active_lease(tx, &number).await;
        };

        // Metadata may be rewritten; the lease itself may not move
        if let Some(stored) = tx.find::<Reservation>(id, Visibility::Live).await? {
            if stored.phone_number_id != self.phone_number_id || stored.tank_id != self.tank_id {
                return Err(AppError::Validation(format!(
                    "reservation {} cannot move to another number or tank",
                    id
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Persist for Call {
    async fn before_save<X: StoreTx>(&mut self, tx: &mut X) -> AppResult<()> {
        self.validate()?;

        let reservation = tx
            .find::<Reservation>(self.reservation_id, Visibility::IncludeDeleted)
            .await?
            .ok_or_else(|| {
                AppError::Validation(format!("reservation {} does not exist", self.reservation_id))
            })?;

        if reservation.phone_number_id != self.phone_number_id {
            return Err(AppError::Validation(format!(
                "reservation {} was not made for phone number {}",
                self.reservation_id, self.phone_number_id
            )));
        }
        Ok(())
    }
}

/// Fetch one live entity
pub async fn get_in<T: Record, X: StoreTx>(tx: &mut X, id: Id, with_related: bool) -> AppResult<T> {
    let mut entity = tx
        .find::<T>(id, Visibility::Live)
        .await?
        .ok_or_else(|| AppError::not_found(T::KIND, id))?;

    resolve(tx, &mut entity, with_related).await?;
    Ok(entity)
}

/// Filtered list
pub async fn list_in<T: Record, X: StoreTx>(
    tx: &mut X,
    query: &Query,
    with_related: bool,
) -> AppResult<Vec<T>> {
    let mut entities = tx.select::<T>(query).await?;
    for entity in &mut entities {
        resolve(tx, entity, with_related).await?;
    }
    Ok(entities)
}

/// Insert or update
pub async fn save_in<T: Record, X: StoreTx>(tx: &mut X, mut entity: T) -> AppResult<T> {
    entity.before_save(tx).await?;

    match entity.id() {
        None => tx.insert(&entity).await,
        Some(_) => tx.update(&entity).await,
    }
}

/// Soft delete; `NotFound` when no live row has that id
pub async fn delete_in<T: Record, X: StoreTx>(tx: &mut X, id: Id) -> AppResult<()> {
    if tx.soft_delete::<T>(id).await? {
        Ok(())
    } else {
        Err(AppError::not_found(T::KIND, id))
    }
}

pub(crate) async fn resolve<T: Record, X: StoreTx>(
    tx: &mut X,
    entity: &mut T,
    with_related: bool,
) -> AppResult<()> {
    entity.load_always(tx).await?;
    if with_related {
        entity.load_related(tx).await?;
    }
    Ok(())
}

/// Repository over one entity type
pub struct Repository<S: Store, T> {
    store: Arc<S>,
    _entity: PhantomData<fn() -> T>,
}

impl<S: Store, T> Clone for Repository<S, T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _entity: PhantomData,
        }
    }
}

impl<S: Store, T: Record> Repository<S, T> {
    /// Create a new repository
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            _entity: PhantomData,
        }
    }

    #[instrument(skip(self), fields(kind = T::KIND))]
    pub async fn get(&self, id: Id, with_related: bool) -> AppResult<T> {
        debug!("Getting {} {}", T::KIND, id);

        let mut tx = self.store.begin().await?;
        let entity = get_in(&mut tx, id, with_related).await?;
        tx.commit().await?;
        Ok(entity)
    }

    #[instrument(skip(self), fields(kind = T::KIND))]
    pub async fn list(&self, query: Query, with_related: bool) -> AppResult<Vec<T>> {
        debug!("Listing {}", T::TABLE);

        let mut tx = self.store.begin().await?;
        let entities = list_in(&mut tx, &query, with_related).await?;
        tx.commit().await?;
        Ok(entities)
    }

    #[instrument(skip(self, entity), fields(kind = T::KIND, id = ?entity.id()))]
    pub async fn save(&self, entity: T) -> AppResult<T> {
        let mut tx = self.store.begin().await?;
        let saved = save_in(&mut tx, entity).await?;
        tx.commit().await?;

        debug!("Saved {} {:?}", T::KIND, saved.id());
        Ok(saved)
    }

    /// Save every element in its own transaction
    ///
    /// Failures do not stop the batch; they are collected into one
    /// `AppError::Aggregate` while the other elements stay committed.
    #[instrument(skip(self, entities), fields(kind = T::KIND, count = entities.len()))]
    pub async fn save_many(&self, entities: Vec<T>) -> AppResult<Vec<T>> {
        let mut batch = BatchError::new(entities.len());
        let mut saved = Vec::with_capacity(entities.len());

        for (index, entity) in entities.into_iter().enumerate() {
            match self.save(entity).await {
                Ok(entity) => saved.push(entity),
                Err(e) => {
                    warn!("Batch entry {} failed: {}", index, e);
                    batch.push(index, e);
                }
            }
        }

        if batch.is_empty() {
            info!("Saved batch of {} {}", saved.len(), T::TABLE);
            Ok(saved)
        } else {
            Err(AppError::Aggregate(batch))
        }
    }

    #[instrument(skip(self), fields(kind = T::KIND))]
    pub async fn delete(&self, id: Id) -> AppResult<()> {
        let mut tx = self.store.begin().await?;
        delete_in::<T, _>(&mut tx, id).await?;
        tx.commit().await?;

        info!("Deleted {} {}", T::KIND, id);
        Ok(())
    }
}

impl<S: Store> Repository<S, PhoneNumber> {
    /// Live number with the given value
    #[instrument(skip(self))]
    pub async fn get_by_number(&self, number: u64) -> AppResult<PhoneNumber> {
        let mut tx = self.store.begin().await?;
        let found = live_number_in(&mut tx, number).await?;
        tx.commit().await?;
        Ok(found)
    }
}

impl<S: Store> Repository<S, ApiKey> {
    #[instrument(skip(self, key))]
    pub async fn get_by_key(&self, key: &str) -> AppResult<ApiKey> {
        let mut tx = self.store.begin().await?;
        let found = tx
            .select_one::<ApiKey>(Query::new().filter_eq("api_key", key))
            .await?;
        tx.commit().await?;

        // Never echo the key itself
        found.ok_or_else(|| AppError::NotFound("api key".to_string()))
    }

    #[instrument(skip(self))]
    pub async fn list_by_subscriber(&self, subscriber_id: Id) -> AppResult<Vec<ApiKey>> {
        self.list(Query::new().filter_eq("subscriber_id", subscriber_id), false)
            .await
    }
}

impl<S: Store> Repository<S, Tank> {
    /// Tank owning the live number with the given value
    #[instrument(skip(self))]
    pub async fn get_by_number(&self, number: u64) -> AppResult<Tank> {
        let mut tx = self.store.begin().await?;
        let pn = live_number_in(&mut tx, number).await?;
        let tank = get_in(&mut tx, pn.tank_id, false).await?;
        tx.commit().await?;
        Ok(tank)
    }
}

/// Live number by value, `NotFound` otherwise
pub async fn live_number_in<X: StoreTx>(tx: &mut X, number: u64) -> AppResult<PhoneNumber> {
    tx.select_one::<PhoneNumber>(Query::new().filter_eq("phone_number", number))
        .await?
        .ok_or_else(|| AppError::not_found(PhoneNumber::KIND, number))
}
