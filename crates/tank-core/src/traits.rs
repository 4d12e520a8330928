//! Storage traits
//!
//! A backend exposes exactly three things: a transactional scope
//! ([`Store::begin`]), filtered/sorted reads ([`StoreTx::select`]) and
//! create/update/soft-delete primitives per entity. Everything with domain
//! meaning (association rules, lookups, leasing) lives above these traits.

use crate::models::Id;
use crate::query::{Column, Query, Row, Visibility};
use crate::AppResult;
use async_trait::async_trait;

/// A persistable domain entity
pub trait Entity: Clone + Send + Sync + Sized + 'static {
    /// Backing table name
    const TABLE: &'static str;

    /// Human readable entity kind used in error messages
    const KIND: &'static str;

    /// Entity columns, excluding the base columns every table carries
    const COLUMNS: &'static [Column];

    /// Identity, `None` until the entity has been inserted
    fn id(&self) -> Option<Id>;

    /// Flatten into storage form
    fn to_row(&self) -> AppResult<Row>;

    /// Rebuild from storage form; related data is left empty
    fn from_row(row: Row) -> AppResult<Self>;
}

/// Source of transactions
#[async_trait]
pub trait Store: Send + Sync + 'static {
    type Tx: StoreTx;

    /// Open a new transactional scope
    async fn begin(&self) -> AppResult<Self::Tx>;
}

/// A single transactional scope
///
/// Dropping a transaction without calling [`StoreTx::commit`] discards every
/// write made through it.
#[async_trait]
pub trait StoreTx: Send + Sized {
    /// Insert a new row; identity and timestamps are assigned by the store
    async fn insert<T: Entity>(&mut self, entity: &T) -> AppResult<T>;

    /// Update a live row in place; identity, `created_at` and `deleted_at`
    /// are never taken from the caller
    async fn update<T: Entity>(&mut self, entity: &T) -> AppResult<T>;

    /// Mark a live row deleted; `false` when no live row had that id
    async fn soft_delete<T: Entity>(&mut self, id: Id) -> AppResult<bool>;

    /// Filtered, sorted read
    async fn select<T: Entity>(&mut self, query: &Query) -> AppResult<Vec<T>>;

    /// Take an exclusive row lock held until the transaction ends; `false`
    /// when no row (live or deleted) has that id
    async fn lock<T: Entity>(&mut self, id: Id) -> AppResult<bool>;

    async fn commit(self) -> AppResult<()>;

    async fn rollback(self) -> AppResult<()>;

    /// First row matching the query
    async fn select_one<T: Entity>(&mut self, query: Query) -> AppResult<Option<T>> {
        let query = query.limit(1);
        Ok(self.select::<T>(&query).await?.into_iter().next())
    }

    /// Row by id under the given visibility
    async fn find<T: Entity>(&mut self, id: Id, visibility: Visibility) -> AppResult<Option<T>> {
        self.select_one::<T>(Query::by_id(id).visibility(visibility))
            .await
    }
}
