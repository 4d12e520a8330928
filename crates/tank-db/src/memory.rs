//! In-memory store
//!
//! Holds every table in process memory behind one async mutex. A transaction
//! owns the mutex for its whole life and works on a private copy of the
//! tables, so commit is a swap and dropping the transaction discards it.
//! Uniqueness and reference checks follow the column metadata the same way
//! the PostgreSQL schema does.

use crate::postgres::to_bigint;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tank_core::models::Id;
use tank_core::query::{Column, Order, Query, Row, Uniqueness, Value, Visibility};
use tank_core::traits::{Entity, Store, StoreTx};
use tank_core::{AppError, AppResult};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, instrument};

#[derive(Debug, Clone, Default)]
struct Tables {
    rows: HashMap<&'static str, BTreeMap<Id, Row>>,
    /// Last timestamp handed out; keeps creation order strict
    clock: Option<DateTime<Utc>>,
}

impl Tables {
    fn tick(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.clock {
            if now <= last {
                now = last + Duration::microseconds(1);
            }
        }
        self.clock = Some(now);
        now
    }

    fn table(&self, name: &str) -> Option<&BTreeMap<Id, Row>> {
        self.rows.get(name)
    }

    fn contains(&self, table: &str, id: Id) -> bool {
        self.table(table).is_some_and(|t| t.contains_key(&id))
    }

    /// Enforce range, uniqueness and reference rules for a row about to be written
    fn check<T: Entity>(&self, row: &Row) -> AppResult<()> {
        let id = row.id;
        for column in T::COLUMNS {
            let value = row.field(column.name);
            check_value(column, &value)?;

            if let (Some(table), Value::Id(target)) = (column.references, &value) {
                if !self.contains(table, *target) {
                    return Err(AppError::Validation(format!(
                        "{}.{} references missing {} {}",
                        T::TABLE,
                        column.name,
                        table,
                        target
                    )));
                }
            }

            let scope_live = match column.unique {
                Uniqueness::None => continue,
                Uniqueness::Always => false,
                Uniqueness::AmongLive => true,
            };
            if value.is_null() || (scope_live && !row.is_live()) {
                continue;
            }

            let clash = self.table(T::TABLE).is_some_and(|rows| {
                rows.values().any(|other| {
                    other.id != id
                        && (!scope_live || other.is_live())
                        && other.field(column.name) == value
                })
            });
            if clash {
                return Err(AppError::Validation(format!(
                    "duplicate {} on {}",
                    column.name,
                    T::TABLE
                )));
            }
        }
        Ok(())
    }
}

fn check_value(column: &Column, value: &Value) -> AppResult<()> {
    match value {
        Value::Null if !column.nullable => Err(AppError::Validation(format!(
            "{} must not be null",
            column.name
        ))),
        Value::UInt(v) => to_bigint(column.name, *v).map(|_| ()),
        Value::Int(v) if i32::try_from(*v).is_err() => Err(AppError::Validation(format!(
            "{} value {} out of range",
            column.name, v
        ))),
        _ => Ok(()),
    }
}

/// Total order used for sorting; NULL sorts after every value
fn compare_for_sort(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.compare(b).unwrap_or(Ordering::Equal),
    }
}

fn sort_rows(rows: &mut [Row], order: &[Order]) {
    let default_order = [
        Order {
            column: "created_at".to_string(),
            descending: false,
        },
        Order {
            column: "id".to_string(),
            descending: false,
        },
    ];
    let order = if order.is_empty() {
        &default_order[..]
    } else {
        order
    };

    rows.sort_by(|a, b| {
        order
            .iter()
            .map(|o| {
                let ord = compare_for_sort(&a.field(&o.column), &b.field(&o.column));
                if o.descending {
                    ord.reverse()
                } else {
                    ord
                }
            })
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}

/// In-process implementation of [`Store`]
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> AppResult<MemoryTx> {
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(MemoryTx { guard, work })
    }
}

/// An open in-memory transaction
pub struct MemoryTx {
    guard: OwnedMutexGuard<Tables>,
    work: Tables,
}

#[async_trait]
impl StoreTx for MemoryTx {
    #[instrument(skip(self, entity), fields(table = T::TABLE))]
    async fn insert<T: Entity>(&mut self, entity: &T) -> AppResult<T> {
        debug!("Inserting into {}", T::TABLE);

        let mut row = entity.to_row()?;
        let id = Id::new();
        let now = self.work.tick();
        row.id = Some(id);
        row.created_at = Some(now);
        row.updated_at = Some(now);
        row.deleted_at = None;

        self.work.check::<T>(&row)?;

        self.work
            .rows
            .entry(T::TABLE)
            .or_default()
            .insert(id, row.clone());

        T::from_row(row)
    }

    #[instrument(skip(self, entity), fields(table = T::TABLE))]
    async fn update<T: Entity>(&mut self, entity: &T) -> AppResult<T> {
        let id = entity
            .id()
            .ok_or_else(|| AppError::Internal(format!("update of {} without id", T::KIND)))?;
        debug!("Updating {} {}", T::TABLE, id);

        let stored = self
            .work
            .table(T::TABLE)
            .and_then(|t| t.get(&id))
            .filter(|r| r.is_live())
            .cloned()
            .ok_or_else(|| AppError::not_found(T::KIND, id))?;

        let incoming = entity.to_row()?;
        let mut row = Row::new(stored.id, stored.created_at, None, stored.deleted_at);
        for column in T::COLUMNS {
            row.set(column.name, incoming.field(column.name));
        }
        row.updated_at = Some(self.work.tick());

        self.work.check::<T>(&row)?;

        self.work
            .rows
            .entry(T::TABLE)
            .or_default()
            .insert(id, row.clone());

        T::from_row(row)
    }

    #[instrument(skip(self), fields(table = T::TABLE))]
    async fn soft_delete<T: Entity>(&mut self, id: Id) -> AppResult<bool> {
        debug!("Soft deleting {} {}", T::TABLE, id);

        let now = self.work.tick();
        let row = self
            .work
            .rows
            .get_mut(T::TABLE)
            .and_then(|t| t.get_mut(&id))
            .filter(|r| r.is_live());

        match row {
            Some(row) => {
                row.deleted_at = Some(now);
                row.updated_at = Some(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    #[instrument(skip(self), fields(table = T::TABLE))]
    async fn select<T: Entity>(&mut self, query: &Query) -> AppResult<Vec<T>> {
        query.validate_columns(T::TABLE, T::COLUMNS)?;

        let mut rows: Vec<Row> = self
            .work
            .table(T::TABLE)
            .map(|t| {
                t.values()
                    .filter(|r| query.visibility == Visibility::IncludeDeleted || r.is_live())
                    .filter(|r| query.conditions.iter().all(|c| c.matches(r)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        sort_rows(&mut rows, &query.order);

        let offset = query.offset.unwrap_or(0).max(0) as usize;
        let limit = query.limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);

        debug!("Selected {} rows from {}", rows.len(), T::TABLE);
        rows.into_iter()
            .skip(offset)
            .take(limit)
            .map(T::from_row)
            .collect()
    }

    async fn lock<T: Entity>(&mut self, id: Id) -> AppResult<bool> {
        // The whole store is already exclusive to this transaction
        Ok(self.work.contains(T::TABLE, id))
    }

    async fn commit(mut self) -> AppResult<()> {
        *self.guard = self.work;
        Ok(())
    }

    async fn rollback(self) -> AppResult<()> {
        Ok(())
    }
}
