//! PostgreSQL store
//!
//! One generic SQL builder serves every entity: column lists come from
//! [`Entity::COLUMNS`], values are bound by their declared [`ColumnType`] so
//! NULLs are always typed, and query columns are whitelisted before any SQL
//! is assembled.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row as _, Transaction};
use tank_core::models::Id;
use tank_core::query::{Column, ColumnType, Condition, Query, Row, Value, Visibility};
use tank_core::traits::{Entity, Store, StoreTx};
use tank_core::{AppError, AppResult};
use tracing::{debug, error, instrument};
use uuid::Uuid;

/// PostgreSQL implementation of [`Store`]
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new store over an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> AppResult<PgTx> {
        let tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            AppError::Transaction(format!("Failed to begin transaction: {}", e))
        })?;

        Ok(PgTx { tx })
    }
}

/// An open PostgreSQL transaction
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

/// Convert a domain number to its BIGINT column form
pub(crate) fn to_bigint(column: &str, v: u64) -> AppResult<i64> {
    i64::try_from(v).map_err(|_| {
        AppError::Validation(format!("{} value {} exceeds the storable range", column, v))
    })
}

/// Classify a driver error: constraint violations are caller mistakes
fn classify(op: &str, table: &str, err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return AppError::Validation(format!(
                "duplicate value on {}: {}",
                table,
                db.constraint().unwrap_or(db.message())
            ));
        }
        if db.is_foreign_key_violation() {
            return AppError::Validation(format!(
                "referenced row does not exist for {}: {}",
                table,
                db.constraint().unwrap_or(db.message())
            ));
        }
        if db.is_check_violation() {
            return AppError::Validation(format!(
                "constraint violated on {}: {}",
                table,
                db.constraint().unwrap_or(db.message())
            ));
        }
    }

    error!("Database error during {} on {}: {}", op, table, err);
    AppError::Database(format!("Failed to {} {}: {}", op, table, err))
}

/// Bind a value for a column of declared type
fn push_typed(
    qb: &mut QueryBuilder<'_, Postgres>,
    column: &Column,
    value: &Value,
) -> AppResult<()> {
    match (column.ty, value) {
        (ColumnType::Id, Value::Id(v)) => {
            qb.push_bind(v.as_uuid());
        }
        (ColumnType::Id, Value::Null) => {
            qb.push_bind(None::<Uuid>);
        }
        (ColumnType::Int, Value::Int(v)) => {
            let v = i32::try_from(*v).map_err(|_| {
                AppError::Validation(format!("{} value {} out of range", column.name, v))
            })?;
            qb.push_bind(v);
        }
        (ColumnType::Int, Value::Null) => {
            qb.push_bind(None::<i32>);
        }
        (ColumnType::UInt, Value::UInt(v)) => {
            qb.push_bind(to_bigint(column.name, *v)?);
        }
        (ColumnType::UInt, Value::Null) => {
            qb.push_bind(None::<i64>);
        }
        (ColumnType::Bool, Value::Bool(v)) => {
            qb.push_bind(*v);
        }
        (ColumnType::Bool, Value::Null) => {
            qb.push_bind(None::<bool>);
        }
        (ColumnType::Text, Value::Text(v)) => {
            qb.push_bind(v.clone());
        }
        (ColumnType::Text, Value::Null) => {
            qb.push_bind(None::<String>);
        }
        (ColumnType::Bytes, Value::Bytes(v)) => {
            qb.push_bind(v.clone());
        }
        (ColumnType::Bytes, Value::Null) => {
            qb.push_bind(None::<Vec<u8>>);
        }
        (ColumnType::Timestamp, Value::Timestamp(v)) => {
            qb.push_bind(*v);
        }
        (ColumnType::Timestamp, Value::Null) => {
            qb.push_bind(None::<DateTime<Utc>>);
        }
        (ty, other) => {
            return Err(AppError::Internal(format!(
                "column {} of type {:?} cannot hold {:?}",
                column.name, ty, other
            )))
        }
    }
    Ok(())
}

/// Bind a query operand by its own kind
fn push_operand(qb: &mut QueryBuilder<'_, Postgres>, column: &str, value: &Value) -> AppResult<()> {
    match value {
        Value::Id(v) => {
            qb.push_bind(v.as_uuid());
        }
        Value::Int(v) => {
            qb.push_bind(*v);
        }
        Value::UInt(v) => {
            qb.push_bind(to_bigint(column, *v)?);
        }
        Value::Bool(v) => {
            qb.push_bind(*v);
        }
        Value::Text(v) => {
            qb.push_bind(v.clone());
        }
        Value::Bytes(v) => {
            qb.push_bind(v.clone());
        }
        Value::Timestamp(v) => {
            qb.push_bind(*v);
        }
        Value::Null => {
            qb.push("NULL");
        }
    }
    Ok(())
}

fn push_condition(qb: &mut QueryBuilder<'_, Postgres>, condition: &Condition) -> AppResult<()> {
    let (column, op, value) = match condition {
        Condition::Eq(c, v) => (c, "=", v),
        Condition::Gt(c, v) => (c, ">", v),
        Condition::Lt(c, v) => (c, "<", v),
    };

    qb.push(" AND ");
    match (op, value) {
        ("=", Value::Null) => {
            qb.push(column.as_str()).push(" IS NULL");
        }
        // Ordering against NULL never matches
        (_, Value::Null) => {
            qb.push("FALSE");
        }
        _ => {
            qb.push(column.as_str()).push(" ").push(op).push(" ");
            push_operand(qb, column, value)?;
        }
    }
    Ok(())
}

/// Rebuild a storage row from a driver row
fn decode<T: Entity>(pg: &PgRow) -> AppResult<T> {
    let get_err = |column: &str, e: sqlx::Error| {
        error!("Failed to decode {}.{}: {}", T::TABLE, column, e);
        AppError::Database(format!("Failed to decode {}.{}: {}", T::TABLE, column, e))
    };

    let id: Uuid = pg.try_get("id").map_err(|e| get_err("id", e))?;
    let created_at: DateTime<Utc> = pg
        .try_get("created_at")
        .map_err(|e| get_err("created_at", e))?;
    let updated_at: DateTime<Utc> = pg
        .try_get("updated_at")
        .map_err(|e| get_err("updated_at", e))?;
    let deleted_at: Option<DateTime<Utc>> = pg
        .try_get("deleted_at")
        .map_err(|e| get_err("deleted_at", e))?;

    let mut row = Row::new(
        Some(Id::from(id)),
        Some(created_at),
        Some(updated_at),
        deleted_at,
    );

    for column in T::COLUMNS {
        let name = column.name;
        let value = match column.ty {
            ColumnType::Id => pg
                .try_get::<Option<Uuid>, _>(name)
                .map_err(|e| get_err(name, e))?
                .map(|u| Value::Id(Id::from(u))),
            ColumnType::Int => pg
                .try_get::<Option<i32>, _>(name)
                .map_err(|e| get_err(name, e))?
                .map(Value::from),
            ColumnType::UInt => match pg
                .try_get::<Option<i64>, _>(name)
                .map_err(|e| get_err(name, e))?
            {
                Some(v) => Some(Value::UInt(u64::try_from(v).map_err(|_| {
                    AppError::Database(format!("negative value in {}.{}", T::TABLE, name))
                })?)),
                None => None,
            },
            ColumnType::Bool => pg
                .try_get::<Option<bool>, _>(name)
                .map_err(|e| get_err(name, e))?
                .map(Value::Bool),
            ColumnType::Text => pg
                .try_get::<Option<String>, _>(name)
                .map_err(|e| get_err(name, e))?
                .map(Value::Text),
            ColumnType::Bytes => pg
                .try_get::<Option<Vec<u8>>, _>(name)
                .map_err(|e| get_err(name, e))?
                .map(Value::Bytes),
            ColumnType::Timestamp => pg
                .try_get::<Option<DateTime<Utc>>, _>(name)
                .map_err(|e| get_err(name, e))?
                .map(Value::Timestamp),
        };
        row.set(name, value.unwrap_or(Value::Null));
    }

    T::from_row(row)
}

#[async_trait]
impl StoreTx for PgTx {
    #[instrument(skip(self, entity), fields(table = T::TABLE))]
    async fn insert<T: Entity>(&mut self, entity: &T) -> AppResult<T> {
        debug!("Inserting into {}", T::TABLE);

        let row = entity.to_row()?;
        let id = Id::new();

        let mut qb = QueryBuilder::<Postgres>::new("INSERT INTO ");
        qb.push(T::TABLE).push(" (id");
        for column in T::COLUMNS {
            qb.push(", ").push(column.name);
        }
        qb.push(") VALUES (");
        qb.push_bind(id.as_uuid());
        for column in T::COLUMNS {
            qb.push(", ");
            push_typed(&mut qb, column, &row.field(column.name))?;
        }
        qb.push(") RETURNING *");

        let pg = qb
            .build()
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| classify("insert into", T::TABLE, e))?;

        decode::<T>(&pg)
    }

    #[instrument(skip(self, entity), fields(table = T::TABLE))]
    async fn update<T: Entity>(&mut self, entity: &T) -> AppResult<T> {
        let id = entity
            .id()
            .ok_or_else(|| AppError::Internal(format!("update of {} without id", T::KIND)))?;
        debug!("Updating {} {}", T::TABLE, id);

        let row = entity.to_row()?;

        let mut qb = QueryBuilder::<Postgres>::new("UPDATE ");
        qb.push(T::TABLE).push(" SET ");
        for column in T::COLUMNS {
            qb.push(column.name).push(" = ");
            push_typed(&mut qb, column, &row.field(column.name))?;
            qb.push(", ");
        }
        qb.push("updated_at = clock_timestamp() WHERE id = ");
        qb.push_bind(id.as_uuid());
        qb.push(" AND deleted_at IS NULL RETURNING *");

        let pg = qb
            .build()
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| classify("update", T::TABLE, e))?
            .ok_or_else(|| AppError::not_found(T::KIND, id))?;

        decode::<T>(&pg)
    }

    #[instrument(skip(self), fields(table = T::TABLE))]
    async fn soft_delete<T: Entity>(&mut self, id: Id) -> AppResult<bool> {
        debug!("Soft deleting {} {}", T::TABLE, id);

        let mut qb = QueryBuilder::<Postgres>::new("UPDATE ");
        qb.push(T::TABLE)
            .push(" SET deleted_at = clock_timestamp(), updated_at = clock_timestamp() WHERE id = ");
        qb.push_bind(id.as_uuid());
        qb.push(" AND deleted_at IS NULL");

        let result = qb
            .build()
            .execute(&mut *self.tx)
            .await
            .map_err(|e| classify("delete from", T::TABLE, e))?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(table = T::TABLE))]
    async fn select<T: Entity>(&mut self, query: &Query) -> AppResult<Vec<T>> {
        query.validate_columns(T::TABLE, T::COLUMNS)?;

        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM ");
        qb.push(T::TABLE).push(" WHERE TRUE");
        if query.visibility == Visibility::Live {
            qb.push(" AND deleted_at IS NULL");
        }
        for condition in &query.conditions {
            push_condition(&mut qb, condition)?;
        }

        qb.push(" ORDER BY ");
        if query.order.is_empty() {
            qb.push("created_at ASC, id ASC");
        } else {
            for (i, order) in query.order.iter().enumerate() {
                if i > 0 {
                    qb.push(", ");
                }
                qb.push(order.column.as_str())
                    .push(if order.descending { " DESC" } else { " ASC" });
            }
        }

        if let Some(limit) = query.limit {
            qb.push(" LIMIT ").push_bind(limit);
        }
        if let Some(offset) = query.offset {
            qb.push(" OFFSET ").push_bind(offset);
        }

        let rows = qb
            .build()
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| classify("select from", T::TABLE, e))?;

        debug!("Selected {} rows from {}", rows.len(), T::TABLE);
        rows.iter().map(decode::<T>).collect()
    }

    #[instrument(skip(self), fields(table = T::TABLE))]
    async fn lock<T: Entity>(&mut self, id: Id) -> AppResult<bool> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT id FROM ");
        qb.push(T::TABLE).push(" WHERE id = ");
        qb.push_bind(id.as_uuid());
        qb.push(" FOR UPDATE");

        let locked = qb
            .build()
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| classify("lock", T::TABLE, e))?;

        Ok(locked.is_some())
    }

    async fn commit(self) -> AppResult<()> {
        self.tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit: {}", e))
        })
    }

    async fn rollback(self) -> AppResult<()> {
        self.tx.rollback().await.map_err(|e| {
            error!("Failed to roll back transaction: {}", e);
            AppError::Transaction(format!("Failed to roll back: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bigint_range() {
        assert_eq!(to_bigint("phone_number", 5551234567).unwrap(), 5551234567);
        assert!(matches!(
            to_bigint("phone_number", u64::MAX),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_condition_sql() {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM t WHERE TRUE");
        push_condition(&mut qb, &Condition::Eq("deleted_at".into(), Value::Null)).unwrap();
        push_condition(&mut qb, &Condition::Gt("phone_number".into(), Value::UInt(5))).unwrap();
        push_condition(&mut qb, &Condition::Lt("last_call".into(), Value::Null)).unwrap();

        assert_eq!(
            qb.sql(),
            "SELECT * FROM t WHERE TRUE AND deleted_at IS NULL AND phone_number > $1 AND FALSE"
        );
    }

    #[test]
    fn test_mismatched_value_rejected() {
        let mut qb = QueryBuilder::<Postgres>::new("");
        let column = Column::new("enabled", ColumnType::Bool);
        let err = push_typed(&mut qb, &column, &Value::Text("yes".into())).unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
