//! Query, row and value types shared by every storage backend
//!
//! Entities are flattened into a [`Row`] of typed [`Value`]s at the storage
//! boundary. Backends only ever see rows and [`Query`] descriptions; the
//! domain structs never leave `tank-core`.

use crate::error::AppError;
use crate::models::Id;
use crate::AppResult;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Columns every table carries in addition to its entity columns
pub const BASE_COLUMNS: [&str; 4] = ["id", "created_at", "updated_at", "deleted_at"];

/// Storage type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Id,
    Int,
    /// Unsigned 64-bit in the domain, BIGINT in Postgres
    UInt,
    Bool,
    Text,
    Bytes,
    Timestamp,
}

/// Uniqueness constraint on a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Uniqueness {
    None,
    /// Unique across every row, deleted or not
    Always,
    /// Unique among rows that are not soft-deleted
    AmongLive,
}

/// Schema description of a single entity column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
    pub unique: Uniqueness,
    /// Table whose `id` this column must reference
    pub references: Option<&'static str>,
}

impl Column {
    pub const fn new(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            nullable: false,
            unique: Uniqueness::None,
            references: None,
        }
    }

    pub const fn nullable(self) -> Self {
        Self {
            nullable: true,
            ..self
        }
    }

    pub const fn unique(self, unique: Uniqueness) -> Self {
        Self { unique, ..self }
    }

    pub const fn references(self, table: &'static str) -> Self {
        Self {
            references: Some(table),
            ..self
        }
    }
}

/// A single column value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Id(Id),
    Int(i64),
    UInt(u64),
    Bool(bool),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Ordering between two values of the same kind; `None` across kinds
    ///
    /// Signed and unsigned integers compare by numeric value, so a literal
    /// `5` filters a `u64` column the way it does in SQL.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Id(a), Value::Id(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::UInt(a), Value::UInt(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::UInt(b)) => Some(i128::from(*a).cmp(&i128::from(*b))),
            (Value::UInt(a), Value::Int(b)) => Some(i128::from(*a).cmp(&i128::from(*b))),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl From<Id> for Value {
    fn from(v: Id) -> Self {
        Value::Id(v)
    }
}

impl From<Option<Id>> for Value {
    fn from(v: Option<Id>) -> Self {
        v.map(Value::Id).unwrap_or(Value::Null)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl From<Option<DateTime<Utc>>> for Value {
    fn from(v: Option<DateTime<Utc>>) -> Self {
        v.map(Value::Timestamp).unwrap_or(Value::Null)
    }
}

/// Flattened storage form of an entity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub id: Option<Id>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    values: BTreeMap<&'static str, Value>,
}

impl Row {
    pub fn new(
        id: Option<Id>,
        created_at: Option<DateTime<Utc>>,
        updated_at: Option<DateTime<Utc>>,
        deleted_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            created_at,
            updated_at,
            deleted_at,
            values: BTreeMap::new(),
        }
    }

    /// Builder-style setter
    pub fn with(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.values.insert(column, value.into());
        self
    }

    pub fn set(&mut self, column: &'static str, value: impl Into<Value>) {
        self.values.insert(column, value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    pub fn values(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.values.iter().map(|(k, v)| (*k, v))
    }

    /// Value of any column, base columns included; absent columns read as `Null`
    pub fn field(&self, column: &str) -> Value {
        match column {
            "id" => self.id.into(),
            "created_at" => self.created_at.into(),
            "updated_at" => self.updated_at.into(),
            "deleted_at" => self.deleted_at.into(),
            other => self.values.get(other).cloned().unwrap_or(Value::Null),
        }
    }

    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }

    fn require(&self, column: &str) -> AppResult<&Value> {
        self.values
            .get(column)
            .ok_or_else(|| AppError::Internal(format!("column {} missing from row", column)))
    }

    fn mismatch(column: &str, expected: &str, got: &Value) -> AppError {
        AppError::Internal(format!(
            "column {} expected {}, got {:?}",
            column, expected, got
        ))
    }

    pub fn id_at(&self, column: &str) -> AppResult<Id> {
        match self.require(column)? {
            Value::Id(v) => Ok(*v),
            other => Err(Self::mismatch(column, "id", other)),
        }
    }

    pub fn opt_id_at(&self, column: &str) -> AppResult<Option<Id>> {
        match self.require(column)? {
            Value::Id(v) => Ok(Some(*v)),
            Value::Null => Ok(None),
            other => Err(Self::mismatch(column, "id", other)),
        }
    }

    pub fn i32_at(&self, column: &str) -> AppResult<i32> {
        match self.require(column)? {
            Value::Int(v) => i32::try_from(*v)
                .map_err(|_| AppError::Internal(format!("column {} out of i32 range", column))),
            other => Err(Self::mismatch(column, "int", other)),
        }
    }

    pub fn u64_at(&self, column: &str) -> AppResult<u64> {
        match self.require(column)? {
            Value::UInt(v) => Ok(*v),
            other => Err(Self::mismatch(column, "uint", other)),
        }
    }

    pub fn bool_at(&self, column: &str) -> AppResult<bool> {
        match self.require(column)? {
            Value::Bool(v) => Ok(*v),
            other => Err(Self::mismatch(column, "bool", other)),
        }
    }

    pub fn text_at(&self, column: &str) -> AppResult<String> {
        match self.require(column)? {
            Value::Text(v) => Ok(v.clone()),
            other => Err(Self::mismatch(column, "text", other)),
        }
    }

    pub fn bytes_at(&self, column: &str) -> AppResult<Vec<u8>> {
        match self.require(column)? {
            Value::Bytes(v) => Ok(v.clone()),
            Value::Null => Ok(Vec::new()),
            other => Err(Self::mismatch(column, "bytes", other)),
        }
    }

    pub fn timestamp_at(&self, column: &str) -> AppResult<DateTime<Utc>> {
        match self.require(column)? {
            Value::Timestamp(v) => Ok(*v),
            other => Err(Self::mismatch(column, "timestamp", other)),
        }
    }

    pub fn opt_timestamp_at(&self, column: &str) -> AppResult<Option<DateTime<Utc>>> {
        match self.require(column)? {
            Value::Timestamp(v) => Ok(Some(*v)),
            Value::Null => Ok(None),
            other => Err(Self::mismatch(column, "timestamp", other)),
        }
    }
}

/// Which rows a read may see
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    /// Soft-deleted rows are excluded
    #[default]
    Live,
    /// Soft-deleted rows are returned as well
    IncludeDeleted,
}

/// A single filter condition
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(String, Value),
    Gt(String, Value),
    Lt(String, Value),
}

impl Condition {
    pub fn column(&self) -> &str {
        match self {
            Condition::Eq(c, _) | Condition::Gt(c, _) | Condition::Lt(c, _) => c,
        }
    }

    /// Evaluate the condition against a row
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Condition::Eq(c, v) => {
                let field = row.field(c);
                field == *v || field.compare(v) == Some(Ordering::Equal)
            }
            Condition::Gt(c, v) => row.field(c).compare(v) == Some(Ordering::Greater),
            Condition::Lt(c, v) => row.field(c).compare(v) == Some(Ordering::Less),
        }
    }
}

/// Sort key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub descending: bool,
}

/// Filtered, sorted read description
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub conditions: Vec<Condition>,
    pub order: Vec<Order>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub visibility: Visibility,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_id(id: Id) -> Self {
        Self::new().filter_eq("id", id)
    }

    pub fn filter_eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::Eq(column.to_string(), value.into()));
        self
    }

    pub fn filter_gt(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::Gt(column.to_string(), value.into()));
        self
    }

    pub fn filter_lt(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::Lt(column.to_string(), value.into()));
        self
    }

    pub fn order_by_asc(mut self, column: &str) -> Self {
        self.order.push(Order {
            column: column.to_string(),
            descending: false,
        });
        self
    }

    pub fn order_by_desc(mut self, column: &str) -> Self {
        self.order.push(Order {
            column: column.to_string(),
            descending: true,
        });
        self
    }

    /// Newest first, with the time-ordered id as tiebreaker
    pub fn most_recent_first(self) -> Self {
        self.order_by_desc("created_at").order_by_desc("id")
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn include_deleted(self) -> Self {
        self.visibility(Visibility::IncludeDeleted)
    }

    /// Reject any condition or sort key naming a column the table lacks
    pub fn validate_columns(&self, table: &str, columns: &[Column]) -> AppResult<()> {
        let known = |name: &str| {
            BASE_COLUMNS.contains(&name) || columns.iter().any(|c| c.name == name)
        };

        let referenced = self
            .conditions
            .iter()
            .map(Condition::column)
            .chain(self.order.iter().map(|o| o.column.as_str()));

        for name in referenced {
            if !known(name) {
                return Err(AppError::Validation(format!(
                    "unknown column {} on {}",
                    name, table
                )));
            }
        }

        if self.limit.is_some_and(|l| l < 0) || self.offset.is_some_and(|o| o < 0) {
            return Err(AppError::Validation(
                "limit and offset must not be negative".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLUMNS: &[Column] = &[
        Column::new("name", ColumnType::Text).unique(Uniqueness::Always),
        Column::new("tank_id", ColumnType::Id).references("tanks"),
    ];

    #[test]
    fn test_column_builders() {
        let c = Column::new("overflow_provider_id", ColumnType::Id)
            .nullable()
            .references("overflow_providers");
        assert!(c.nullable);
        assert_eq!(c.references, Some("overflow_providers"));
        assert_eq!(c.unique, Uniqueness::None);
    }

    #[test]
    fn test_validate_columns() {
        let ok = Query::new()
            .filter_eq("name", "north")
            .filter_lt("created_at", Utc::now())
            .most_recent_first();
        assert!(ok.validate_columns("tanks", COLUMNS).is_ok());

        let bad = Query::new().filter_eq("name; DROP TABLE tanks", "x");
        assert!(matches!(
            bad.validate_columns("tanks", COLUMNS),
            Err(AppError::Validation(_))
        ));

        let negative = Query::new().limit(-1);
        assert!(negative.validate_columns("tanks", COLUMNS).is_err());
    }

    #[test]
    fn test_condition_matches() {
        let now = Utc::now();
        let row = Row::new(Some(Id::new()), Some(now), Some(now), None)
            .with("name", "north")
            .with("phone_number", 5551230000u64);

        assert!(Condition::Eq("name".into(), "north".into()).matches(&row));
        assert!(!Condition::Eq("name".into(), "south".into()).matches(&row));
        assert!(Condition::Gt("phone_number".into(), Value::UInt(5551229999)).matches(&row));
        assert!(Condition::Eq("deleted_at".into(), Value::Null).matches(&row));
        // Integers compare across signedness, other kinds never do
        assert!(Condition::Eq("phone_number".into(), 5551230000i64.into()).matches(&row));
        assert!(Condition::Gt("phone_number".into(), Value::Int(-1)).matches(&row));
        assert!(!Condition::Lt("phone_number".into(), Value::Int(1)).matches(&row));
        assert!(!Condition::Eq("phone_number".into(), "5551230000".into()).matches(&row));
    }

    #[test]
    fn test_row_accessors() {
        let row = Row::default()
            .with("enabled", true)
            .with("max_tank_size", 2)
            .with("last_call", Value::Null);

        assert!(row.bool_at("enabled").unwrap());
        assert_eq!(row.i32_at("max_tank_size").unwrap(), 2);
        assert_eq!(row.opt_timestamp_at("last_call").unwrap(), None);
        assert!(row.text_at("enabled").is_err());
        assert!(row.text_at("missing").is_err());
    }
}
