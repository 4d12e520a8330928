//! Tank model
//!
//! A tank is a named pool of leasable numbers owned by one subscriber.

use super::{Id, PhoneNumber, Subscriber};
use crate::query::{Column, ColumnType, Row, Uniqueness};
use crate::traits::Entity;
use crate::AppResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Named pool of numbers
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct Tank {
    pub id: Option<Id>,

    /// Unique tank name
    #[validate(length(min = 1, message = "tank name is required"))]
    pub name: String,

    pub subscriber_id: Id,

    /// Lease duration in seconds applied when a reservation names none
    #[serde(rename = "default_ttl")]
    #[validate(range(min = 0))]
    pub default_ttl: i32,

    /// Number calls fall through to when no reservation matches
    pub default_number: u64,

    pub enabled: bool,

    /// Maximum number of live numbers; 0 means unbounded
    #[validate(range(min = 0))]
    pub max_tank_size: i32,

    /// Used instead when the pool cannot handle a dialed number
    pub fallback_url: String,

    /// Live numbers, loaded with related data
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phone_numbers: Vec<PhoneNumber>,

    /// Owning subscriber, always loaded on tank reads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscriber: Option<Box<Subscriber>>,

    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Tank {
    pub fn new(name: impl Into<String>, subscriber_id: Id) -> Self {
        Self {
            name: name.into(),
            subscriber_id,
            enabled: true,
            ..Default::default()
        }
    }

    /// True when the tank caps its pool size
    pub fn is_bounded(&self) -> bool {
        self.max_tank_size > 0
    }

    /// Whether one more live number fits next to `live_numbers` existing ones
    pub fn has_capacity_for(&self, live_numbers: usize) -> bool {
        !self.is_bounded() || live_numbers < self.max_tank_size as usize
    }

    /// Fallback number, if the tank configured one
    pub fn fallback_number(&self) -> Option<u64> {
        (self.default_number != 0).then_some(self.default_number)
    }

    /// Fallback URL, if the tank configured one
    pub fn fallback_url(&self) -> Option<&str> {
        (!self.fallback_url.is_empty()).then_some(self.fallback_url.as_str())
    }
}

impl Entity for Tank {
    const TABLE: &'static str = "tanks";
    const KIND: &'static str = "tank";
    const COLUMNS: &'static [Column] = &[
        Column::new("name", ColumnType::Text).unique(Uniqueness::Always),
        Column::new("subscriber_id", ColumnType::Id).references("subscribers"),
        Column::new("default_ttl", ColumnType::Int),
        Column::new("default_number", ColumnType::UInt),
        Column::new("enabled", ColumnType::Bool),
        Column::new("max_tank_size", ColumnType::Int),
        Column::new("fallback_url", ColumnType::Text),
    ];

    fn id(&self) -> Option<Id> {
        self.id
    }

    fn to_row(&self) -> AppResult<Row> {
        Ok(
            Row::new(self.id, self.created_at, self.updated_at, self.deleted_at)
                .with("name", self.name.as_str())
                .with("subscriber_id", self.subscriber_id)
                .with("default_ttl", self.default_ttl)
                .with("default_number", self.default_number)
                .with("enabled", self.enabled)
                .with("max_tank_size", self.max_tank_size)
                .with("fallback_url", self.fallback_url.as_str()),
        )
    }

    fn from_row(row: Row) -> AppResult<Self> {
        Ok(Self {
            name: row.text_at("name")?,
            subscriber_id: row.id_at("subscriber_id")?,
            default_ttl: row.i32_at("default_ttl")?,
            default_number: row.u64_at("default_number")?,
            enabled: row.bool_at("enabled")?,
            max_tank_size: row.i32_at("max_tank_size")?,
            fallback_url: row.text_at("fallback_url")?,
            phone_numbers: Vec::new(),
            subscriber: None,
            id: row.id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}
