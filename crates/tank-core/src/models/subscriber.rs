//! Subscriber and API key models

use super::{Id, Tank};
use crate::query::{Column, ColumnType, Row, Uniqueness};
use crate::traits::Entity;
use crate::AppResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// A tenant of the number pool
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct Subscriber {
    pub id: Option<Id>,

    #[validate(length(min = 3, message = "subscriber name must be at least 3 characters"))]
    pub name: String,

    /// Unique contact address
    #[validate(email, length(min = 5))]
    pub email: String,

    /// Overflow configuration used when this subscriber's tanks run dry
    pub overflow_provider_id: Option<Id>,

    /// API keys, loaded with related data
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<ApiKey>,

    /// Tanks, loaded with related data
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tanks: Vec<Tank>,

    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Subscriber {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            ..Default::default()
        }
    }
}

impl Entity for Subscriber {
    const TABLE: &'static str = "subscribers";
    const KIND: &'static str = "subscriber";
    const COLUMNS: &'static [Column] = &[
        Column::new("name", ColumnType::Text),
        Column::new("email", ColumnType::Text).unique(Uniqueness::Always),
        Column::new("overflow_provider_id", ColumnType::Id)
            .nullable()
            .references("overflow_providers"),
    ];

    fn id(&self) -> Option<Id> {
        self.id
    }

    fn to_row(&self) -> AppResult<Row> {
        Ok(
            Row::new(self.id, self.created_at, self.updated_at, self.deleted_at)
                .with("name", self.name.as_str())
                .with("email", self.email.as_str())
                .with("overflow_provider_id", self.overflow_provider_id),
        )
    }

    fn from_row(row: Row) -> AppResult<Self> {
        Ok(Self {
            name: row.text_at("name")?,
            email: row.text_at("email")?,
            overflow_provider_id: row.opt_id_at("overflow_provider_id")?,
            keys: Vec::new(),
            tanks: Vec::new(),
            id: row.id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

/// Subscriber authentication credential
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ApiKey {
    pub id: Option<Id>,
    pub subscriber_id: Id,

    /// Opaque key; left empty on save to have one issued
    #[serde(rename = "api_key")]
    pub key: String,

    /// Grants access to admin functionality
    pub admin: bool,

    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ApiKey {
    /// Key for a subscriber; the key string is issued on save
    pub fn for_subscriber(subscriber_id: Id) -> Self {
        Self {
            subscriber_id,
            ..Default::default()
        }
    }
}

impl Entity for ApiKey {
    const TABLE: &'static str = "api_keys";
    const KIND: &'static str = "api key";
    const COLUMNS: &'static [Column] = &[
        Column::new("subscriber_id", ColumnType::Id).references("subscribers"),
        Column::new("api_key", ColumnType::Text).unique(Uniqueness::Always),
        Column::new("admin", ColumnType::Bool),
    ];

    fn id(&self) -> Option<Id> {
        self.id
    }

    fn to_row(&self) -> AppResult<Row> {
        Ok(
            Row::new(self.id, self.created_at, self.updated_at, self.deleted_at)
                .with("subscriber_id", self.subscriber_id)
                .with("api_key", self.key.as_str())
                .with("admin", self.admin),
        )
    }

    fn from_row(row: Row) -> AppResult<Self> {
        Ok(Self {
            subscriber_id: row.id_at("subscriber_id")?,
            key: row.text_at("api_key")?,
            admin: row.bool_at("admin")?,
            id: row.id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}
