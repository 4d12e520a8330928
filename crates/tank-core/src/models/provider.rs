//! Provider and overflow provider models
//!
//! A provider is an upstream telephony carrier the pool buys numbers from.

use super::{Id, PhoneNumber};
use crate::query::{Column, ColumnType, Row, Uniqueness};
use crate::traits::Entity;
use crate::AppResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Upstream number supplier
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct Provider {
    pub id: Option<Id>,

    /// Provider name, at least three characters
    #[validate(length(min = 3, message = "provider name must be at least 3 characters"))]
    pub name: String,

    /// Fallback configuration, loaded with related data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overflow_provider: Option<OverflowProvider>,

    /// Live numbers bought from this provider, loaded with related data
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phone_numbers: Vec<PhoneNumber>,

    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Provider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

impl Entity for Provider {
    const TABLE: &'static str = "providers";
    const KIND: &'static str = "provider";
    const COLUMNS: &'static [Column] = &[Column::new("name", ColumnType::Text)];

    fn id(&self) -> Option<Id> {
        self.id
    }

    fn to_row(&self) -> AppResult<Row> {
        Ok(
            Row::new(self.id, self.created_at, self.updated_at, self.deleted_at)
                .with("name", self.name.as_str()),
        )
    }

    fn from_row(row: Row) -> AppResult<Self> {
        Ok(Self {
            name: row.text_at("name")?,
            overflow_provider: None,
            phone_numbers: Vec::new(),
            id: row.id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

/// Fallback supplier configuration for a provider
///
/// Subscribers point at one of these to get automatic overflow when their
/// tanks run dry. A provider has at most one live overflow configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct OverflowProvider {
    pub id: Option<Id>,
    pub provider_id: Id,
    pub name: String,

    /// Identifier of the fallback number source at the carrier
    pub fallback_id: String,

    /// How many numbers to request per overflow event
    #[validate(range(min = 0))]
    pub increment: i32,

    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl OverflowProvider {
    pub fn new(provider_id: Id, name: impl Into<String>, fallback_id: impl Into<String>) -> Self {
        Self {
            provider_id,
            name: name.into(),
            fallback_id: fallback_id.into(),
            increment: 1,
            ..Default::default()
        }
    }
}

impl Entity for OverflowProvider {
    const TABLE: &'static str = "overflow_providers";
    const KIND: &'static str = "overflow provider";
    const COLUMNS: &'static [Column] = &[
        Column::new("provider_id", ColumnType::Id)
            .unique(Uniqueness::AmongLive)
            .references("providers"),
        Column::new("name", ColumnType::Text),
        Column::new("fallback_id", ColumnType::Text),
        Column::new("increment", ColumnType::Int),
    ];

    fn id(&self) -> Option<Id> {
        self.id
    }

    fn to_row(&self) -> AppResult<Row> {
        Ok(
            Row::new(self.id, self.created_at, self.updated_at, self.deleted_at)
                .with("provider_id", self.provider_id)
                .with("name", self.name.as_str())
                .with("fallback_id", self.fallback_id.as_str())
                .with("increment", self.increment),
        )
    }

    fn from_row(row: Row) -> AppResult<Self> {
        Ok(Self {
            provider_id: row.id_at("provider_id")?,
            name: row.text_at("name")?,
            fallback_id: row.text_at("fallback_id")?,
            increment: row.i32_at("increment")?,
            id: row.id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_name_length() {
        assert!(Provider::new("twilio").validate().is_ok());
        assert!(Provider::new("tw").validate().is_err());
        assert!(Provider::new("").validate().is_err());
    }

    #[test]
    fn test_overflow_row_round_trip() {
        let op = OverflowProvider::new(Id::new(), "twilio", "1234");
        let back = OverflowProvider::from_row(op.to_row().unwrap()).unwrap();
        assert_eq!(back.provider_id, op.provider_id);
        assert_eq!(back.fallback_id, "1234");
        assert_eq!(back.increment, 1);
    }
}
