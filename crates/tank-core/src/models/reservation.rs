//! Reservation (lease) model
//!
//! A reservation binds one number to one caller context until its absolute
//! expiration. The same number is leased and released many times over its
//! life, so "who holds this number" is always answered by the most recent
//! reservation, never by a direct foreign key.

use super::{Id, PhoneNumber, Tank};
use crate::codec::{self, Metadata};
use crate::query::{Column, ColumnType, Row};
use crate::traits::Entity;
use crate::{AppError, AppResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Time-bounded lease of a number
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Reservation {
    pub id: Option<Id>,
    pub phone_number_id: Id,
    pub tank_id: Id,

    /// Originating (ANI) number of the caller the lease was made for
    #[serde(rename = "ani_phone_number")]
    pub ani: u64,

    /// Absolute expiration
    pub expiration: DateTime<Utc>,

    /// Open annotations; stored through the metadata codec
    #[serde(rename = "meta_data", default)]
    pub meta: Metadata,

    /// Leased number, loaded with related data even if since retired
    #[serde(rename = "promo_phone_number", default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<PhoneNumber>,

    /// Owning tank, loaded with related data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tank: Option<Tank>,

    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Reservation {
    /// New lease expiring `ttl_seconds` from now
    ///
    /// # Errors
    ///
    /// `Validation` if the expiration falls outside the representable range
    pub fn new(phone_number_id: Id, tank_id: Id, ani: u64, ttl_seconds: i64) -> AppResult<Self> {
        let expiration = Duration::try_seconds(ttl_seconds)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .ok_or_else(|| {
                AppError::Validation(format!("lease ttl {} is out of range", ttl_seconds))
            })?;

        Ok(Self::until(phone_number_id, tank_id, ani, expiration))
    }

    /// New lease with an explicit expiration
    pub fn until(phone_number_id: Id, tank_id: Id, ani: u64, expiration: DateTime<Utc>) -> Self {
        Self {
            id: None,
            phone_number_id,
            tank_id,
            ani,
            expiration,
            meta: Metadata::new(),
            phone_number: None,
            tank: None,
            created_at: None,
            updated_at: None,
            deleted_at: None,
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Check if the lease has lapsed
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expiration
    }

    /// Time left on the lease, zero once expired
    pub fn remaining(&self) -> Duration {
        (self.expiration - Utc::now()).max(Duration::zero())
    }
}

impl Entity for Reservation {
    const TABLE: &'static str = "reservations";
    const KIND: &'static str = "reservation";
    const COLUMNS: &'static [Column] = &[
        Column::new("phone_number_id", ColumnType::Id).references("phone_numbers"),
        Column::new("tank_id", ColumnType::Id).references("tanks"),
        Column::new("ani_phone_number", ColumnType::UInt),
        Column::new("expiration", ColumnType::Timestamp),
        Column::new("meta", ColumnType::Bytes),
    ];

    fn id(&self) -> Option<Id> {
        self.id
    }

    fn to_row(&self) -> AppResult<Row> {
        // Encode first so a bad map never reaches the store
        let meta = codec::encode(&self.meta)?;

        Ok(
            Row::new(self.id, self.created_at, self.updated_at, self.deleted_at)
                .with("phone_number_id", self.phone_number_id)
                .with("tank_id", self.tank_id)
                .with("ani_phone_number", self.ani)
                .with("expiration", self.expiration)
                .with("meta", meta),
        )
    }

    fn from_row(row: Row) -> AppResult<Self> {
        Ok(Self {
            phone_number_id: row.id_at("phone_number_id")?,
            tank_id: row.id_at("tank_id")?,
            ani: row.u64_at("ani_phone_number")?,
            expiration: row.timestamp_at("expiration")?,
            meta: codec::decode(&row.bytes_at("meta")?)?,
            phone_number: None,
            tank: None,
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
    use crate::query::Value;

    #[test]
    fn test_expiration() {
        let live = Reservation::new(Id::new(), Id::new(), 5551234567, 3600).unwrap();
        assert!(!live.is_expired());
        assert!(live.remaining() > Duration::minutes(59));

        let lapsed = Reservation::new(Id::new(), Id::new(), 5551234567, -1).unwrap();
        assert!(lapsed.is_expired());
        assert_eq!(lapsed.remaining(), Duration::zero());
    }

    #[test]
    fn test_unrepresentable_expiration_rejected() {
        for ttl in [i64::MAX, i64::MIN] {
            assert!(matches!(
                Reservation::new(Id::new(), Id::new(), 5551234567, ttl),
                Err(AppError::Validation(_))
            ));
        }
    }

    #[test]
    fn test_meta_goes_through_codec() {
        let res = Reservation::new(Id::new(), Id::new(), 1, 60)
            .unwrap()
            .with_meta("campaign", "tv");
        let row = res.to_row().unwrap();
        assert_eq!(
            row.get("meta"),
            Some(&Value::Bytes(br#"{"campaign":"tv"}"#.to_vec()))
        );

        let back = Reservation::from_row(row).unwrap();
        assert_eq!(back.meta, res.meta);
    }

    #[test]
    fn test_empty_meta_column_reads_as_empty_map() {
        let res = Reservation::new(Id::new(), Id::new(), 1, 60).unwrap();
        let mut row = res.to_row().unwrap();
        row.set("meta", Value::Null);

        let back = Reservation::from_row(row).unwrap();
        assert!(back.meta.is_empty());
    }
}
