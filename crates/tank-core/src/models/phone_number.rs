//! Phone number model

use super::Id;
use crate::query::{Column, ColumnType, Row, Uniqueness};
use crate::traits::Entity;
use crate::AppResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// A leasable number
///
/// The numeric value is unique among live numbers only: a retired number
/// keeps its row so historical reservations and calls still resolve, and the
/// same value may be bought again later.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct PhoneNumber {
    pub id: Option<Id>,
    pub provider_id: Id,
    pub tank_id: Id,

    #[serde(rename = "phone_number")]
    pub number: u64,

    /// When the number was last leased
    pub last_reservation: Option<DateTime<Utc>>,

    /// When the number was last called
    pub last_call: Option<DateTime<Utc>>,

    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl PhoneNumber {
    pub fn new(provider_id: Id, tank_id: Id, number: u64) -> Self {
        Self {
            provider_id,
            tank_id,
            number,
            ..Default::default()
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

impl Entity for PhoneNumber {
    const TABLE: &'static str = "phone_numbers";
    const KIND: &'static str = "phone number";
    const COLUMNS: &'static [Column] = &[
        Column::new("provider_id", ColumnType::Id).references("providers"),
        Column::new("tank_id", ColumnType::Id).references("tanks"),
        Column::new("phone_number", ColumnType::UInt).unique(Uniqueness::AmongLive),
        Column::new("last_reservation", ColumnType::Timestamp).nullable(),
        Column::new("last_call", ColumnType::Timestamp).nullable(),
    ];

    fn id(&self) -> Option<Id> {
        self.id
    }

    fn to_row(&self) -> AppResult<Row> {
        Ok(
            Row::new(self.id, self.created_at, self.updated_at, self.deleted_at)
                .with("provider_id", self.provider_id)
                .with("tank_id", self.tank_id)
                .with("phone_number", self.number)
                .with("last_reservation", self.last_reservation)
                .with("last_call", self.last_call),
        )
    }

    fn from_row(row: Row) -> AppResult<Self> {
        Ok(Self {
            provider_id: row.id_at("provider_id")?,
            tank_id: row.id_at("tank_id")?,
            number: row.u64_at("phone_number")?,
            last_reservation: row.opt_timestamp_at("last_reservation")?,
            last_call: row.opt_timestamp_at("last_call")?,
            id: row.id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}
