//! Call model
//!
//! Append-only record of a call placed against a lease.

use super::{Id, PhoneNumber, Reservation};
use crate::query::{Column, ColumnType, Row};
use crate::traits::Entity;
use crate::AppResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// A call placed against a reservation
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct Call {
    pub id: Option<Id>,
    pub phone_number_id: Id,
    pub reservation_id: Id,

    /// Calling party
    pub ani: u64,

    /// Where the call was routed
    pub destination: u64,

    /// Lease the call was made under, loaded with related data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservation: Option<Box<Reservation>>,

    /// Dialed number, loaded with related data even if since retired
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<PhoneNumber>,

    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Call {
    pub fn new(phone_number_id: Id, reservation_id: Id, ani: u64, destination: u64) -> Self {
        Self {
            phone_number_id,
            reservation_id,
            ani,
            destination,
            ..Default::default()
        }
    }
}

impl Entity for Call {
    const TABLE: &'static str = "calls";
    const KIND: &'static str = "call";
    const COLUMNS: &'static [Column] = &[
        Column::new("phone_number_id", ColumnType::Id).references("phone_numbers"),
        Column::new("reservation_id", ColumnType::Id).references("reservations"),
        Column::new("ani", ColumnType::UInt),
        Column::new("destination", ColumnType::UInt),
    ];

    fn id(&self) -> Option<Id> {
        self.id
    }

    fn to_row(&self) -> AppResult<Row> {
        Ok(
            Row::new(self.id, self.created_at, self.updated_at, self.deleted_at)
                .with("phone_number_id", self.phone_number_id)
                .with("reservation_id", self.reservation_id)
                .with("ani", self.ani)
                .with("destination", self.destination),
        )
    }

    fn from_row(row: Row) -> AppResult<Self> {
        Ok(Self {
            phone_number_id: row.id_at("phone_number_id")?,
            reservation_id: row.id_at("reservation_id")?,
            ani: row.u64_at("ani")?,
            destination: row.u64_at("destination")?,
            reservation: None,
            phone_number: None,
            id: row.id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}
