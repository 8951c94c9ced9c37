use crate::models::Lot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A lot projected into an auction's working set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionLot {
    pub lot: Lot,
    /// Sort key, unique within the session; gaps are allowed
    pub order: i32,
    /// Session-scoped, cleared whenever a new run starts
    pub eliminated: bool,
    pub added_at: DateTime<Utc>,
}

impl SessionLot {
    pub fn new(lot: Lot, order: i32, added_at: DateTime<Utc>) -> Self {
        Self {
            lot,
            order,
            eliminated: false,
            added_at,
        }
    }

    pub fn id(&self) -> Uuid {
        self.lot.id
    }

    pub fn sum(&self) -> i64 {
        self.lot.sum
    }
}

/// Requested position of one lot in a reorder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotOrder {
    pub lot_id: Uuid,
    pub order: i32,
}

impl LotOrder {
    pub fn new(lot_id: Uuid, order: i32) -> Self {
        Self { lot_id, order }
    }
}
