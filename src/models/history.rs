use crate::models::AuctionStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

pub const EVENT_LOT_REVEALED: &str = "lot_revealed";
pub const EVENT_LOT_ELIMINATED: &str = "lot_eliminated";
pub const EVENT_AUCTION_WINNER: &str = "auction_winner";
pub const EVENT_LOTS_ADDED: &str = "lots_added";
pub const EVENT_LOTS_REMOVED: &str = "lots_removed";
pub const EVENT_LOTS_REORDERED: &str = "lots_reordered";

/// Append-only audit entry tied to an auction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: Uuid,
    pub auction_id: Uuid,
    pub event_type: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

/// History entry that has not been written yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewHistoryRecord {
    pub auction_id: Uuid,
    pub event_type: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl NewHistoryRecord {
    pub fn new(auction_id: Uuid, event_type: impl Into<String>, payload: Value, at: DateTime<Utc>) -> Self {
        Self {
            auction_id,
            event_type: event_type.into(),
            payload,
            created_at: at,
        }
    }

    /// `auction_<status>` entry for a status change
    pub fn status_change(
        auction_id: Uuid,
        previous: AuctionStatus,
        new: AuctionStatus,
        at: DateTime<Utc>,
        reason: Option<&str>,
    ) -> Self {
        let mut payload = json!({
            "previousStatus": previous.as_str(),
            "newStatus": new.as_str(),
            "timestamp": at.to_rfc3339(),
        });
        if let Some(reason) = reason {
            payload["reason"] = json!(reason);
        }
        Self::new(auction_id, format!("auction_{}", new.as_str()), payload, at)
    }

    /// Assign an id, producing the immutable stored record
    pub fn into_record(self) -> HistoryRecord {
        HistoryRecord {
            id: Uuid::new_v4(),
            auction_id: self.auction_id,
            event_type: self.event_type,
            payload: self.payload,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_change_payload() {
        let at = Utc::now();
        let record = NewHistoryRecord::status_change(
            Uuid::new_v4(),
            AuctionStatus::Configured,
            AuctionStatus::Running,
            at,
            None,
        );
        assert_eq!(record.event_type, "auction_running");
        assert_eq!(record.payload["previousStatus"], "configured");
        assert_eq!(record.payload["newStatus"], "running");
        assert_eq!(record.payload["timestamp"], at.to_rfc3339());
        assert!(record.payload.get("reason").is_none());
    }

    #[test]
    fn test_status_change_reason() {
        let record = NewHistoryRecord::status_change(
            Uuid::new_v4(),
            AuctionStatus::Idle,
            AuctionStatus::Configured,
            Utc::now(),
            Some("lots_changed"),
        );
        assert_eq!(record.payload["reason"], "lots_changed");
    }
}
