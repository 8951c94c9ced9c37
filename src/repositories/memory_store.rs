//! In-process store used when no database is configured.
//!
//! State can be written to and restored from a JSON snapshot file so a
//! session survives a restart.

use super::{AuctionStore, RepositoryResult, SessionWrite};
use crate::error::RepositoryError;
use crate::models::{Auction, AuctionStatus, HistoryRecord, Lot, LotCategory, NewHistoryRecord, SessionLot};
use crate::session::AuctionSession;
use crate::timer::TimerState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Membership of a lot in an auction, without the lot itself
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LotEntry {
    lot_id: Uuid,
    order: i32,
    eliminated: bool,
    added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredAuction {
    auction: Auction,
    lots: Vec<LotEntry>,
}

#[derive(Debug, Default)]
struct MemoryState {
    lots: HashMap<Uuid, Lot>,
    auctions: HashMap<Uuid, StoredAuction>,
    history: Vec<HistoryRecord>,
    timers: HashMap<Uuid, TimerState>,
}

/// On-disk form of `MemoryState`
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    lots: Vec<Lot>,
    auctions: Vec<StoredAuction>,
    history: Vec<HistoryRecord>,
    timers: Vec<(Uuid, TimerState)>,
}

impl From<Snapshot> for MemoryState {
    fn from(snapshot: Snapshot) -> Self {
        Self {
            lots: snapshot.lots.into_iter().map(|lot| (lot.id, lot)).collect(),
            auctions: snapshot
                .auctions
                .into_iter()
                .map(|stored| (stored.auction.id, stored))
                .collect(),
            history: snapshot.history,
            timers: snapshot.timers.into_iter().collect(),
        }
    }
}

impl MemoryState {
    fn snapshot(&self) -> Snapshot {
        Snapshot {
            lots: self.lots.values().cloned().collect(),
            auctions: self.auctions.values().cloned().collect(),
            history: self.history.clone(),
            timers: self.timers.iter().map(|(id, timer)| (*id, timer.clone())).collect(),
        }
    }

    fn hydrate(&self, stored: &StoredAuction) -> RepositoryResult<AuctionSession> {
        let lots = stored
            .lots
            .iter()
            .map(|entry| {
                let lot = self.lots.get(&entry.lot_id).cloned().ok_or_else(|| {
                    RepositoryError::Corrupt(format!(
                        "auction {} references missing lot {}",
                        stored.auction.id, entry.lot_id
                    ))
                })?;
                Ok(SessionLot {
                    lot,
                    order: entry.order,
                    eliminated: entry.eliminated,
                    added_at: entry.added_at,
                })
            })
            .collect::<RepositoryResult<Vec<_>>>()?;

        Ok(AuctionSession::from_parts(stored.auction.clone(), lots))
    }

    fn entries(&self, session: &AuctionSession) -> RepositoryResult<Vec<LotEntry>> {
        session
            .lots()
            .iter()
            .map(|lot| {
                if !self.lots.contains_key(&lot.id()) {
                    return Err(RepositoryError::ConstraintViolation(format!(
                        "lot {} does not exist",
                        lot.id()
                    )));
                }
                Ok(LotEntry {
                    lot_id: lot.id(),
                    order: lot.order,
                    eliminated: lot.eliminated,
                    added_at: lot.added_at,
                })
            })
            .collect()
    }

    fn append_history(&mut self, history: &[NewHistoryRecord]) {
        self.history
            .extend(history.iter().cloned().map(NewHistoryRecord::into_record));
    }

    fn lot_mut(&mut self, id: Uuid) -> RepositoryResult<&mut Lot> {
        self.lots
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("Lot {} not found", id)))
    }
}

/// Store backed by process memory
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a store persisted at `path`, restoring it when the file exists
    pub async fn open(path: impl Into<PathBuf>) -> RepositoryResult<Self> {
        let path = path.into();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let snapshot: Snapshot = serde_json::from_slice(&bytes)
                    .map_err(|e| RepositoryError::Storage(format!("invalid snapshot {:?}: {}", path, e)))?;
                info!(
                    path = ?path,
                    lots = snapshot.lots.len(),
                    auctions = snapshot.auctions.len(),
                    "Restored snapshot"
                );
                MemoryState::from(snapshot)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = ?path, "No snapshot found, starting empty");
                MemoryState::default()
            }
            Err(e) => {
                return Err(RepositoryError::Storage(format!(
                    "failed to read snapshot {:?}: {}",
                    path, e
                )))
            }
        };

        Ok(Self {
            state: Arc::new(RwLock::new(state)),
            snapshot_path: Some(path),
        })
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    /// Write the current state to the snapshot file, if one is configured.
    ///
    /// The file is replaced through a temporary file so a crash never leaves
    /// a half-written snapshot behind.
    pub async fn save_snapshot(&self) -> RepositoryResult<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let bytes = {
            let state = self.state.read().await;
            serde_json::to_vec_pretty(&state.snapshot())
                .map_err(|e| RepositoryError::Storage(format!("failed to encode snapshot: {}", e)))?
        };

        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| RepositoryError::Storage(format!("failed to write {:?}: {}", tmp, e)))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| RepositoryError::Storage(format!("failed to replace {:?}: {}", path, e)))?;

        debug!(path = ?path, bytes = bytes.len(), "Snapshot written");
        Ok(())
    }
}

#[async_trait]
impl AuctionStore for MemoryStore {
    async fn insert_lot(&self, lot: &Lot) -> RepositoryResult<()> {
        let mut state = self.state.write().await;
        if state.lots.contains_key(&lot.id) {
            return Err(RepositoryError::Duplicate(format!("Lot {} already exists", lot.id)));
        }
        state.lots.insert(lot.id, lot.clone());
        Ok(())
    }

    async fn find_lot(&self, id: Uuid) -> RepositoryResult<Option<Lot>> {
        Ok(self.state.read().await.lots.get(&id).cloned())
    }

    async fn find_lots(&self, ids: &[Uuid]) -> RepositoryResult<Vec<Lot>> {
        let state = self.state.read().await;
        Ok(ids.iter().filter_map(|id| state.lots.get(id).cloned()).collect())
    }

    async fn list_lots(&self, category: Option<LotCategory>) -> RepositoryResult<Vec<Lot>> {
        let state = self.state.read().await;
        let mut lots: Vec<Lot> = state
            .lots
            .values()
            .filter(|lot| category.map_or(true, |c| lot.category == c))
            .cloned()
            .collect();
        lots.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.title.cmp(&b.title)));
        Ok(lots)
    }

    async fn increase_lot_sum(&self, id: Uuid, amount: i64, at: DateTime<Utc>) -> RepositoryResult<Lot> {
        let mut state = self.state.write().await;
        let lot = state.lot_mut(id)?;
        lot.sum = lot
            .sum
            .checked_add(amount)
            .filter(|sum| *sum >= 0)
            .ok_or_else(|| RepositoryError::ConstraintViolation(format!("sum of lot {} out of range", id)))?;
        lot.updated_at = at;
        Ok(lot.clone())
    }

    async fn set_lot_sum(&self, id: Uuid, sum: i64, at: DateTime<Utc>) -> RepositoryResult<Lot> {
        if sum < 0 {
            return Err(RepositoryError::ConstraintViolation("sum cannot be negative".to_string()));
        }
        let mut state = self.state.write().await;
        let lot = state.lot_mut(id)?;
        lot.sum = sum;
        lot.updated_at = at;
        Ok(lot.clone())
    }

    async fn insert_session(&self, session: &AuctionSession, history: &[NewHistoryRecord]) -> RepositoryResult<()> {
        let mut state = self.state.write().await;
        if state.auctions.contains_key(&session.id()) {
            return Err(RepositoryError::Duplicate(format!("Auction {} already exists", session.id())));
        }
        let lots = state.entries(session)?;
        state.auctions.insert(
            session.id(),
            StoredAuction {
                auction: session.auction.clone(),
                lots,
            },
        );
        state.append_history(history);
        Ok(())
    }

    async fn find_session(&self, id: Uuid) -> RepositoryResult<Option<AuctionSession>> {
        let state = self.state.read().await;
        state.auctions.get(&id).map(|stored| state.hydrate(stored)).transpose()
    }

    async fn find_active_session(&self) -> RepositoryResult<Option<AuctionSession>> {
        let state = self.state.read().await;
        state
            .auctions
            .values()
            .filter(|stored| stored.auction.is_active())
            .max_by_key(|stored| stored.auction.created_at)
            .map(|stored| state.hydrate(stored))
            .transpose()
    }

    async fn list_auctions(
        &self,
        status: Option<AuctionStatus>,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<Auction>> {
        let state = self.state.read().await;
        let mut auctions: Vec<Auction> = state
            .auctions
            .values()
            .map(|stored| stored.auction.clone())
            .filter(|auction| status.map_or(true, |s| auction.status == s))
            .collect();
        auctions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(auctions
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn save_session(&self, write: SessionWrite<'_>) -> RepositoryResult<()> {
        let mut state = self.state.write().await;
        let id = write.session.id();

        let stored_status = state
            .auctions
            .get(&id)
            .map(|stored| stored.auction.status)
            .ok_or_else(|| RepositoryError::NotFound(format!("Auction {} not found", id)))?;
        if stored_status != write.expected_status {
            return Err(RepositoryError::Conflict(format!(
                "auction {} is '{}', expected '{}'",
                id, stored_status, write.expected_status
            )));
        }

        let lots = state.entries(write.session)?;
        state.auctions.insert(
            id,
            StoredAuction {
                auction: write.session.auction.clone(),
                lots,
            },
        );
        state.append_history(write.history);
        if let Some(timer) = write.timer {
            state.timers.insert(id, timer.clone());
        }
        Ok(())
    }

    async fn delete_auction(&self, id: Uuid) -> RepositoryResult<bool> {
        let mut state = self.state.write().await;
        if state.auctions.remove(&id).is_none() {
            return Ok(false);
        }
        state.history.retain(|record| record.auction_id != id);
        state.timers.remove(&id);
        Ok(true)
    }

    async fn list_history(&self, auction_id: Uuid) -> RepositoryResult<Vec<HistoryRecord>> {
        let state = self.state.read().await;
        Ok(state
            .history
            .iter()
            .filter(|record| record.auction_id == auction_id)
            .cloned()
            .collect())
    }

    async fn save_timer(&self, auction_id: Uuid, timer: &TimerState) -> RepositoryResult<()> {
        let mut state = self.state.write().await;
        if !state.auctions.contains_key(&auction_id) {
            return Err(RepositoryError::NotFound(format!("Auction {} not found", auction_id)));
        }
        state.timers.insert(auction_id, timer.clone());
        Ok(())
    }

    async fn load_timer(&self, auction_id: Uuid) -> RepositoryResult<Option<TimerState>> {
        Ok(self.state.read().await.timers.get(&auction_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuctionEvent, AuctionMode, AuctionSettings, NewLot, SubMode};

    fn settings() -> AuctionSettings {
        AuctionSettings {
            mode: AuctionMode::Cards,
            sub_mode: SubMode::Elimination,
            duration_sec: 60,
            spin_sec: 5,
        }
    }

    async fn seeded_store() -> (MemoryStore, AuctionSession) {
        let store = MemoryStore::new();
        let now = Utc::now();
        let lots: Vec<Lot> = (0..3)
            .map(|i| NewLot::new(format!("Lot {}", i), LotCategory::Games).into_lot(now))
            .collect();
        for lot in &lots {
            store.insert_lot(lot).await.unwrap();
        }

        let mut session = AuctionSession::new(settings(), now).unwrap();
        store.insert_session(&session, &[]).await.unwrap();
        let added = session.add_lots(lots, now).unwrap();
        store
            .save_session(SessionWrite::new(&session, AuctionStatus::Idle).with_history(&added.history))
            .await
            .unwrap();
        (store, session)
    }

    #[tokio::test]
    async fn test_session_round_trip_reads_current_sums() {
        let (store, session) = seeded_store().await;
        let lot_id = session.lots()[1].id();
        store.increase_lot_sum(lot_id, 250, Utc::now()).await.unwrap();

        let loaded = store.find_session(session.id()).await.unwrap().unwrap();
        assert_eq!(loaded.status(), AuctionStatus::Configured);
        assert_eq!(loaded.lots().len(), 3);
        assert_eq!(loaded.lot(lot_id).unwrap().sum(), 250);

        let active = store.find_active_session().await.unwrap().unwrap();
        assert_eq!(active.id(), session.id());
        assert_eq!(store.list_history(session.id()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_stale_status_is_a_conflict() {
        let (store, mut session) = seeded_store().await;
        session.apply_event(AuctionEvent::Start, Utc::now()).unwrap();

        let result = store
            .save_session(SessionWrite::new(&session, AuctionStatus::Idle))
            .await;
        assert!(matches!(result, Err(RepositoryError::Conflict(_))));

        let stored = store.find_session(session.id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), AuctionStatus::Configured);
    }

    #[tokio::test]
    async fn test_unknown_lot_is_rejected() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut session = AuctionSession::new(settings(), now).unwrap();
        store.insert_session(&session, &[]).await.unwrap();

        let ghost = NewLot::new("Ghost", LotCategory::Movies).into_lot(now);
        session.add_lots(vec![ghost], now).unwrap();
        let result = store
            .save_session(SessionWrite::new(&session, AuctionStatus::Idle))
            .await;
        assert!(matches!(result, Err(RepositoryError::ConstraintViolation(_))));
    }

    #[tokio::test]
    async fn test_sum_updates() {
        let store = MemoryStore::new();
        let lot = NewLot::new("Lot", LotCategory::Games).into_lot(Utc::now());
        store.insert_lot(&lot).await.unwrap();

        assert_eq!(store.increase_lot_sum(lot.id, 10, Utc::now()).await.unwrap().sum, 10);
        assert_eq!(store.set_lot_sum(lot.id, 3, Utc::now()).await.unwrap().sum, 3);
        assert!(store.set_lot_sum(lot.id, -1, Utc::now()).await.is_err());
        assert!(matches!(
            store.increase_lot_sum(Uuid::new_v4(), 1, Utc::now()).await,
            Err(RepositoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_snapshot_restores_state() {
        let path = std::env::temp_dir().join(format!("lotwheel-{}.json", Uuid::new_v4()));
        let store = MemoryStore::open(&path).await.unwrap();
        let now = Utc::now();
        let lot = NewLot::new("Persisted", LotCategory::Games).with_sum(42).into_lot(now);
        store.insert_lot(&lot).await.unwrap();

        let mut session = AuctionSession::new(settings(), now).unwrap();
        store.insert_session(&session, &[]).await.unwrap();
        session.add_lots(vec![lot.clone()], now).unwrap();
        store
            .save_session(SessionWrite::new(&session, AuctionStatus::Idle))
            .await
            .unwrap();
        store.save_timer(session.id(), &TimerState::stopped(60_000)).await.unwrap();
        store.save_snapshot().await.unwrap();

        let restored = MemoryStore::open(&path).await.unwrap();
        let loaded = restored.find_session(session.id()).await.unwrap().unwrap();
        assert_eq!(loaded, session);
        assert_eq!(
            restored.load_timer(session.id()).await.unwrap(),
            Some(TimerState::stopped(60_000))
        );

        let _ = std::fs::remove_file(&path);
    }
}
