//! Persistence for lots, auctions, history and timers.
//!
//! `AuctionStore` is the seam between the service and storage. Each write
//! that changes an auction goes through `save_session`, which stores the
//! auction row, its lot list, the history records and optionally the timer in
//! one atomic step.

pub mod memory_store;
pub mod pg_store;

pub use memory_store::MemoryStore;
pub use pg_store::PgStore;

use crate::error::RepositoryError;
use crate::models::{Auction, AuctionStatus, HistoryRecord, Lot, LotCategory, NewHistoryRecord};
use crate::session::AuctionSession;
use crate::timer::TimerState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Everything persisted by one auction mutation
#[derive(Debug, Clone, Copy)]
pub struct SessionWrite<'a> {
    pub session: &'a AuctionSession,
    /// Status the stored row must still have; a mismatch is a `Conflict`
    pub expected_status: AuctionStatus,
    pub history: &'a [NewHistoryRecord],
    pub timer: Option<&'a TimerState>,
}

impl<'a> SessionWrite<'a> {
    pub fn new(session: &'a AuctionSession, expected_status: AuctionStatus) -> Self {
        Self {
            session,
            expected_status,
            history: &[],
            timer: None,
        }
    }

    pub fn with_history(mut self, history: &'a [NewHistoryRecord]) -> Self {
        self.history = history;
        self
    }

    pub fn with_timer(mut self, timer: &'a TimerState) -> Self {
        self.timer = Some(timer);
        self
    }
}

#[async_trait]
pub trait AuctionStore: Send + Sync {
    // Lot library

    async fn insert_lot(&self, lot: &Lot) -> RepositoryResult<()>;

    async fn find_lot(&self, id: Uuid) -> RepositoryResult<Option<Lot>>;

    /// Lots with the given ids, in the order requested; unknown ids are skipped
    async fn find_lots(&self, ids: &[Uuid]) -> RepositoryResult<Vec<Lot>>;

    async fn list_lots(&self, category: Option<LotCategory>) -> RepositoryResult<Vec<Lot>>;

    /// Atomically add `amount` to a lot's sum
    async fn increase_lot_sum(&self, id: Uuid, amount: i64, at: DateTime<Utc>) -> RepositoryResult<Lot>;

    async fn set_lot_sum(&self, id: Uuid, sum: i64, at: DateTime<Utc>) -> RepositoryResult<Lot>;

    // Auctions

    async fn insert_session(&self, session: &AuctionSession, history: &[NewHistoryRecord]) -> RepositoryResult<()>;

    async fn find_session(&self, id: Uuid) -> RepositoryResult<Option<AuctionSession>>;

    /// Newest configured, running or paused auction
    async fn find_active_session(&self) -> RepositoryResult<Option<AuctionSession>>;

    /// Auctions newest first
    async fn list_auctions(
        &self,
        status: Option<AuctionStatus>,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<Auction>>;

    async fn save_session(&self, write: SessionWrite<'_>) -> RepositoryResult<()>;

    /// Delete an auction with its lot list, history and timer.
    ///
    /// Returns `false` when no such auction exists.
    async fn delete_auction(&self, id: Uuid) -> RepositoryResult<bool>;

    // History and timers

    /// History of an auction, oldest first
    async fn list_history(&self, auction_id: Uuid) -> RepositoryResult<Vec<HistoryRecord>>;

    async fn save_timer(&self, auction_id: Uuid, state: &TimerState) -> RepositoryResult<()>;

    async fn load_timer(&self, auction_id: Uuid) -> RepositoryResult<Option<TimerState>>;
}
