use crate::config::AuctionDefaults;
use crate::error::{AppError, AppResult, AuctionError};
use crate::models::{
    Auction, AuctionEvent, AuctionMode, AuctionSettings, AuctionStatus, HistoryRecord, Lot, LotCategory, LotOrder, NewLot,
    SubMode,
};
use crate::repositories::{AuctionStore, SessionWrite};
use crate::selection::{plan_spin, roulette_items, RoundOutcome, SelectionEngine, SpinPlan};
use crate::session::{AuctionSession, LotsAdded, LotsRemoved, PlayedRun};
use crate::timer::{CountdownTimer, TimerState};
use crate::websocket::{LotChangeAction, WebSocketServer, WsMessage};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const MAX_PAGE_SIZE: i64 = 100;

/// Result of one reveal as shown to the operator
#[derive(Debug, Clone)]
pub struct RoundReport {
    pub outcome: RoundOutcome,
    /// Set for roulette auctions; the strip lands on `outcome.revealed_id`
    pub spin: Option<SpinPlan>,
    pub session: AuctionSession,
}

/// Orchestrates auctions against the store.
///
/// Every mutation holds `write_lock` from load to save, so there is a single
/// writer per process. Status writes are additionally conditional on the
/// status that was loaded.
pub struct AuctionService {
    store: Arc<dyn AuctionStore>,
    ws: Arc<WebSocketServer>,
    engine: SelectionEngine,
    defaults: AuctionDefaults,
    // never held across an await
    rng: StdMutex<StdRng>,
    write_lock: Mutex<()>,
}

fn rejected(auction_id: Uuid, operation: &str, err: AuctionError) -> AppError {
    warn!(auction_id = %auction_id, operation, error = %err, "Auction request rejected");
    err.into()
}

impl AuctionService {
    pub fn new(store: Arc<dyn AuctionStore>, ws: Arc<WebSocketServer>, defaults: AuctionDefaults) -> Self {
        Self::with_rng(store, ws, defaults, StdRng::from_os_rng())
    }

    /// Deterministic service for tests and replays
    pub fn with_seed(
        store: Arc<dyn AuctionStore>,
        ws: Arc<WebSocketServer>,
        defaults: AuctionDefaults,
        seed: u64,
    ) -> Self {
        Self::with_rng(store, ws, defaults, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        store: Arc<dyn AuctionStore>,
        ws: Arc<WebSocketServer>,
        defaults: AuctionDefaults,
        rng: StdRng,
    ) -> Self {
        Self {
            store,
            ws,
            engine: SelectionEngine::with_max_rounds(defaults.max_elimination_rounds),
            defaults,
            rng: StdMutex::new(rng),
            write_lock: Mutex::new(()),
        }
    }

    pub fn engine(&self) -> &SelectionEngine {
        &self.engine
    }

    /// Cards with elimination, using the configured durations
    pub fn default_settings(&self) -> AuctionSettings {
        AuctionSettings {
            mode: AuctionMode::Cards,
            sub_mode: SubMode::Elimination,
            duration_sec: self.defaults.duration_sec,
            spin_sec: self.defaults.spin_sec,
        }
    }

    fn with_rng_locked<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut rng)
    }

    async fn load(&self, id: Uuid) -> AppResult<AuctionSession> {
        self.store
            .find_session(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Auction {} not found", id)))
    }

    async fn load_timer(&self, session: &AuctionSession, now: DateTime<Utc>) -> AppResult<CountdownTimer> {
        match self.store.load_timer(session.id()).await? {
            Some(state) => Ok(CountdownTimer::restore(state, now)),
            None => Ok(CountdownTimer::new(session.auction.duration_sec)?),
        }
    }

    // =========================================================================
    // Auctions
    // =========================================================================

    /// Create an idle auction. Fails while another auction is active.
    pub async fn create_auction(&self, settings: AuctionSettings) -> AppResult<AuctionSession> {
        let _guard = self.write_lock.lock().await;

        if let Some(active) = self.store.find_active_session().await? {
            warn!(active_id = %active.id(), "Rejected auction creation while another is active");
            return Err(AppError::BusinessLogic(format!(
                "Auction {} is still {}",
                active.id(),
                active.status()
            )));
        }

        let session = AuctionSession::new(settings, Utc::now())?;
        let timer = CountdownTimer::new(settings.duration_sec)?;
        self.store.insert_session(&session, &[]).await?;
        self.store.save_timer(session.id(), timer.state()).await?;

        info!(
            auction_id = %session.id(),
            mode = settings.mode.as_str(),
            sub_mode = settings.sub_mode.as_str(),
            duration_sec = settings.duration_sec,
            "Auction created"
        );
        self.publish_status(&session, None).await;
        Ok(session)
    }

    pub async fn get_auction(&self, id: Uuid) -> AppResult<AuctionSession> {
        self.load(id).await
    }

    /// Newest configured, running or paused auction
    pub async fn current_auction(&self) -> AppResult<Option<AuctionSession>> {
        Ok(self.store.find_active_session().await?)
    }

    /// Auctions newest first; `page` starts at 1
    pub async fn list_auctions(
        &self,
        status: Option<AuctionStatus>,
        page: i64,
        limit: i64,
    ) -> AppResult<Vec<Auction>> {
        if page < 1 {
            return Err(AppError::Validation("page must be at least 1".to_string()));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(AppError::Validation(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        Ok(self.store.list_auctions(status, limit, (page - 1) * limit).await?)
    }

    /// Delete an idle or archived auction
    pub async fn delete_auction(&self, id: Uuid) -> AppResult<()> {
        let _guard = self.write_lock.lock().await;
        let session = self.load(id).await?;
        if !session.auction.is_deletable() {
            return Err(rejected(
                id,
                "delete_auction",
                AuctionError::DeletionRejected {
                    status: session.status(),
                },
            ));
        }

        if !self.store.delete_auction(id).await? {
            return Err(AppError::NotFound(format!("Auction {} not found", id)));
        }
        info!(auction_id = %id, "Auction deleted");
        Ok(())
    }

    /// Change mode, sub-mode and durations. Resets the timer to the new duration.
    pub async fn configure(&self, id: Uuid, settings: AuctionSettings) -> AppResult<AuctionSession> {
        let _guard = self.write_lock.lock().await;
        let mut session = self.load(id).await?;
        let expected = session.status();

        session
            .update_settings(settings)
            .map_err(|e| rejected(id, "configure", e))?;
        let timer = CountdownTimer::new(settings.duration_sec)?;

        self.store
            .save_session(SessionWrite::new(&session, expected).with_timer(timer.state()))
            .await?;

        info!(auction_id = %id, ?settings, "Auction configured");
        self.publish_timer(id, &timer).await;
        Ok(session)
    }

    /// Apply an operator event and move the timer along with it
    pub async fn apply_event(&self, id: Uuid, event: AuctionEvent) -> AppResult<AuctionSession> {
        let _guard = self.write_lock.lock().await;
        let now = Utc::now();
        let mut session = self.load(id).await?;
        let mut timer = self.load_timer(&session, now).await?;

        let change = session
            .apply_event(event, now)
            .map_err(|e| rejected(id, "apply_event", e))?;

        match event {
            AuctionEvent::Start => {
                timer.set_duration(session.auction.duration_sec)?;
                timer.start(now);
            }
            AuctionEvent::Resume => {
                timer.start(now);
            }
            AuctionEvent::Pause | AuctionEvent::Finish => {
                timer.pause(now);
            }
            AuctionEvent::Reset => timer.reset(),
            AuctionEvent::Configure | AuctionEvent::Archive => {}
        }

        let history = [change.to_history(id)];
        self.store
            .save_session(
                SessionWrite::new(&session, change.previous)
                    .with_history(&history)
                    .with_timer(timer.state()),
            )
            .await?;

        info!(
            auction_id = %id,
            event = event.as_str(),
            from = change.previous.as_str(),
            to = change.new.as_str(),
            "Auction status changed"
        );
        self.publish_status(&session, Some(change.previous)).await;
        self.publish_timer(id, &timer).await;
        Ok(session)
    }

    // =========================================================================
    // Lot list
    // =========================================================================

    /// Add library lots to an idle or configured auction.
    ///
    /// Every id must exist in the library; lots already in the auction are skipped.
    pub async fn add_lots(&self, id: Uuid, lot_ids: &[Uuid]) -> AppResult<LotsAdded> {
        let _guard = self.write_lock.lock().await;
        let now = Utc::now();
        let mut session = self.load(id).await?;
        let expected = session.status();

        let lots = self.store.find_lots(lot_ids).await?;
        let found: HashSet<Uuid> = lots.iter().map(|lot| lot.id).collect();
        if let Some(missing) = lot_ids.iter().find(|lot_id| !found.contains(lot_id)) {
            return Err(AppError::NotFound(format!("Lot {} not found", missing)));
        }

        let added = session
            .add_lots(lots, now)
            .map_err(|e| rejected(id, "add_lots", e))?;

        self.store
            .save_session(SessionWrite::new(&session, expected).with_history(&added.history))
            .await?;

        info!(auction_id = %id, added = added.added.len(), "Lots added");
        self.publish_lot_change(
            Some(id),
            LotChangeAction::Added,
            added.added.iter().map(|lot| lot.id()).collect(),
        )
        .await;
        if let Some(change) = &added.status_change {
            self.publish_status(&session, Some(change.previous)).await;
        }
        Ok(added)
    }

    pub async fn remove_lots(&self, id: Uuid, lot_ids: &[Uuid]) -> AppResult<LotsRemoved> {
        let _guard = self.write_lock.lock().await;
        let now = Utc::now();
        let mut session = self.load(id).await?;
        let expected = session.status();

        let removed = session
            .remove_lots(lot_ids, now)
            .map_err(|e| rejected(id, "remove_lots", e))?;

        self.store
            .save_session(SessionWrite::new(&session, expected).with_history(&removed.history))
            .await?;

        info!(auction_id = %id, removed = removed.removed.len(), "Lots removed");
        self.publish_lot_change(Some(id), LotChangeAction::Removed, removed.removed.clone())
            .await;
        if let Some(change) = &removed.status_change {
            self.publish_status(&session, Some(change.previous)).await;
        }
        Ok(removed)
    }

    /// Apply new orders in one store transaction.
    ///
    /// On a store failure the stored order stays as it was.
    pub async fn reorder_lots(&self, id: Uuid, orders: &[LotOrder]) -> AppResult<AuctionSession> {
        let _guard = self.write_lock.lock().await;
        let now = Utc::now();
        let mut session = self.load(id).await?;
        let expected = session.status();

        let record = session
            .reorder(orders, now)
            .map_err(|e| rejected(id, "reorder_lots", e))?;

        let history = [record];
        self.store
            .save_session(SessionWrite::new(&session, expected).with_history(&history))
            .await
            .map_err(|e| {
                error!(auction_id = %id, error = %e, "Failed to persist lot order");
                AppError::from(e)
            })?;

        info!(auction_id = %id, lots = orders.len(), "Lots reordered");
        self.publish_lot_change(
            Some(id),
            LotChangeAction::Reordered,
            session.lots().iter().map(|lot| lot.id()).collect(),
        )
        .await;
        Ok(session)
    }

    // =========================================================================
    // Selection
    // =========================================================================

    /// Reveal one lot. Roulette auctions also get the spin that replays it.
    pub async fn play_round(&self, id: Uuid) -> AppResult<RoundReport> {
        let _guard = self.write_lock.lock().await;
        let now = Utc::now();
        let mut session = self.load(id).await?;
        let expected = session.status();
        let before = session.lots().to_vec();

        let (played, spin) = self
            .with_rng_locked(|rng| -> Result<_, AuctionError> {
                let played = session.play_round(&self.engine, rng, now)?;
                let spin = match session.auction.mode {
                    AuctionMode::Roulette => {
                        let items = roulette_items(&self.engine, &before, rng);
                        Some(plan_spin(
                            items,
                            played.outcome.revealed_id,
                            session.auction.spin_sec,
                            rng,
                        )?)
                    }
                    AuctionMode::Cards => None,
                };
                Ok((played, spin))
            })
            .map_err(|e| rejected(id, "play_round", e))?;

        self.store
            .save_session(SessionWrite::new(&session, expected).with_history(&played.history))
            .await?;

        let outcome = played.outcome;
        info!(
            auction_id = %id,
            lot_id = %outcome.revealed_id,
            eliminated = outcome.eliminated,
            remaining = outcome.remaining,
            winner = outcome.winner_id.is_some(),
            "Round played"
        );
        self.ws
            .publish(WsMessage::RoundResult {
                auction_id: id,
                outcome: outcome.clone(),
                spin: spin.clone(),
            })
            .await;
        if outcome.winner_id.is_some() {
            self.publish_status(&session, None).await;
        }

        Ok(RoundReport {
            outcome,
            spin,
            session,
        })
    }

    /// Decide the winner in one call
    pub async fn run_to_winner(&self, id: Uuid) -> AppResult<PlayedRun> {
        let _guard = self.write_lock.lock().await;
        let now = Utc::now();
        let mut session = self.load(id).await?;
        let expected = session.status();

        let run = self
            .with_rng_locked(|rng| session.run_to_winner(&self.engine, rng, now))
            .map_err(|e| rejected(id, "run_to_winner", e))?;

        self.store
            .save_session(SessionWrite::new(&session, expected).with_history(&run.history))
            .await?;

        if run.capped {
            warn!(auction_id = %id, rounds = run.rounds.len(), "Winner decided after hitting the round cap");
        }
        info!(auction_id = %id, winner = %run.winner_id, rounds = run.rounds.len(), "Winner decided");
        self.publish_status(&session, None).await;
        Ok(run)
    }

    // =========================================================================
    // Timer
    // =========================================================================

    pub async fn timer_state(&self, id: Uuid) -> AppResult<TimerState> {
        let session = self.load(id).await?;
        Ok(self.load_timer(&session, Utc::now()).await?.into_state())
    }

    /// Recompute the remaining time at `now`.
    ///
    /// The stopped timer is persisted when this tick is the one that expires it.
    pub async fn tick_timer(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<TimerState> {
        let _guard = self.write_lock.lock().await;
        let state = match self.store.load_timer(id).await? {
            Some(state) => state,
            None => {
                let session = self.load(id).await?;
                CountdownTimer::new(session.auction.duration_sec)?.into_state()
            }
        };

        let was_running = state.running;
        let timer = CountdownTimer::restore(state, now);
        if was_running && !timer.is_running() {
            self.store.save_timer(id, timer.state()).await?;
            info!(auction_id = %id, "Auction timer expired");
        }

        self.publish_timer(id, &timer).await;
        Ok(timer.into_state())
    }

    /// Tick the timer of the current auction while it is running
    pub async fn tick_current(&self, now: DateTime<Utc>) -> AppResult<Option<TimerState>> {
        match self.store.find_active_session().await? {
            Some(session) if session.status() == AuctionStatus::Running => {
                self.tick_timer(session.id(), now).await.map(Some)
            }
            _ => Ok(None),
        }
    }

    // =========================================================================
    // Lot library
    // =========================================================================

    pub async fn create_lot(&self, new_lot: NewLot) -> AppResult<Lot> {
        new_lot.validate().map_err(AppError::Validation)?;
        let lot = new_lot.into_lot(Utc::now());
        self.store.insert_lot(&lot).await?;

        info!(lot_id = %lot.id, title = %lot.title, category = lot.category.as_str(), "Lot created");
        self.publish_lot_change(None, LotChangeAction::Created, vec![lot.id]).await;
        Ok(lot)
    }

    pub async fn get_lot(&self, id: Uuid) -> AppResult<Lot> {
        self.store
            .find_lot(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Lot {} not found", id)))
    }

    pub async fn list_lots(&self, category: Option<LotCategory>) -> AppResult<Vec<Lot>> {
        Ok(self.store.list_lots(category).await?)
    }

    /// Record a donation of `amount` (at least 1)
    pub async fn increase_sum(&self, lot_id: Uuid, amount: i64) -> AppResult<Lot> {
        if amount < 1 {
            return Err(AuctionError::InvalidAmount(amount).into());
        }
        let lot = self.store.increase_lot_sum(lot_id, amount, Utc::now()).await?;
        info!(lot_id = %lot_id, amount, sum = lot.sum, "Donation recorded");
        self.publish_sum_change(&lot).await;
        Ok(lot)
    }

    /// Overwrite a lot's sum (at least 0)
    pub async fn set_sum(&self, lot_id: Uuid, sum: i64) -> AppResult<Lot> {
        if sum < 0 {
            return Err(AuctionError::InvalidAmount(sum).into());
        }
        let lot = self.store.set_lot_sum(lot_id, sum, Utc::now()).await?;
        info!(lot_id = %lot_id, sum, "Lot sum set");
        self.publish_sum_change(&lot).await;
        Ok(lot)
    }

    pub async fn history(&self, id: Uuid) -> AppResult<Vec<HistoryRecord>> {
        let session = self.load(id).await?;
        Ok(self.store.list_history(session.id()).await?)
    }

    // =========================================================================
    // Broadcasts
    // =========================================================================

    async fn publish_status(&self, session: &AuctionSession, previous: Option<AuctionStatus>) {
        self.ws
            .publish(WsMessage::AuctionStatus {
                auction_id: session.id(),
                status: session.status(),
                previous_status: previous,
                winner_lot_id: session.auction.winner_lot_id,
                timestamp: Utc::now().timestamp(),
            })
            .await;
    }

    async fn publish_timer(&self, auction_id: Uuid, timer: &CountdownTimer) {
        self.ws
            .publish(WsMessage::TimerTick {
                auction_id,
                left_ms: timer.left_ms(),
                running: timer.is_running(),
                display: timer.format_hms(),
            })
            .await;
    }

    async fn publish_lot_change(&self, auction_id: Option<Uuid>, action: LotChangeAction, lot_ids: Vec<Uuid>) {
        if lot_ids.is_empty() {
            return;
        }
        self.ws
            .publish(WsMessage::LotChange {
                auction_id,
                action,
                lot_ids,
            })
            .await;
    }

    async fn publish_sum_change(&self, lot: &Lot) {
        self.publish_lot_change(None, LotChangeAction::SumChanged, vec![lot.id])
            .await;

        match self.store.find_active_session().await {
            Ok(Some(session)) if session.contains(lot.id) => {
                self.publish_lot_change(Some(session.id()), LotChangeAction::SumChanged, vec![lot.id])
                    .await;
            }
            Ok(_) => {}
            Err(e) => warn!(lot_id = %lot.id, error = %e, "Could not resolve current auction for broadcast"),
        }
    }
}
