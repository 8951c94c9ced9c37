//! The auction aggregate: one `Auction` plus its ordered lot list.
//!
//! Every mutation is validated up front and either fails leaving the session
//! untouched or succeeds and returns the history records that describe it.
//! Persisting those records is the caller's job.

use crate::error::{AuctionError, AuctionResult};
use crate::fsm;
use crate::models::history::{
    EVENT_AUCTION_WINNER, EVENT_LOTS_ADDED, EVENT_LOTS_REMOVED, EVENT_LOTS_REORDERED, EVENT_LOT_ELIMINATED,
    EVENT_LOT_REVEALED,
};
use crate::models::{
    Auction, AuctionEvent, AuctionSettings, AuctionStatus, Lot, LotOrder, NewHistoryRecord, SessionLot, SubMode,
};
use crate::selection::roulette::validate_spin_sec;
use crate::selection::{RoundOutcome, SelectionEngine};
use crate::timer::validate_duration;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use uuid::Uuid;

/// Reason attached to the implicit idle/configured flips
pub const REASON_LOTS_CHANGED: &str = "lots_changed";

/// History reason for lots eliminated when the round cap decides the field
pub const REASON_ROUND_CAP: &str = "round_cap";

/// A successful status change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub previous: AuctionStatus,
    pub new: AuctionStatus,
    pub at: DateTime<Utc>,
    pub reason: Option<String>,
}

impl StatusChange {
    pub fn to_history(&self, auction_id: Uuid) -> NewHistoryRecord {
        NewHistoryRecord::status_change(auction_id, self.previous, self.new, self.at, self.reason.as_deref())
    }
}

/// Result of `add_lots`
#[derive(Debug, Clone, PartialEq)]
pub struct LotsAdded {
    pub added: Vec<SessionLot>,
    pub status_change: Option<StatusChange>,
    pub history: Vec<NewHistoryRecord>,
}

/// Result of `remove_lots`
#[derive(Debug, Clone, PartialEq)]
pub struct LotsRemoved {
    pub removed: Vec<Uuid>,
    pub status_change: Option<StatusChange>,
    pub history: Vec<NewHistoryRecord>,
}

/// Result of one reveal
#[derive(Debug, Clone, PartialEq)]
pub struct PlayedRound {
    pub outcome: RoundOutcome,
    pub history: Vec<NewHistoryRecord>,
}

/// Result of playing a session to its winner in one go
#[derive(Debug, Clone, PartialEq)]
pub struct PlayedRun {
    pub winner_id: Uuid,
    pub rounds: Vec<RoundOutcome>,
    pub capped: bool,
    pub history: Vec<NewHistoryRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuctionSession {
    pub auction: Auction,
    lots: Vec<SessionLot>,
}

fn validate_settings(settings: &AuctionSettings) -> AuctionResult<()> {
    validate_duration(settings.duration_sec)?;
    validate_spin_sec(settings.spin_sec)?;
    Ok(())
}

impl AuctionSession {
    /// New idle session with no lots
    pub fn new(settings: AuctionSettings, now: DateTime<Utc>) -> AuctionResult<Self> {
        validate_settings(&settings)?;
        Ok(Self {
            auction: Auction::new(settings, now),
            lots: Vec::new(),
        })
    }

    /// Rebuild a session from stored parts; lots are sorted by order
    pub fn from_parts(auction: Auction, mut lots: Vec<SessionLot>) -> Self {
        lots.sort_by_key(|lot| lot.order);
        Self { auction, lots }
    }

    pub fn into_parts(self) -> (Auction, Vec<SessionLot>) {
        (self.auction, self.lots)
    }

    pub fn id(&self) -> Uuid {
        self.auction.id
    }

    pub fn status(&self) -> AuctionStatus {
        self.auction.status
    }

    /// Lots in display order
    pub fn lots(&self) -> &[SessionLot] {
        &self.lots
    }

    pub fn lot(&self, lot_id: Uuid) -> Option<&SessionLot> {
        self.lots.iter().find(|lot| lot.id() == lot_id)
    }

    pub fn contains(&self, lot_id: Uuid) -> bool {
        self.lot(lot_id).is_some()
    }

    /// Structural lot edits are allowed only while idle or configured
    pub fn can_mutate_lots(&self) -> bool {
        matches!(self.status(), AuctionStatus::Idle | AuctionStatus::Configured)
    }

    fn ensure_mutable(&self) -> AuctionResult<()> {
        if self.can_mutate_lots() {
            Ok(())
        } else {
            Err(AuctionError::StructuralEditRejected { status: self.status() })
        }
    }

    fn set_status(&mut self, new: AuctionStatus, at: DateTime<Utc>, reason: Option<&str>) -> StatusChange {
        let previous = self.auction.status;
        self.auction.status = new;
        StatusChange {
            previous,
            new,
            at,
            reason: reason.map(str::to_string),
        }
    }

    fn clear_run(&mut self) {
        self.auction.winner_lot_id = None;
        for lot in &mut self.lots {
            lot.eliminated = false;
        }
    }

    /// Apply an operator event.
    ///
    /// Entering `running` from anything but `paused` starts a new run:
    /// `started_at` is stamped and elimination flags and the winner are
    /// cleared. Entering `finished` stamps `finished_at`. A reset to `idle`
    /// also clears the previous run.
    pub fn apply_event(&mut self, event: AuctionEvent, now: DateTime<Utc>) -> AuctionResult<StatusChange> {
        let previous = self.status();
        let next = fsm::next_status(previous, event)?;

        match next {
            AuctionStatus::Running if previous != AuctionStatus::Paused => {
                self.auction.started_at = Some(now);
                self.auction.finished_at = None;
                self.clear_run();
            }
            AuctionStatus::Finished => {
                self.auction.finished_at = Some(now);
            }
            AuctionStatus::Idle => {
                self.auction.started_at = None;
                self.auction.finished_at = None;
                self.clear_run();
            }
            _ => {}
        }

        Ok(self.set_status(next, now, None))
    }

    /// Change mode, sub-mode, duration or spin length
    pub fn update_settings(&mut self, settings: AuctionSettings) -> AuctionResult<()> {
        self.ensure_mutable()?;
        validate_settings(&settings)?;
        self.auction.mode = settings.mode;
        self.auction.sub_mode = settings.sub_mode;
        self.auction.duration_sec = settings.duration_sec;
        self.auction.spin_sec = settings.spin_sec;
        Ok(())
    }

    fn max_order(&self) -> i32 {
        self.lots.iter().map(|lot| lot.order).max().unwrap_or(0)
    }

    /// Append lots after the current maximum order.
    ///
    /// Lots already in the session are skipped. An idle session that ends up
    /// with at least one lot becomes configured.
    pub fn add_lots(&mut self, lots: Vec<Lot>, now: DateTime<Utc>) -> AuctionResult<LotsAdded> {
        self.ensure_mutable()?;

        let mut seen = HashSet::new();
        let fresh: Vec<Lot> = lots
            .into_iter()
            .filter(|lot| !self.contains(lot.id) && seen.insert(lot.id))
            .collect();

        let max_order = self.max_order();
        let mut added = Vec::with_capacity(fresh.len());
        for (offset, lot) in (1..).zip(fresh) {
            let order = max_order
                .checked_add(offset)
                .ok_or(AuctionError::OrderOverflow(max_order))?;
            added.push(SessionLot::new(lot, order, now));
        }
        self.lots.extend(added.iter().cloned());

        let mut history = Vec::new();
        if !added.is_empty() {
            let ids: Vec<Uuid> = added.iter().map(|lot| lot.id()).collect();
            history.push(NewHistoryRecord::new(
                self.id(),
                EVENT_LOTS_ADDED,
                json!({ "lotIds": ids, "count": ids.len() }),
                now,
            ));
        }

        let status_change = if self.status() == AuctionStatus::Idle && !self.lots.is_empty() {
            let change = self.set_status(AuctionStatus::Configured, now, Some(REASON_LOTS_CHANGED));
            history.push(change.to_history(self.id()));
            Some(change)
        } else {
            None
        };

        Ok(LotsAdded {
            added,
            status_change,
            history,
        })
    }

    /// Remove lots without renumbering the rest.
    ///
    /// Ids not in the session are ignored. A configured session left empty
    /// falls back to idle.
    pub fn remove_lots(&mut self, lot_ids: &[Uuid], now: DateTime<Utc>) -> AuctionResult<LotsRemoved> {
        self.ensure_mutable()?;

        let requested: HashSet<Uuid> = lot_ids.iter().copied().collect();
        let mut removed = Vec::new();
        self.lots.retain(|lot| {
            if requested.contains(&lot.id()) {
                removed.push(lot.id());
                false
            } else {
                true
            }
        });

        let mut history = Vec::new();
        if !removed.is_empty() {
            history.push(NewHistoryRecord::new(
                self.id(),
                EVENT_LOTS_REMOVED,
                json!({ "lotIds": removed, "count": removed.len() }),
                now,
            ));
        }

        let status_change = if self.status() == AuctionStatus::Configured && self.lots.is_empty() {
            let change = self.set_status(AuctionStatus::Idle, now, Some(REASON_LOTS_CHANGED));
            history.push(change.to_history(self.id()));
            Some(change)
        } else {
            None
        };

        Ok(LotsRemoved {
            removed,
            status_change,
            history,
        })
    }

    /// Assign new orders atomically.
    ///
    /// Every id must be in the session and the resulting orders must be
    /// unique across the whole list; otherwise nothing changes.
    pub fn reorder(&mut self, orders: &[LotOrder], now: DateTime<Utc>) -> AuctionResult<NewHistoryRecord> {
        self.ensure_mutable()?;

        let mut lots = self.lots.clone();
        for requested in orders {
            let lot = lots
                .iter_mut()
                .find(|lot| lot.id() == requested.lot_id)
                .ok_or(AuctionError::UnknownLot(requested.lot_id))?;
            lot.order = requested.order;
        }

        let mut seen = HashSet::new();
        for lot in &lots {
            if !seen.insert(lot.order) {
                return Err(AuctionError::DuplicateOrder(lot.order));
            }
        }

        lots.sort_by_key(|lot| lot.order);
        self.lots = lots;

        Ok(NewHistoryRecord::new(
            self.id(),
            EVENT_LOTS_REORDERED,
            json!({ "lotOrders": orders }),
            now,
        ))
    }

    /// Lots still in play
    pub fn eligible_lots(&self) -> Vec<&SessionLot> {
        self.lots.iter().filter(|lot| !lot.eliminated).collect()
    }

    pub fn winner(&self) -> Option<&SessionLot> {
        self.auction.winner_lot_id.and_then(|id| self.lot(id))
    }

    fn ensure_selectable(&self) -> AuctionResult<()> {
        if self.status() == AuctionStatus::Running && self.auction.winner_lot_id.is_none() {
            Ok(())
        } else {
            Err(AuctionError::SelectionUnavailable { status: self.status() })
        }
    }

    fn round_history(&self, outcome: &RoundOutcome, now: DateTime<Utc>) -> Vec<NewHistoryRecord> {
        let mut history = vec![NewHistoryRecord::new(
            self.id(),
            EVENT_LOT_REVEALED,
            json!({ "lotId": outcome.revealed_id, "remaining": outcome.remaining }),
            now,
        )];

        if outcome.eliminated {
            history.push(NewHistoryRecord::new(
                self.id(),
                EVENT_LOT_ELIMINATED,
                json!({
                    "lotId": outcome.revealed_id,
                    "probability": outcome.elimination_probability,
                }),
                now,
            ));
        }

        if let Some(winner_id) = outcome.winner_id {
            history.push(self.winner_history(winner_id, now));
        }

        history
    }

    fn winner_history(&self, winner_id: Uuid, now: DateTime<Utc>) -> NewHistoryRecord {
        let (title, sum) = self
            .lot(winner_id)
            .map(|lot| (lot.lot.title.clone(), lot.sum()))
            .unwrap_or_default();
        NewHistoryRecord::new(
            self.id(),
            EVENT_AUCTION_WINNER,
            json!({ "lotId": winner_id, "title": title, "sum": sum }),
            now,
        )
    }

    /// Reveal one lot according to the session's sub-mode.
    ///
    /// Instant sessions decide the winner with a single pick. Elimination
    /// sessions play one round.
    pub fn play_round<R: Rng>(
        &mut self,
        engine: &SelectionEngine,
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> AuctionResult<PlayedRound> {
        self.ensure_selectable()?;

        let outcome = match self.auction.sub_mode {
            SubMode::Instant => {
                let winner_id = engine.pick_instant(&self.lots, rng)?;
                RoundOutcome {
                    revealed_id: winner_id,
                    eliminated: false,
                    winner_id: Some(winner_id),
                    elimination_probability: 0.0,
                    remaining: self.eligible_lots().len(),
                }
            }
            SubMode::Elimination => engine.eliminate_round(&mut self.lots, rng)?,
        };

        if let Some(winner_id) = outcome.winner_id {
            self.auction.winner_lot_id = Some(winner_id);
        }

        let history = self.round_history(&outcome, now);
        Ok(PlayedRound { outcome, history })
    }

    /// Play until a winner is decided
    pub fn run_to_winner<R: Rng>(
        &mut self,
        engine: &SelectionEngine,
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> AuctionResult<PlayedRun> {
        self.ensure_selectable()?;

        if self.auction.sub_mode == SubMode::Instant {
            let played = self.play_round(engine, rng, now)?;
            let winner_id = played.outcome.winner_id.ok_or(AuctionError::NoEligibleLots)?;
            return Ok(PlayedRun {
                winner_id,
                rounds: vec![played.outcome],
                capped: false,
                history: played.history,
            });
        }

        let summary = engine.run_elimination(&mut self.lots, rng)?;
        self.auction.winner_lot_id = Some(summary.winner_id);

        let mut history: Vec<NewHistoryRecord> = summary
            .rounds
            .iter()
            .flat_map(|round| self.round_history(round, now))
            .collect();
        if summary.capped {
            history.extend(summary.cap_eliminated.iter().map(|&lot_id| {
                NewHistoryRecord::new(
                    self.id(),
                    EVENT_LOT_ELIMINATED,
                    json!({ "lotId": lot_id, "reason": REASON_ROUND_CAP }),
                    now,
                )
            }));
            history.push(self.winner_history(summary.winner_id, now));
        }

        Ok(PlayedRun {
            winner_id: summary.winner_id,
            rounds: summary.rounds,
            capped: summary.capped,
            history,
        })
    }
}
