use super::weighting::{
    elimination_probability_with, weighted_pick, BASE_ELIMINATION_PROBABILITY, SUM_SENSITIVITY,
};
use crate::error::{AuctionError, AuctionResult};
use crate::models::{SessionLot, SubMode};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

/// Safety cap on elimination rounds; never reached in practice
pub const MAX_ELIMINATION_ROUNDS: u32 = 10_000;

/// Result of revealing one lot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundOutcome {
    pub revealed_id: Uuid,
    pub eliminated: bool,
    pub winner_id: Option<Uuid>,
    /// Probability used for the elimination roll (0 for instant picks)
    pub elimination_probability: f64,
    /// Non-eliminated lots left after the round
    pub remaining: usize,
}

/// Every round of a complete elimination run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EliminationSummary {
    pub winner_id: Uuid,
    pub rounds: Vec<RoundOutcome>,
    /// The round cap was hit and the remaining field was decided by one pick
    pub capped: bool,
    /// Lots eliminated by the capping pick, in lot order
    pub cap_eliminated: Vec<Uuid>,
}

/// Weighted winner selection and elimination.
///
/// The engine holds only parameters; randomness is passed in so callers can
/// seed it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionEngine {
    pub base_probability: f64,
    pub sensitivity: f64,
    pub max_rounds: u32,
}

impl Default for SelectionEngine {
    fn default() -> Self {
        Self {
            base_probability: BASE_ELIMINATION_PROBABILITY,
            sensitivity: SUM_SENSITIVITY,
            max_rounds: MAX_ELIMINATION_ROUNDS,
        }
    }
}

fn eligible_indices(lots: &[SessionLot]) -> Vec<usize> {
    lots.iter()
        .enumerate()
        .filter(|(_, lot)| !lot.eliminated)
        .map(|(i, _)| i)
        .collect()
}

impl SelectionEngine {
    pub fn with_max_rounds(max_rounds: u32) -> Self {
        Self {
            max_rounds: max_rounds.max(1),
            ..Self::default()
        }
    }

    pub fn elimination_probability(&self, sum: i64) -> f64 {
        elimination_probability_with(sum, self.base_probability, self.sensitivity)
    }

    pub fn selection_weight(&self, sum: i64) -> f64 {
        1.0 - self.elimination_probability(sum)
    }

    /// One weighted pick over the non-eliminated lots
    pub fn pick_instant<R: Rng>(&self, lots: &[SessionLot], rng: &mut R) -> AuctionResult<Uuid> {
        let eligible = eligible_indices(lots);
        let &idx = weighted_pick(&eligible, |&i| self.selection_weight(lots[i].sum()), rng)?;
        Ok(lots[idx].id())
    }

    /// One elimination round.
    ///
    /// A lot is picked by selection weight and then survives or is eliminated
    /// by its elimination probability. When a single eligible lot is left it
    /// is declared the winner without a roll.
    pub fn eliminate_round<R: Rng>(&self, lots: &mut [SessionLot], rng: &mut R) -> AuctionResult<RoundOutcome> {
        let eligible = eligible_indices(lots);

        if let [only] = eligible.as_slice() {
            let id = lots[*only].id();
            return Ok(RoundOutcome {
                revealed_id: id,
                eliminated: false,
                winner_id: Some(id),
                elimination_probability: 0.0,
                remaining: 1,
            });
        }

        let &idx = {
            let lots = &*lots;
            weighted_pick(&eligible, |&i| self.selection_weight(lots[i].sum()), rng)?
        };

        let probability = self.elimination_probability(lots[idx].sum());
        let eliminated = rng.random::<f64>() < probability;
        if eliminated {
            lots[idx].eliminated = true;
        }

        let remaining: Vec<usize> = eligible.into_iter().filter(|&i| !lots[i].eliminated).collect();
        let winner_id = match remaining.as_slice() {
            [last] if eliminated => Some(lots[*last].id()),
            _ => None,
        };

        debug!(
            lot_id = %lots[idx].id(),
            eliminated,
            probability,
            remaining = remaining.len(),
            "elimination round"
        );

        Ok(RoundOutcome {
            revealed_id: lots[idx].id(),
            eliminated,
            winner_id,
            elimination_probability: probability,
            remaining: remaining.len(),
        })
    }

    /// Play elimination rounds until one lot remains
    pub fn run_elimination<R: Rng>(&self, lots: &mut [SessionLot], rng: &mut R) -> AuctionResult<EliminationSummary> {
        if eligible_indices(lots).is_empty() {
            return Err(AuctionError::NoEligibleLots);
        }

        let mut rounds = Vec::new();
        for _ in 0..self.max_rounds {
            let outcome = self.eliminate_round(lots, rng)?;
            let winner = outcome.winner_id;
            rounds.push(outcome);
            if let Some(winner_id) = winner {
                return Ok(EliminationSummary {
                    winner_id,
                    rounds,
                    capped: false,
                    cap_eliminated: Vec::new(),
                });
            }
        }

        warn!(
            max_rounds = self.max_rounds,
            "elimination round cap reached, deciding remaining lots with a single pick"
        );
        let winner_id = self.pick_instant(lots, rng)?;
        let mut cap_eliminated = Vec::new();
        for lot in lots.iter_mut() {
            if lot.id() != winner_id && !lot.eliminated {
                lot.eliminated = true;
                cap_eliminated.push(lot.id());
            }
        }

        Ok(EliminationSummary {
            winner_id,
            rounds,
            capped: true,
            cap_eliminated,
        })
    }

    /// Decide the winner according to `sub_mode`.
    ///
    /// Elimination mode marks the losing lots as eliminated.
    pub fn pick_winner<R: Rng>(&self, lots: &mut [SessionLot], sub_mode: SubMode, rng: &mut R) -> AuctionResult<Uuid> {
        match sub_mode {
            SubMode::Instant => self.pick_instant(lots, rng),
            SubMode::Elimination => self.run_elimination(lots, rng).map(|summary| summary.winner_id),
        }
    }
}
