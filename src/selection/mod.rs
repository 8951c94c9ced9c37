//! Weighted random selection and elimination of lots.

pub mod engine;
pub mod roulette;
pub mod weighting;

pub use engine::{EliminationSummary, RoundOutcome, SelectionEngine, MAX_ELIMINATION_ROUNDS};
pub use roulette::{plan_spin, roulette_items, RouletteState, SpinPlan, MAX_SPIN_SEC, MIN_SPIN_SEC};
pub use weighting::{elimination_probability, selection_weight, weighted_pick};
