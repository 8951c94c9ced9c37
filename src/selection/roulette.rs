use super::engine::SelectionEngine;
use crate::error::{AuctionError, AuctionResult};
use crate::models::SessionLot;
use rand::seq::{IndexedRandom, SliceRandom};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MIN_SPIN_SEC: u32 = 1;
pub const MAX_SPIN_SEC: u32 = 30;

/// Strip slots per unit of selection weight
const SLOTS_PER_WEIGHT: f64 = 10.0;

pub fn validate_spin_sec(spin_sec: u32) -> AuctionResult<u32> {
    if (MIN_SPIN_SEC..=MAX_SPIN_SEC).contains(&spin_sec) {
        Ok(spin_sec)
    } else {
        Err(AuctionError::SpinDurationOutOfRange(spin_sec))
    }
}

/// Number of strip slots a lot occupies: `ceil(weight * 10)`, at least one
pub fn slot_count(weight: f64) -> usize {
    ((weight * SLOTS_PER_WEIGHT).ceil() as usize).max(1)
}

/// Expanded and shuffled strip of non-eliminated lot ids. Cosmetic only.
pub fn roulette_items<R: Rng>(engine: &SelectionEngine, lots: &[SessionLot], rng: &mut R) -> Vec<Uuid> {
    let mut items: Vec<Uuid> = lots
        .iter()
        .filter(|lot| !lot.eliminated)
        .flat_map(|lot| std::iter::repeat(lot.id()).take(slot_count(engine.selection_weight(lot.sum()))))
        .collect();
    items.shuffle(rng);
    items
}

/// A spin animation that lands on a result the engine already decided
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpinPlan {
    pub items: Vec<Uuid>,
    pub target_index: usize,
    pub outcome_id: Uuid,
    pub spin_sec: u32,
}

/// Place the precomputed `outcome_id` under the pointer.
///
/// The landing slot is any slot of `items` holding `outcome_id`; the strip
/// never chooses its own outcome.
pub fn plan_spin<R: Rng>(items: Vec<Uuid>, outcome_id: Uuid, spin_sec: u32, rng: &mut R) -> AuctionResult<SpinPlan> {
    let spin_sec = validate_spin_sec(spin_sec)?;
    let slots: Vec<usize> = items
        .iter()
        .enumerate()
        .filter(|(_, id)| **id == outcome_id)
        .map(|(i, _)| i)
        .collect();

    let target_index = *slots
        .choose(rng)
        .ok_or(AuctionError::UnknownLot(outcome_id))?;

    Ok(SpinPlan {
        items,
        target_index,
        outcome_id,
        spin_sec,
    })
}

/// Roulette presentation state shown to the overlay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouletteState {
    pub spin_sec: u32,
    pub spinning: bool,
    pub items: Vec<Uuid>,
}

impl RouletteState {
    pub fn new(spin_sec: u32) -> AuctionResult<Self> {
        Ok(Self {
            spin_sec: validate_spin_sec(spin_sec)?,
            spinning: false,
            items: Vec::new(),
        })
    }

    pub fn begin_spin(&mut self, plan: &SpinPlan) {
        self.items = plan.items.clone();
        self.spinning = true;
    }

    pub fn finish_spin(&mut self) {
        self.spinning = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LotCategory, NewLot};
    use chrono::Utc;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn lot(sum: i64, order: i32) -> SessionLot {
        let now = Utc::now();
        SessionLot::new(NewLot::new("Lot", LotCategory::Movies).with_sum(sum).into_lot(now), order, now)
    }

    #[test]
    fn test_slot_count() {
        assert_eq!(slot_count(0.5), 5);
        assert_eq!(slot_count(0.98), 10);
        assert_eq!(slot_count(0.41), 5);
        assert_eq!(slot_count(0.0), 1);
    }

    #[test]
    fn test_items_repeat_by_weight_and_skip_eliminated() {
        let engine = SelectionEngine::default();
        let mut rng = StdRng::seed_from_u64(4);
        let mut lots = vec![lot(0, 1), lot(100_000, 2), lot(0, 3)];
        lots[2].eliminated = true;

        let items = roulette_items(&engine, &lots, &mut rng);
        assert_eq!(items.iter().filter(|id| **id == lots[0].id()).count(), 5);
        assert_eq!(items.iter().filter(|id| **id == lots[1].id()).count(), 10);
        assert!(!items.contains(&lots[2].id()));
    }

    #[test]
    fn test_plan_lands_on_outcome() {
        let engine = SelectionEngine::default();
        let mut rng = StdRng::seed_from_u64(12);
        let lots = vec![lot(10, 1), lot(20, 2), lot(30, 3)];

        for target in &lots {
            let items = roulette_items(&engine, &lots, &mut rng);
            let plan = plan_spin(items, target.id(), 5, &mut rng).unwrap();
            assert_eq!(plan.items[plan.target_index], target.id());
        }
    }

    #[test]
    fn test_plan_rejects_missing_outcome_and_bad_duration() {
        let mut rng = StdRng::seed_from_u64(1);
        let id = Uuid::new_v4();
        assert_eq!(plan_spin(vec![], id, 5, &mut rng), Err(AuctionError::UnknownLot(id)));
        assert_eq!(
            plan_spin(vec![id], id, 31, &mut rng),
            Err(AuctionError::SpinDurationOutOfRange(31))
        );
    }

    #[test]
    fn test_roulette_state_spin_cycle() {
        let mut state = RouletteState::new(3).unwrap();
        assert!(RouletteState::new(0).is_err());

        let id = Uuid::new_v4();
        let plan = SpinPlan {
            items: vec![id, id],
            target_index: 1,
            outcome_id: id,
            spin_sec: 3,
        };
        state.begin_spin(&plan);
        assert!(state.spinning);
        assert_eq!(state.items.len(), 2);
        state.finish_spin();
        assert!(!state.spinning);
    }
}
