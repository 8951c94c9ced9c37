use crate::error::{AuctionError, AuctionResult};
use rand::Rng;

/// Elimination probability of a lot with no donations
pub const BASE_ELIMINATION_PROBABILITY: f64 = 0.5;
/// How quickly donations lower the elimination probability
pub const SUM_SENSITIVITY: f64 = 0.01;
pub const MIN_ELIMINATION_PROBABILITY: f64 = 0.02;
pub const MAX_ELIMINATION_PROBABILITY: f64 = 0.6;

/// `clamp(base / (1 + k * sum), 0.02, 0.6)`
///
/// Negative sums are treated as zero.
pub fn elimination_probability_with(sum: i64, base: f64, k: f64) -> f64 {
    let sum = sum.max(0) as f64;
    (base / (1.0 + k * sum)).clamp(MIN_ELIMINATION_PROBABILITY, MAX_ELIMINATION_PROBABILITY)
}

pub fn elimination_probability(sum: i64) -> f64 {
    elimination_probability_with(sum, BASE_ELIMINATION_PROBABILITY, SUM_SENSITIVITY)
}

/// Weight used when picking which lot to reveal or crown
pub fn selection_weight(sum: i64) -> f64 {
    1.0 - elimination_probability(sum)
}

/// Pick one candidate with probability proportional to `weight`.
///
/// Draws `r` uniformly in `[0, total)` and walks the list subtracting weights
/// until `r <= 0`. Candidates with non-positive weight are never chosen unless
/// every weight is non-positive. If rounding leaves `r > 0` after the walk the
/// last positively weighted candidate is returned.
pub fn weighted_pick<'a, T, R, F>(candidates: &'a [T], mut weight: F, rng: &mut R) -> AuctionResult<&'a T>
where
    R: Rng,
    F: FnMut(&T) -> f64,
{
    let last = candidates.last().ok_or(AuctionError::NoEligibleLots)?;

    let weights: Vec<f64> = candidates
        .iter()
        .map(|c| {
            let w = weight(c);
            if w.is_finite() && w > 0.0 {
                w
            } else {
                0.0
            }
        })
        .collect();
    let total: f64 = weights.iter().sum();

    if total <= 0.0 {
        return Ok(last);
    }

    let mut r = rng.random::<f64>() * total;
    let mut fallback = last;
    for (candidate, &w) in candidates.iter().zip(&weights) {
        if w <= 0.0 {
            continue;
        }
        fallback = candidate;
        r -= w;
        if r <= 0.0 {
            return Ok(candidate);
        }
    }

    Ok(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_probability_at_zero_sum() {
        assert!((elimination_probability(0) - 0.5).abs() < 1e-12);
        assert!((selection_weight(0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_probability_is_monotone_and_clamped() {
        let mut previous = f64::INFINITY;
        for sum in (0..20_000).step_by(7).chain([1_000_000, i64::MAX]) {
            let p = elimination_probability(sum);
            assert!(p <= previous, "not monotone at sum={}", sum);
            assert!((MIN_ELIMINATION_PROBABILITY..=MAX_ELIMINATION_PROBABILITY).contains(&p));
            previous = p;
        }
        assert_eq!(elimination_probability(1_000_000), MIN_ELIMINATION_PROBABILITY);
    }

    #[test]
    fn test_upper_clamp_applies_to_large_base() {
        assert_eq!(elimination_probability_with(0, 0.9, SUM_SENSITIVITY), MAX_ELIMINATION_PROBABILITY);
    }

    #[test]
    fn test_negative_sum_treated_as_zero() {
        assert_eq!(elimination_probability(-50), elimination_probability(0));
    }

    #[test]
    fn test_weighted_pick_empty() {
        let mut rng = StdRng::seed_from_u64(1);
        let empty: [u32; 0] = [];
        assert_eq!(
            weighted_pick(&empty, |_| 1.0, &mut rng),
            Err(AuctionError::NoEligibleLots)
        );
    }

    #[test]
    fn test_weighted_pick_skips_zero_weights() {
        let mut rng = StdRng::seed_from_u64(2);
        let items = [0u32, 1, 2];
        for _ in 0..1_000 {
            let picked = weighted_pick(&items, |&i| if i == 1 { 1.0 } else { 0.0 }, &mut rng).unwrap();
            assert_eq!(*picked, 1);
        }
    }

    #[test]
    fn test_weighted_pick_all_zero_falls_back_to_last() {
        let mut rng = StdRng::seed_from_u64(3);
        let items = ['a', 'b', 'c'];
        assert_eq!(*weighted_pick(&items, |_| 0.0, &mut rng).unwrap(), 'c');
        assert_eq!(*weighted_pick(&items, |_| f64::NAN, &mut rng).unwrap(), 'c');
    }

    #[test]
    fn test_equal_weights_are_uniform() {
        // chi-square over 10k draws, 3 degrees of freedom, critical value at p=0.001
        let mut rng = StdRng::seed_from_u64(42);
        let items = [0usize, 1, 2, 3];
        let mut counts = [0u32; 4];
        let draws = 10_000;
        for _ in 0..draws {
            counts[*weighted_pick(&items, |_| 0.5, &mut rng).unwrap()] += 1;
        }
        let expected = draws as f64 / 4.0;
        let chi_square: f64 = counts
            .iter()
            .map(|&c| (c as f64 - expected).powi(2) / expected)
            .sum();
        assert!(chi_square < 16.27, "chi-square {} counts {:?}", chi_square, counts);
    }

    #[test]
    fn test_heavier_weight_wins_more_often() {
        let mut rng = StdRng::seed_from_u64(9);
        let sums = [0i64, 1_000];
        let mut wins = [0u32; 2];
        for _ in 0..5_000 {
            let picked = weighted_pick(&[0usize, 1], |&i| selection_weight(sums[i]), &mut rng).unwrap();
            wins[*picked] += 1;
        }
        assert!(wins[1] > wins[0]);
    }
}
