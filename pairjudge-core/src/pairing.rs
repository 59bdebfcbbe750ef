/// Adaptive pair selection.
///
/// Scores every unordered, not-yet-shown pair by expected information gain and
/// picks the best. Selection is deterministic; presentation order (which item
/// goes left) is randomized separately by `orient_for_presentation`.
use std::collections::HashSet;

use rand::Rng;

use crate::error::{EngineError, Result};
use crate::types::{Pair, PairKey, RatedItem};

/// Information gain of judging two items against each other.
///
/// Largest when the items are close in rating and/or highly uncertain.
/// Returns `None` when the combined variance is zero: nothing left to learn.
pub fn calculate_info_gain(a: &RatedItem, b: &RatedItem) -> Option<f64> {
    let s = a.sigma_sq + b.sigma_sq;
    if s == 0.0 {
        return None;
    }
    let diff = a.mu - b.mu;
    Some(s * (-(diff * diff) / (2.0 * s)).exp())
}

/// Pick the most informative pair not in `excluded`.
///
/// `Ok(None)` means every pair was excluded or fully converged; the judge has
/// nothing useful left to compare. Ties go to the first pair in lexicographic
/// id order, and the returned pair is `(lower id, higher id)`.
pub fn select_next_pair(
    candidates: &[RatedItem],
    excluded: &HashSet<PairKey>,
) -> Result<Option<Pair>> {
    if candidates.len() < 2 {
        return Err(EngineError::InsufficientCandidates {
            found: candidates.len(),
        });
    }

    let mut sorted: Vec<&RatedItem> = candidates.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let mut best: Option<(usize, usize, f64)> = None;

    for i in 0..sorted.len() {
        for j in (i + 1)..sorted.len() {
            let (a, b) = (sorted[i], sorted[j]);
            if a.id == b.id || excluded.contains(&PairKey::new(&a.id, &b.id)) {
                continue;
            }
            let Some(gain) = calculate_info_gain(a, b) else {
                continue;
            };
            match best {
                Some((_, _, best_gain)) if gain <= best_gain => {}
                _ => best = Some((i, j, gain)),
            }
        }
    }

    Ok(best.map(|(i, j, _)| Pair::new(sorted[i].id.clone(), sorted[j].id.clone())))
}

/// Randomly assign left/right to counter position bias.
pub fn orient_for_presentation(pair: Pair, rng: &mut impl Rng) -> Pair {
    if rng.random::<f64>() < 0.5 {
        pair
    } else {
        Pair::new(pair.right, pair.left)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Rating;

    fn item(id: &str, mu: f64, sigma_sq: f64) -> RatedItem {
        RatedItem::new(id, Rating::new(mu, sigma_sq))
    }

    fn all_keys(items: &[RatedItem]) -> HashSet<PairKey> {
        let mut keys = HashSet::new();
        for a in items {
            for b in items {
                if a.id != b.id {
                    keys.insert(PairKey::new(&a.id, &b.id));
                }
            }
        }
        keys
    }

    #[test]
    fn test_info_gain_equal_ratings() {
        let gain = calculate_info_gain(&item("a", 1500.0, 10.0), &item("b", 1500.0, 10.0));
        assert_eq!(gain, Some(20.0));
    }

    #[test]
    fn test_info_gain_prefers_close_ratings() {
        let near = calculate_info_gain(&item("a", 1500.0, 100.0), &item("b", 1510.0, 100.0)).unwrap();
        let far = calculate_info_gain(&item("a", 1500.0, 100.0), &item("c", 1600.0, 100.0)).unwrap();
        assert!(near > far);
    }

    #[test]
    fn test_info_gain_converged_pair_is_skipped() {
        assert_eq!(calculate_info_gain(&item("a", 1500.0, 0.0), &item("b", 1400.0, 0.0)), None);
    }

    #[test]
    fn test_three_fresh_items_tie_break_by_id() {
        let items = vec![
            item("c", 1500.0, 350_000.0),
            item("a", 1500.0, 350_000.0),
            item("b", 1500.0, 350_000.0),
        ];
        let pair = select_next_pair(&items, &HashSet::new()).unwrap();
        assert_eq!(pair, Some(Pair::new("a", "b")));
    }

    #[test]
    fn test_picks_closest_pair() {
        let items = vec![
            item("a", 1400.0, 1000.0),
            item("b", 1600.0, 1000.0),
            item("c", 1605.0, 1000.0),
        ];
        let pair = select_next_pair(&items, &HashSet::new()).unwrap().unwrap();
        assert_eq!(pair, Pair::new("b", "c"));
    }

    #[test]
    fn test_never_returns_excluded_pair() {
        let items: Vec<RatedItem> = (0..6)
            .map(|i| item(&format!("item-{i}"), 1500.0 + (i as f64) * 13.0, 1000.0 * (i as f64 + 1.0)))
            .collect();

        let mut excluded = HashSet::new();
        // Exclude in reversed order to check the key is order independent.
        while let Some(pair) = select_next_pair(&items, &excluded).unwrap() {
            assert!(!excluded.contains(&PairKey::new(&pair.left, &pair.right)));
            assert!(!excluded.contains(&PairKey::new(&pair.right, &pair.left)));
            excluded.insert(PairKey::new(&pair.right, &pair.left));
        }
        assert_eq!(excluded.len(), 15); // C(6, 2)
    }

    #[test]
    fn test_none_when_all_pairs_excluded() {
        let items = vec![
            item("a", 1500.0, 10.0),
            item("b", 1500.0, 10.0),
            item("c", 1500.0, 10.0),
        ];
        let excluded = all_keys(&items);
        assert_eq!(select_next_pair(&items, &excluded).unwrap(), None);
    }

    #[test]
    fn test_none_when_everything_converged() {
        let items = vec![item("a", 1500.0, 0.0), item("b", 1400.0, 0.0)];
        assert_eq!(select_next_pair(&items, &HashSet::new()).unwrap(), None);
    }

    #[test]
    fn test_insufficient_candidates() {
        let items = vec![item("a", 1500.0, 10.0)];
        assert_eq!(
            select_next_pair(&items, &HashSet::new()),
            Err(EngineError::InsufficientCandidates { found: 1 })
        );
    }

    #[test]
    fn test_orientation_keeps_both_items() {
        let mut rng = rand::rng();
        for _ in 0..20 {
            let oriented = orient_for_presentation(Pair::new("a", "b"), &mut rng);
            assert_eq!(oriented.key(), PairKey::new("a", "b"));
        }
    }
}
