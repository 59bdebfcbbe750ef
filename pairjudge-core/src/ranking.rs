/// Current ranking with a normal-approximation interval per item.
///
/// Pure function: no IO, no state.
use crate::constants::RANKING_INTERVAL_Z;
use crate::types::{Item, RankedItem};

/// Rank items by `mu` descending. Ties go to the lower id so output is stable.
///
/// Bounds are `mu ± 1.96 * sqrt(sigma_sq)`.
pub fn rank_items(items: &[Item]) -> Vec<RankedItem> {
    let mut results: Vec<RankedItem> = items
        .iter()
        .map(|item| {
            let half_width = RANKING_INTERVAL_Z * item.sigma_sq.max(0.0).sqrt();
            RankedItem {
                id: item.id.clone(),
                mu: item.mu,
                lower_bound: item.mu - half_width,
                upper_bound: item.mu + half_width,
                comparison_count: item.comparison_count,
            }
        })
        .collect();

    results.sort_by(|a, b| {
        b.mu.partial_cmp(&a.mu)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Rating;

    #[test]
    fn test_rank_order_and_bounds() {
        let mut strong = Item::new("strong", Rating::new(1600.0, 100.0));
        strong.comparison_count = 3;
        let items = vec![
            Item::new("weak", Rating::new(1400.0, 400.0)),
            strong,
            Item::new("mid", Rating::new(1500.0, 0.0)),
        ];

        let ranked = rank_items(&items);
        let ids: Vec<&str> = ranked.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["strong", "mid", "weak"]);

        assert!((ranked[0].lower_bound - (1600.0 - 19.6)).abs() < 1e-9);
        assert!((ranked[0].upper_bound - (1600.0 + 19.6)).abs() < 1e-9);
        assert_eq!(ranked[0].comparison_count, 3);
        assert_eq!(ranked[1].lower_bound, ranked[1].upper_bound);
    }

    #[test]
    fn test_ties_break_by_id() {
        let items = vec![
            Item::new("b", Rating::new(1500.0, 1.0)),
            Item::new("a", Rating::new(1500.0, 1.0)),
        ];
        let ranked = rank_items(&items);
        assert_eq!(ranked[0].id, "a");
    }
}
