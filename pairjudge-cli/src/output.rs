/// Output formatting: terminal table and JSON.
use anyhow::Result;
use pairjudge_core::{Comparison, RankedItem, RatingUpdate};
use serde::Serialize;

#[derive(Serialize)]
struct JsonRankedItem<'a> {
    rank: usize,
    #[serde(flatten)]
    item: &'a RankedItem,
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    items: Vec<JsonRankedItem<'a>>,
    reliability: f64,
    total_comparisons: usize,
}

/// Print the ranking as a formatted terminal table.
pub fn print_table(rankings: &[RankedItem], reliability: f64, total_comparisons: usize) {
    let name_width = rankings
        .iter()
        .map(|r| r.id.len())
        .max()
        .unwrap_or(4)
        .max(4); // at least "Item"

    println!(" # | {:<name_width$} |      Mu | 95% CI Low | 95% CI High | Comparisons", "Item");
    println!("---|-{}-|---------|------------|-------------|------------", "-".repeat(name_width));

    for (i, r) in rankings.iter().enumerate() {
        println!(
            "{:>2} | {:<name_width$} | {:>7.1} | {:>10.1} | {:>11.1} | {:>11}",
            i + 1,
            r.id,
            r.mu,
            r.lower_bound,
            r.upper_bound,
            r.comparison_count,
        );
    }

    println!(
        "\n{} items ranked from {} judgments (reliability {:.3})",
        rankings.len(),
        total_comparisons,
        reliability,
    );
}

/// Print the ranking as JSON.
pub fn print_json(rankings: &[RankedItem], reliability: f64, total_comparisons: usize) -> Result<()> {
    let items = rankings
        .iter()
        .enumerate()
        .map(|(i, item)| JsonRankedItem { rank: i + 1, item })
        .collect();

    let output = JsonOutput {
        items,
        reliability,
        total_comparisons,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

pub fn print_comparison(comparison: &Comparison, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(comparison)?);
        return Ok(());
    }
    println!(
        "Comparison {} (session {}, #{})",
        comparison.id,
        comparison.session_id,
        comparison.position + 1
    );
    println!("  left:  {}", comparison.left_item_id);
    println!("  right: {}", comparison.right_item_id);
    Ok(())
}

pub fn print_update(winner_id: &str, loser_id: &str, update: &RatingUpdate) {
    println!(
        "{winner_id}: {:.1} (expected {:.0}%)",
        update.winner.mu,
        update.expected_winner * 100.0
    );
    println!(
        "{loser_id}: {:.1} (expected {:.0}%)",
        update.loser.mu,
        update.expected_loser * 100.0
    );
}
