use log::{debug, info, warn};

use std::cmp::Ordering;

use crate::config::*;

/// Everything needed to score one item.
#[derive(PartialEq, Debug, Clone)]
pub struct PriorityInput {
    pub item: ItemId,
    pub title: String,
    pub value_weight: f64,
    pub complexity_weight: f64,
    pub value_magnitude: Magnitude,
    pub complexity_magnitude: Magnitude,
}

fn normalized_title(title: &str) -> String {
    title.trim().to_lowercase()
}

// Descending score, then descending value magnitude, then ascending complexity magnitude,
// then ascending title. Unscored items come after all the scored ones.
// The identifier is the last resort so that the order is total.
fn rank_order(x: &ItemPriority, y: &ItemPriority) -> Ordering {
    let by_score = match (x.final_score, y.final_score) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_score
        .then_with(|| y.value_magnitude.cmp(&x.value_magnitude))
        .then_with(|| x.complexity_magnitude.cmp(&y.complexity_magnitude))
        .then_with(|| normalized_title(&x.title).cmp(&normalized_title(&y.title)))
        .then_with(|| x.item.cmp(&y.item))
}

fn score_item(input: &PriorityInput, rules: &ScoringRules) -> PriorityResult<ItemPriority> {
    let weighted_value = input.value_magnitude.value() as f64 * input.value_weight;
    let weighted_complexity = input.complexity_magnitude.value() as f64 * input.complexity_weight;
    let final_score = if weighted_complexity == 0.0 {
        match rules.degenerate_complexity {
            DegenerateComplexityMode::Fail => {
                return DegenerateComplexitySnafu { item: input.item }.fail();
            }
            DegenerateComplexityMode::RankLast => {
                warn!(
                    "score_item: {} ({}) has no complexity weight, ranking it last",
                    input.item, input.title
                );
                None
            }
        }
    } else {
        Some(weighted_value / weighted_complexity)
    };
    Ok(ItemPriority {
        item: input.item,
        title: input.title.clone(),
        value_weight: input.value_weight,
        complexity_weight: input.complexity_weight,
        value_magnitude: input.value_magnitude,
        complexity_magnitude: input.complexity_magnitude,
        weighted_value,
        weighted_complexity,
        final_score,
        rank: 0,
    })
}

/// Scores and ranks all the items.
///
/// The calculation is all or nothing: the first failing item aborts it and no partial
/// report is produced.
pub fn calculate_priorities(
    inputs: &[PriorityInput],
    rules: &ScoringRules,
    generation: u64,
) -> PriorityResult<PriorityReport> {
    let mut results: Vec<ItemPriority> = inputs
        .iter()
        .map(|i| score_item(i, rules))
        .collect::<PriorityResult<Vec<ItemPriority>>>()?;
    results.sort_by(rank_order);
    for (idx, r) in results.iter_mut().enumerate() {
        r.rank = (idx + 1) as u32;
        debug!(
            "calculate_priorities: rank {}: {} {:?}",
            r.rank, r.title, r.final_score
        );
    }
    info!(
        "Calculated priorities of {} items (generation {})",
        results.len(),
        generation
    );
    Ok(PriorityReport {
        generation,
        results,
    })
}
