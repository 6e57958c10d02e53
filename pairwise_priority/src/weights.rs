use log::debug;

use std::collections::BTreeMap;

use crate::config::*;
use crate::ledger::ComparisonRecord;
use crate::matrix::PairKey;

/// A comparison whose outcome is decided.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct LockedComparison {
    pub pair: PairKey,
    pub outcome: ComparisonOutcome,
}

/// Extracts the locked comparisons of one criterion.
pub fn locked_comparisons(
    criterion: Criterion,
    records: &[ComparisonRecord],
) -> Vec<LockedComparison> {
    records
        .iter()
        .filter(|r| r.criterion == criterion)
        .filter_map(|r| {
            r.outcome.map(|outcome| LockedComparison {
                pair: r.pair,
                outcome,
            })
        })
        .collect()
}

// Points are counted in halves so that ties stay exact: a win is 2, a tie is 1.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
struct WinCount {
    half_points: u64,
    total: u64,
}

impl WinCount {
    fn weight(&self) -> f64 {
        self.half_points as f64 / (2 * self.total) as f64
    }
}

/// Computes the win-count weight of every item, in [0, 1].
///
/// The caller must only call this once all the comparisons of the criterion are locked.
/// Comparisons that involve an item outside of `items` are ignored. An item that is
/// part of no comparison is an error.
pub fn win_count_weights(
    criterion: Criterion,
    items: &[ItemId],
    comparisons: &[LockedComparison],
) -> PriorityResult<BTreeMap<ItemId, f64>> {
    let mut counts: BTreeMap<ItemId, WinCount> =
        items.iter().map(|i| (*i, WinCount::default())).collect();
    for c in comparisons.iter() {
        let (a, b) = (c.pair.item_a(), c.pair.item_b());
        if !(counts.contains_key(&a) && counts.contains_key(&b)) {
            continue;
        }
        for item in [a, b] {
            if let Some(wc) = counts.get_mut(&item) {
                wc.total += 1;
                wc.half_points += match c.outcome {
                    ComparisonOutcome::Tie => 1,
                    ComparisonOutcome::Winner(w) if w == item => 2,
                    ComparisonOutcome::Winner(_) => 0,
                };
            }
        }
    }

    let mut res: BTreeMap<ItemId, f64> = BTreeMap::new();
    for (item, wc) in counts.iter() {
        if wc.total == 0 {
            return NoComparisonsSnafu {
                item: *item,
                criterion,
            }
            .fail();
        }
        res.insert(*item, wc.weight());
    }
    debug!("win_count_weights: {}: {:?}", criterion, res);
    Ok(res)
}
