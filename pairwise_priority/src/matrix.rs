use log::debug;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::config::*;

/// An unordered pair of distinct items.
///
/// The pair is normalized at construction: `item_a` is always the smaller identifier,
/// so (A, B) and (B, A) build the same key.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct PairKey {
    item_a: ItemId,
    item_b: ItemId,
}

impl PairKey {
    /// Returns None if both items are the same.
    pub fn new(x: ItemId, y: ItemId) -> Option<PairKey> {
        match x.cmp(&y) {
            std::cmp::Ordering::Less => Some(PairKey {
                item_a: x,
                item_b: y,
            }),
            std::cmp::Ordering::Greater => Some(PairKey {
                item_a: y,
                item_b: x,
            }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn item_a(&self) -> ItemId {
        self.item_a
    }

    pub fn item_b(&self) -> ItemId {
        self.item_b
    }

    pub fn contains(&self, item: ItemId) -> bool {
        self.item_a == item || self.item_b == item
    }
}

/// A comparison that still has to be registered: empty vote set, no lock.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub struct PendingComparison {
    pub criterion: Criterion,
    pub session: SessionId,
    pub pair: PairKey,
}

/// The number of comparisons needed for `n` items.
pub fn pair_count(n: usize) -> usize {
    if n < 2 {
        0
    } else {
        n * (n - 1) / 2
    }
}

/// Builds the complete set of unordered pairs for one criterion.
///
/// Duplicated identifiers in the input are ignored. The output is sorted by pair, so
/// it does not depend on the order of the input.
pub fn generate_matrix(
    items: &[ItemId],
    criterion: Criterion,
    session: SessionId,
) -> PriorityResult<Vec<PendingComparison>> {
    let distinct: BTreeSet<ItemId> = items.iter().cloned().collect();
    if distinct.len() < 2 {
        return InsufficientItemsSnafu {
            count: distinct.len(),
        }
        .fail();
    }
    let sorted: Vec<ItemId> = distinct.into_iter().collect();
    let mut res: Vec<PendingComparison> = Vec::with_capacity(pair_count(sorted.len()));
    for (idx, x) in sorted.iter().enumerate() {
        for y in sorted[idx + 1..].iter() {
            if let Some(pair) = PairKey::new(*x, *y) {
                res.push(PendingComparison {
                    criterion,
                    session,
                    pair,
                });
            }
        }
    }
    debug!(
        "generate_matrix: {} items -> {} {} comparisons",
        sorted.len(),
        res.len(),
        criterion
    );
    Ok(res)
}
