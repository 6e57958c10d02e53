//! Read-only completion view.
//!
//! Nothing here is stored: the progress is recomputed from the ledgers on every query.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::config::*;
use crate::ledger::{ComparisonRecord, MagnitudeRecord};
use crate::matrix::pair_count;

#[derive(Eq, PartialEq, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PhaseProgress {
    pub completed: usize,
    pub total: usize,
}

impl PhaseProgress {
    /// An empty phase is never complete.
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.completed >= self.total
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriterionProgress {
    pub criterion: Criterion,
    pub pairwise: PhaseProgress,
    pub magnitude: PhaseProgress,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub criteria: Vec<CriterionProgress>,
    pub ready_to_calculate: bool,
}

impl Progress {
    pub fn criterion(&self, criterion: Criterion) -> Option<&CriterionProgress> {
        self.criteria.iter().find(|c| c.criterion == criterion)
    }

    /// The phases that block a calculation.
    pub fn missing(&self) -> Vec<MissingPhase> {
        let mut res: Vec<MissingPhase> = Vec::new();
        for cp in self.criteria.iter() {
            for (phase, pp) in [
                (Phase::Pairwise, cp.pairwise),
                (Phase::Magnitude, cp.magnitude),
            ] {
                if !pp.is_complete() {
                    res.push(MissingPhase {
                        criterion: cp.criterion,
                        phase,
                        completed: pp.completed,
                        total: pp.total,
                    });
                }
            }
        }
        res
    }
}

/// Computes the progress of a project.
///
/// The pairwise total is the size of the full matrix for the current items, so a
/// matrix that was never generated counts as incomplete.
pub fn compute_progress(
    items: &BTreeSet<ItemId>,
    comparisons: &[ComparisonRecord],
    magnitudes: &[MagnitudeRecord],
) -> Progress {
    let criteria: Vec<CriterionProgress> = Criterion::ALL
        .iter()
        .map(|criterion| {
            let locked_pairs = comparisons
                .iter()
                .filter(|c| {
                    c.criterion == *criterion
                        && c.is_locked()
                        && items.contains(&c.pair.item_a())
                        && items.contains(&c.pair.item_b())
                })
                .count();
            let locked_magnitudes = magnitudes
                .iter()
                .filter(|m| m.criterion == *criterion && m.is_locked() && items.contains(&m.item))
                .count();
            CriterionProgress {
                criterion: *criterion,
                pairwise: PhaseProgress {
                    completed: locked_pairs,
                    total: pair_count(items.len()),
                },
                magnitude: PhaseProgress {
                    completed: locked_magnitudes,
                    total: items.len(),
                },
            }
        })
        .collect();
    let ready_to_calculate = criteria
        .iter()
        .all(|c| c.pairwise.is_complete() && c.magnitude.is_complete());
    Progress {
        criteria,
        ready_to_calculate,
    }
}

/// Locked versus registered comparisons of one session, per criterion.
pub fn session_progress(
    session: SessionId,
    comparisons: &[ComparisonRecord],
) -> Vec<(Criterion, PhaseProgress)> {
    Criterion::ALL
        .iter()
        .map(|criterion| {
            let in_session: Vec<&ComparisonRecord> = comparisons
                .iter()
                .filter(|c| c.session == session && c.criterion == *criterion)
                .collect();
            (
                *criterion,
                PhaseProgress {
                    completed: in_session.iter().filter(|c| c.is_locked()).count(),
                    total: in_session.len(),
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::PairKey;
    use std::collections::BTreeMap;

    fn comparison(id: u32, criterion: Criterion, x: u32, y: u32, locked: bool) -> ComparisonRecord {
        ComparisonRecord {
            id: ComparisonId(id),
            criterion,
            session: SessionId::DEFAULT,
            pair: PairKey::new(ItemId(x), ItemId(y)).unwrap(),
            votes: BTreeMap::new(),
            outcome: if locked {
                Some(ComparisonOutcome::Tie)
            } else {
                None
            },
        }
    }

    fn magnitude(item: u32, criterion: Criterion, value: Option<u32>) -> MagnitudeRecord {
        MagnitudeRecord {
            item: ItemId(item),
            criterion,
            scores: BTreeMap::new(),
            consensus: value.map(|v| Magnitude::new(v).unwrap()),
        }
    }

    fn items(n: u32) -> BTreeSet<ItemId> {
        (1..=n).map(ItemId).collect()
    }

    fn full(locked_value_pairs: bool) -> (Vec<ComparisonRecord>, Vec<MagnitudeRecord>) {
        let mut cs = Vec::new();
        let mut id = 0;
        for criterion in Criterion::ALL {
            for (x, y) in [(1, 2), (1, 3), (2, 3)] {
                id += 1;
                let locked = criterion == Criterion::Complexity || locked_value_pairs;
                cs.push(comparison(id, criterion, x, y, locked));
            }
        }
        let mut ms = Vec::new();
        for criterion in Criterion::ALL {
            for i in 1..=3 {
                ms.push(magnitude(i, criterion, Some(5)));
            }
        }
        (cs, ms)
    }

    #[test]
    fn ready_when_everything_is_locked() {
        let (cs, ms) = full(true);
        let p = compute_progress(&items(3), &cs, &ms);
        assert!(p.ready_to_calculate);
        assert!(p.missing().is_empty());
        let v = p.criterion(Criterion::Value).unwrap();
        assert_eq!(v.pairwise, PhaseProgress { completed: 3, total: 3 });
        assert_eq!(v.magnitude, PhaseProgress { completed: 3, total: 3 });
    }

    #[test]
    fn open_comparisons_block_calculation() {
        let (cs, ms) = full(false);
        let p = compute_progress(&items(3), &cs, &ms);
        assert!(!p.ready_to_calculate);
        assert_eq!(
            p.missing(),
            vec![MissingPhase {
                criterion: Criterion::Value,
                phase: Phase::Pairwise,
                completed: 0,
                total: 3
            }]
        );
    }

    #[test]
    fn new_item_reopens_progress() {
        let (cs, mut ms) = full(true);
        ms.push(magnitude(4, Criterion::Value, None));
        ms.push(magnitude(4, Criterion::Complexity, None));
        let p = compute_progress(&items(4), &cs, &ms);
        assert!(!p.ready_to_calculate);
        let v = p.criterion(Criterion::Value).unwrap();
        assert_eq!(v.pairwise, PhaseProgress { completed: 3, total: 6 });
        assert_eq!(v.magnitude, PhaseProgress { completed: 3, total: 4 });
    }

    #[test]
    fn empty_project_is_not_ready() {
        let p = compute_progress(&items(0), &[], &[]);
        assert!(!p.ready_to_calculate);
        assert_eq!(p.missing().len(), 4);
    }

    #[test]
    fn progress_per_session() {
        let mut cs = vec![
            comparison(1, Criterion::Value, 1, 2, true),
            comparison(2, Criterion::Value, 1, 3, false),
            comparison(3, Criterion::Complexity, 1, 2, true),
        ];
        cs[1].session = SessionId(2);
        let s1 = session_progress(SessionId::DEFAULT, &cs);
        assert_eq!(
            s1,
            vec![
                (Criterion::Value, PhaseProgress { completed: 1, total: 1 }),
                (Criterion::Complexity, PhaseProgress { completed: 1, total: 1 }),
            ]
        );
        let s2 = session_progress(SessionId(2), &cs);
        assert_eq!(s2[0], (Criterion::Value, PhaseProgress { completed: 0, total: 1 }));
    }
}
