//! Unanimity detection for pairwise votes and magnitude scores.
//!
//! The functions in this module are pure: they look at a snapshot of the votes and at
//! the roster of eligible participants, and they never mutate anything. Locking the
//! result is the job of the ledger.

use log::debug;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::config::*;
use crate::matrix::PairKey;

/// The result of a consensus evaluation.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum Consensus<T> {
    Reached(T),
    /// Not reached yet. `voted` only counts the eligible participants.
    Pending { voted: usize, eligible: usize },
}

impl<T> Consensus<T> {
    pub fn is_reached(&self) -> bool {
        matches!(self, Consensus::Reached(_))
    }
}

/// The current state of the votes of a comparison, restricted to eligible participants.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct VoteTally {
    pub prefers_a: usize,
    pub prefers_b: usize,
    pub tie: usize,
    pub missing: usize,
}

impl VoteTally {
    pub fn voted(&self) -> usize {
        self.prefers_a + self.prefers_b + self.tie
    }

    pub fn eligible(&self) -> usize {
        self.voted() + self.missing
    }
}

// Consensus iff every eligible participant voted and all the votes are identical.
// Votes from participants outside the roster are ignored.
fn unanimous<V: Eq + Copy>(
    votes: &BTreeMap<ParticipantId, V>,
    eligible: &BTreeSet<ParticipantId>,
) -> Consensus<V> {
    let counted: Vec<V> = eligible
        .iter()
        .filter_map(|pid| votes.get(pid).copied())
        .collect();
    let pending = Consensus::Pending {
        voted: counted.len(),
        eligible: eligible.len(),
    };
    // An empty roster never agrees on anything.
    if eligible.is_empty() || counted.len() < eligible.len() {
        return pending;
    }
    match counted.split_first() {
        Some((first, rest)) if rest.iter().all(|v| v == first) => Consensus::Reached(*first),
        _ => pending,
    }
}

/// Decides whether a comparison reached consensus, and maps the agreed vote to an outcome.
pub fn evaluate_pairwise(
    pair: PairKey,
    votes: &BTreeMap<ParticipantId, VoteChoice>,
    eligible: &BTreeSet<ParticipantId>,
) -> Consensus<ComparisonOutcome> {
    let res = match unanimous(votes, eligible) {
        Consensus::Reached(VoteChoice::PrefersA) => {
            Consensus::Reached(ComparisonOutcome::Winner(pair.item_a()))
        }
        Consensus::Reached(VoteChoice::PrefersB) => {
            Consensus::Reached(ComparisonOutcome::Winner(pair.item_b()))
        }
        Consensus::Reached(VoteChoice::Tie) => Consensus::Reached(ComparisonOutcome::Tie),
        Consensus::Pending { voted, eligible } => Consensus::Pending { voted, eligible },
    };
    debug!("evaluate_pairwise: {:?}: {:?}", pair, res);
    res
}

/// Decides whether all the eligible participants gave the same magnitude.
pub fn evaluate_magnitude(
    scores: &BTreeMap<ParticipantId, Magnitude>,
    eligible: &BTreeSet<ParticipantId>,
) -> Consensus<Magnitude> {
    unanimous(scores, eligible)
}

pub fn tally(
    votes: &BTreeMap<ParticipantId, VoteChoice>,
    eligible: &BTreeSet<ParticipantId>,
) -> VoteTally {
    let mut t = VoteTally::default();
    for pid in eligible.iter() {
        match votes.get(pid) {
            Some(VoteChoice::PrefersA) => t.prefers_a += 1,
            Some(VoteChoice::PrefersB) => t.prefers_b += 1,
            Some(VoteChoice::Tie) => t.tie += 1,
            None => t.missing += 1,
        }
    }
    t
}
