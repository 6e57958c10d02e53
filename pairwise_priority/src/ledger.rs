//! Vote and magnitude storage.
//!
//! Every comparison and every (item, criterion) pair lives in its own cell behind its own
//! mutex. Submitting a vote locks only the cell it targets: the upsert and the consensus
//! re-evaluation happen under that lock, against a consistent copy of the vote set.
//! The map of cells is behind a read-write lock that is only written to when cells are
//! added or removed.

use log::{debug, info};
use parking_lot::{Mutex, RwLock};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use crate::config::*;
use crate::consensus::{evaluate_magnitude, evaluate_pairwise, tally, Consensus, VoteTally};
use crate::matrix::{PairKey, PendingComparison};

/// The stored state of one comparison.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonRecord {
    pub id: ComparisonId,
    pub criterion: Criterion,
    pub session: SessionId,
    pub pair: PairKey,
    pub votes: BTreeMap<ParticipantId, VoteChoice>,
    /// Set once consensus is reached. Only a reset clears it.
    pub outcome: Option<ComparisonOutcome>,
}

impl ComparisonRecord {
    pub fn is_locked(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn tally(&self, eligible: &BTreeSet<ParticipantId>) -> VoteTally {
        tally(&self.votes, eligible)
    }
}

/// The stored state of the magnitude scores of one item for one criterion.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct MagnitudeRecord {
    pub item: ItemId,
    pub criterion: Criterion,
    pub scores: BTreeMap<ParticipantId, Magnitude>,
    pub consensus: Option<Magnitude>,
}

impl MagnitudeRecord {
    pub fn is_locked(&self) -> bool {
        self.consensus.is_some()
    }
}

// A map of independently locked cells.
struct Cells<K, R> {
    cells: RwLock<BTreeMap<K, Arc<Mutex<R>>>>,
}

impl<K: Ord + Copy, R: Clone> Cells<K, R> {
    fn new() -> Self {
        Cells {
            cells: RwLock::new(BTreeMap::new()),
        }
    }

    fn get(&self, key: &K) -> Option<Arc<Mutex<R>>> {
        self.cells.read().get(key).cloned()
    }

    fn insert(&self, key: K, record: R) {
        self.cells.write().insert(key, Arc::new(Mutex::new(record)));
    }

    fn remove_where(&self, pred: impl Fn(&K) -> bool) -> usize {
        let mut cells = self.cells.write();
        let before = cells.len();
        cells.retain(|k, _| !pred(k));
        before - cells.len()
    }

    fn keys(&self) -> Vec<K> {
        self.cells.read().keys().cloned().collect()
    }

    // Each record is copied under its own lock.
    fn snapshot(&self) -> Vec<R> {
        let cells: Vec<Arc<Mutex<R>>> = self.cells.read().values().cloned().collect();
        cells.iter().map(|c| c.lock().clone()).collect()
    }

    fn clear(&self) {
        self.cells.write().clear();
    }
}

struct PairIndex {
    by_pair: HashMap<(Criterion, PairKey), ComparisonId>,
    next_id: u32,
}

/// Stores the comparisons of a project and one vote per participant on each of them.
pub struct VoteLedger {
    index: RwLock<PairIndex>,
    cells: Cells<ComparisonId, ComparisonRecord>,
}

impl Default for VoteLedger {
    fn default() -> Self {
        VoteLedger::new()
    }
}

impl VoteLedger {
    pub fn new() -> VoteLedger {
        VoteLedger {
            index: RwLock::new(PairIndex {
                by_pair: HashMap::new(),
                next_id: 1,
            }),
            cells: Cells::new(),
        }
    }

    /// Registers the comparisons that do not exist yet for their criterion.
    /// Returns the identifiers of the newly created comparisons.
    pub fn register(&self, pending: &[PendingComparison]) -> Vec<ComparisonId> {
        let mut index = self.index.write();
        let mut created: Vec<ComparisonId> = Vec::new();
        for pc in pending.iter() {
            let key = (pc.criterion, pc.pair);
            if index.by_pair.contains_key(&key) {
                continue;
            }
            let id = ComparisonId(index.next_id);
            index.next_id += 1;
            index.by_pair.insert(key, id);
            self.cells.insert(
                id,
                ComparisonRecord {
                    id,
                    criterion: pc.criterion,
                    session: pc.session,
                    pair: pc.pair,
                    votes: BTreeMap::new(),
                    outcome: None,
                },
            );
            created.push(id);
        }
        debug!("register: created {} comparisons", created.len());
        created
    }

    /// Restores previously saved comparisons, replacing the current content.
    ///
    /// New comparisons get identifiers from `next_id` on, or after the highest restored
    /// identifier if that is larger.
    pub fn restore(&self, records: Vec<ComparisonRecord>, next_id: u32) {
        let mut index = self.index.write();
        index.by_pair.clear();
        self.cells.clear();
        let mut max_id = 0;
        for r in records {
            max_id = max_id.max(r.id.0);
            index.by_pair.insert((r.criterion, r.pair), r.id);
            self.cells.insert(r.id, r);
        }
        index.next_id = next_id.max(max_id + 1);
    }

    /// The identifier the next registered comparison will get.
    pub fn next_id(&self) -> u32 {
        self.index.read().next_id
    }

    pub fn find(&self, criterion: Criterion, pair: PairKey) -> Option<ComparisonId> {
        self.index.read().by_pair.get(&(criterion, pair)).cloned()
    }

    pub fn ids(&self) -> Vec<ComparisonId> {
        self.cells.keys()
    }

    fn cell(&self, id: ComparisonId) -> PriorityResult<Arc<Mutex<ComparisonRecord>>> {
        match self.cells.get(&id) {
            Some(c) => Ok(c),
            None => UnknownComparisonSnafu { comparison: id }.fail(),
        }
    }

    pub fn get(&self, id: ComparisonId) -> PriorityResult<ComparisonRecord> {
        Ok(self.cell(id)?.lock().clone())
    }

    pub fn snapshot(&self) -> Vec<ComparisonRecord> {
        self.cells.snapshot()
    }

    /// Records (or overwrites) a vote, then re-evaluates the comparison.
    ///
    /// A `Reached` result means the comparison was locked by this very call.
    pub fn submit(
        &self,
        id: ComparisonId,
        participant: ParticipantId,
        choice: VoteChoice,
        eligible: &BTreeSet<ParticipantId>,
    ) -> PriorityResult<Consensus<ComparisonOutcome>> {
        let cell = self.cell(id)?;
        let mut record = cell.lock();
        if record.is_locked() {
            return ComparisonLockedSnafu { comparison: id }.fail();
        }
        record.votes.insert(participant, choice);
        debug!("submit: {} {} -> {:?}", id, participant, choice);
        let res = evaluate_pairwise(record.pair, &record.votes, eligible);
        if let Consensus::Reached(outcome) = res {
            info!("{} ({}) locked: {:?}", id, record.criterion, outcome);
            record.outcome = Some(outcome);
        }
        Ok(res)
    }

    /// Re-evaluates an open comparison, for example after the roster changed.
    /// Returns the outcome if the comparison got locked by this call.
    pub fn reevaluate(
        &self,
        id: ComparisonId,
        eligible: &BTreeSet<ParticipantId>,
    ) -> PriorityResult<Option<ComparisonOutcome>> {
        let cell = self.cell(id)?;
        let mut record = cell.lock();
        if record.is_locked() {
            return Ok(None);
        }
        match evaluate_pairwise(record.pair, &record.votes, eligible) {
            Consensus::Reached(outcome) => {
                info!("{} ({}) locked on re-evaluation: {:?}", id, record.criterion, outcome);
                record.outcome = Some(outcome);
                Ok(Some(outcome))
            }
            Consensus::Pending { .. } => Ok(None),
        }
    }

    /// Clears both the lock and all the votes of a comparison.
    pub fn reset(&self, id: ComparisonId) -> PriorityResult<ComparisonRecord> {
        let cell = self.cell(id)?;
        let mut record = cell.lock();
        record.votes.clear();
        record.outcome = None;
        info!("{} reset", id);
        Ok(record.clone())
    }

    pub fn move_to(&self, id: ComparisonId, session: SessionId) -> PriorityResult<()> {
        let cell = self.cell(id)?;
        cell.lock().session = session;
        Ok(())
    }

    /// Drops all the comparisons that involve this item.
    pub fn remove_item(&self, item: ItemId) -> usize {
        let mut index = self.index.write();
        let removed: BTreeSet<ComparisonId> = index
            .by_pair
            .iter()
            .filter(|((_, pair), _)| pair.contains(item))
            .map(|(_, id)| *id)
            .collect();
        index.by_pair.retain(|_, id| !removed.contains(id));
        self.cells.remove_where(|id| removed.contains(id))
    }
}

/// Stores the magnitude scores of every (item, criterion) pair.
pub struct MagnitudeLedger {
    cells: Cells<(ItemId, Criterion), MagnitudeRecord>,
}

impl Default for MagnitudeLedger {
    fn default() -> Self {
        MagnitudeLedger::new()
    }
}

impl MagnitudeLedger {
    pub fn new() -> MagnitudeLedger {
        MagnitudeLedger {
            cells: Cells::new(),
        }
    }

    /// Opens the score sets of an item for both criteria.
    pub fn open_item(&self, item: ItemId) {
        for criterion in Criterion::ALL {
            if self.cells.get(&(item, criterion)).is_none() {
                self.cells.insert(
                    (item, criterion),
                    MagnitudeRecord {
                        item,
                        criterion,
                        scores: BTreeMap::new(),
                        consensus: None,
                    },
                );
            }
        }
    }

    pub fn restore(&self, records: Vec<MagnitudeRecord>) {
        self.cells.clear();
        for r in records {
            self.cells.insert((r.item, r.criterion), r);
        }
    }

    pub fn remove_item(&self, item: ItemId) -> usize {
        self.cells.remove_where(|(i, _)| *i == item)
    }

    pub fn keys(&self) -> Vec<(ItemId, Criterion)> {
        self.cells.keys()
    }

    fn cell(
        &self,
        item: ItemId,
        criterion: Criterion,
    ) -> PriorityResult<Arc<Mutex<MagnitudeRecord>>> {
        match self.cells.get(&(item, criterion)) {
            Some(c) => Ok(c),
            None => UnknownItemSnafu { item }.fail(),
        }
    }

    pub fn get(&self, item: ItemId, criterion: Criterion) -> PriorityResult<MagnitudeRecord> {
        Ok(self.cell(item, criterion)?.lock().clone())
    }

    pub fn snapshot(&self) -> Vec<MagnitudeRecord> {
        self.cells.snapshot()
    }

    /// Records (or overwrites) a score, then re-evaluates the consensus for this item.
    ///
    /// A `Reached` result means the consensus was locked by this very call.
    pub fn submit(
        &self,
        item: ItemId,
        criterion: Criterion,
        participant: ParticipantId,
        value: Magnitude,
        eligible: &BTreeSet<ParticipantId>,
    ) -> PriorityResult<Consensus<Magnitude>> {
        let cell = self.cell(item, criterion)?;
        let mut record = cell.lock();
        if record.is_locked() {
            return MagnitudeLockedSnafu { item, criterion }.fail();
        }
        record.scores.insert(participant, value);
        debug!("submit: {} {} {} -> {}", item, criterion, participant, value);
        let res = evaluate_magnitude(&record.scores, eligible);
        if let Consensus::Reached(m) = res {
            info!("{} ({}) magnitude locked: {}", item, criterion, m);
            record.consensus = Some(m);
        }
        Ok(res)
    }

    pub fn reevaluate(
        &self,
        item: ItemId,
        criterion: Criterion,
        eligible: &BTreeSet<ParticipantId>,
    ) -> PriorityResult<Option<Magnitude>> {
        let cell = self.cell(item, criterion)?;
        let mut record = cell.lock();
        if record.is_locked() {
            return Ok(None);
        }
        match evaluate_magnitude(&record.scores, eligible) {
            Consensus::Reached(m) => {
                info!("{} ({}) magnitude locked on re-evaluation: {}", item, criterion, m);
                record.consensus = Some(m);
                Ok(Some(m))
            }
            Consensus::Pending { .. } => Ok(None),
        }
    }

    pub fn reset(&self, item: ItemId, criterion: Criterion) -> PriorityResult<()> {
        let cell = self.cell(item, criterion)?;
        let mut record = cell.lock();
        record.scores.clear();
        record.consensus = None;
        info!("{} ({}) magnitude reset", item, criterion);
        Ok(())
    }
}
