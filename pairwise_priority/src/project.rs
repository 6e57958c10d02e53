//! The engine of one project.
//!
//! Locking discipline, always acquired in this order:
//! 1. `gate`: shared by vote and score submissions, exclusive for structural changes
//!    (items, participants, matrix generation, resets) and for the calculation snapshot.
//! 2. `roster`: items, participants and sessions.
//! 3. the ledger cell of the comparison or (item, criterion) being touched.
//!
//! Submissions on different keys only share read locks, so they do not serialize
//! against each other. Events are published after all the guards are released.

use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use snafu::OptionExt;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::adapters::{LogSink, RosterAuthorizer};
use crate::config::*;
use crate::consensus::{Consensus, VoteTally};
use crate::events::DomainEvent;
use crate::ledger::{ComparisonRecord, MagnitudeLedger, MagnitudeRecord, VoteLedger};
use crate::matrix::{generate_matrix, PairKey};
use crate::ports::{Authorizer, EventSink, ProjectSnapshot, ProjectStore};
use crate::priority::{calculate_priorities, PriorityInput};
use crate::progress::{compute_progress, session_progress, PhaseProgress, Progress};
use crate::weights::{locked_comparisons, win_count_weights};

/// One comparison and how it was decided, for exports.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonProvenance {
    pub comparison: ComparisonId,
    pub criterion: Criterion,
    pub session: SessionId,
    pub item_a: ItemId,
    pub item_b: ItemId,
    pub outcome: Option<ComparisonOutcome>,
    pub votes: usize,
}

struct Roster {
    items: BTreeMap<ItemId, Item>,
    participants: BTreeMap<ParticipantId, Participant>,
    sessions: BTreeSet<SessionId>,
    next_item: u32,
    next_participant: u32,
}

impl Roster {
    fn new() -> Roster {
        Roster {
            items: BTreeMap::new(),
            participants: BTreeMap::new(),
            sessions: [SessionId::DEFAULT].into_iter().collect(),
            next_item: 1,
            next_participant: 1,
        }
    }

    fn eligible(&self) -> BTreeSet<ParticipantId> {
        self.participants.keys().cloned().collect()
    }

    fn item_ids(&self) -> BTreeSet<ItemId> {
        self.items.keys().cloned().collect()
    }

    fn participant(&self, participant: ParticipantId) -> PriorityResult<&Participant> {
        self.participants
            .get(&participant)
            .context(UnknownParticipantSnafu { participant })
    }

    fn check_session(&self, session: SessionId) -> PriorityResult<()> {
        if self.sessions.contains(&session) {
            Ok(())
        } else {
            UnknownSessionSnafu { session }.fail()
        }
    }

    // Titles are unique, ignoring case and surrounding spaces.
    fn check_title(&self, title: &str, except: Option<ItemId>) -> PriorityResult<()> {
        let norm = title.trim().to_lowercase();
        let clash = self
            .items
            .values()
            .any(|i| Some(i.id) != except && i.title.trim().to_lowercase() == norm);
        if clash {
            DuplicateTitleSnafu { title }.fail()
        } else {
            Ok(())
        }
    }
}

pub struct Project {
    id: ProjectId,
    name: String,
    rules: ScoringRules,
    roster: RwLock<Roster>,
    votes: VoteLedger,
    magnitudes: MagnitudeLedger,
    gate: RwLock<()>,
    calculation: Mutex<()>,
    generation: AtomicU64,
    report: RwLock<Option<Arc<PriorityReport>>>,
    sink: Arc<dyn EventSink>,
    authorizer: Arc<dyn Authorizer>,
}

fn locked_event(
    project: &ProjectId,
    record: &ComparisonRecord,
    outcome: ComparisonOutcome,
) -> DomainEvent {
    DomainEvent::ComparisonLocked {
        project: project.clone(),
        comparison: record.id,
        criterion: record.criterion,
        item_a: record.pair.item_a(),
        item_b: record.pair.item_b(),
        winner: outcome.winner(),
        is_tie: outcome.is_tie(),
    }
}

// Removed items and participants may still appear in the votes and scores.
fn highest_item(snapshot: &ProjectSnapshot) -> u32 {
    let items = snapshot.items.iter().map(|i| i.id);
    let pairs = snapshot
        .comparisons
        .iter()
        .flat_map(|c| [c.pair.item_a(), c.pair.item_b()]);
    let scored = snapshot.magnitudes.iter().map(|m| m.item);
    items.chain(pairs).chain(scored).map(|i| i.0).max().unwrap_or(0)
}

fn highest_participant(snapshot: &ProjectSnapshot) -> u32 {
    let registered = snapshot.participants.iter().map(|p| p.id);
    let voters = snapshot
        .comparisons
        .iter()
        .flat_map(|c| c.votes.keys().cloned());
    let scorers = snapshot
        .magnitudes
        .iter()
        .flat_map(|m| m.scores.keys().cloned());
    registered
        .chain(voters)
        .chain(scorers)
        .map(|p| p.0)
        .max()
        .unwrap_or(0)
}

impl Project {
    /// An empty project, logging its events and using the roster for authorization.
    pub fn new(id: ProjectId, name: &str) -> Project {
        Project {
            id,
            name: name.to_string(),
            rules: ScoringRules::DEFAULT_RULES,
            roster: RwLock::new(Roster::new()),
            votes: VoteLedger::new(),
            magnitudes: MagnitudeLedger::new(),
            gate: RwLock::new(()),
            calculation: Mutex::new(()),
            generation: AtomicU64::new(0),
            report: RwLock::new(None),
            sink: Arc::new(LogSink),
            authorizer: Arc::new(RosterAuthorizer),
        }
    }

    pub fn with_rules(mut self, rules: &ScoringRules) -> Project {
        self.rules = rules.clone();
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Project {
        self.sink = sink;
        self
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Project {
        self.authorizer = authorizer;
        self
    }

    pub fn id(&self) -> &ProjectId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rules(&self) -> &ScoringRules {
        &self.rules
    }

    /// Changes every time the inputs of a calculation change.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn bump(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn publish(&self, events: Vec<DomainEvent>) {
        for e in events.iter() {
            self.sink.publish(e);
        }
    }

    fn publish_progress(&self) {
        let progress = self.progress();
        self.publish(vec![DomainEvent::ProgressChanged {
            project: self.id.clone(),
            progress,
        }]);
    }

    fn check_submitter(&self, roster: &Roster, participant: ParticipantId) -> PriorityResult<()> {
        let p = roster.participant(participant)?;
        if self.authorizer.may_submit(&self.id, p) {
            Ok(())
        } else {
            UnauthorizedSnafu {
                participant,
                operation: "submit votes",
            }
            .fail()
        }
    }

    fn check_admin(
        &self,
        roster: &Roster,
        participant: ParticipantId,
        operation: &str,
    ) -> PriorityResult<()> {
        let p = roster.participant(participant)?;
        if self.authorizer.may_administer(&self.id, p) {
            Ok(())
        } else {
            warn!("{} tried to {} without permission", participant, operation);
            UnauthorizedSnafu {
                participant,
                operation,
            }
            .fail()
        }
    }

    // ******** Items, participants and sessions ********

    pub fn add_item(
        &self,
        title: &str,
        description: &str,
        acceptance_notes: &str,
    ) -> PriorityResult<ItemId> {
        let id = {
            let _gate = self.gate.write();
            let mut roster = self.roster.write();
            roster.check_title(title, None)?;
            let id = ItemId(roster.next_item);
            roster.next_item += 1;
            roster.items.insert(
                id,
                Item {
                    id,
                    title: title.to_string(),
                    description: description.to_string(),
                    acceptance_notes: acceptance_notes.to_string(),
                },
            );
            self.magnitudes.open_item(id);
            self.bump();
            id
        };
        info!("Added {}: {}", id, title);
        self.publish_progress();
        Ok(id)
    }

    /// Edits the text of an item. Votes and scores are kept.
    pub fn update_item(
        &self,
        item: ItemId,
        title: &str,
        description: &str,
        acceptance_notes: &str,
    ) -> PriorityResult<()> {
        let _gate = self.gate.write();
        let mut roster = self.roster.write();
        roster.check_title(title, Some(item))?;
        let it = roster.items.get_mut(&item).context(UnknownItemSnafu { item })?;
        it.title = title.to_string();
        it.description = description.to_string();
        it.acceptance_notes = acceptance_notes.to_string();
        // The title takes part in the ranking tie-break.
        self.bump();
        Ok(())
    }

    /// Removes an item, with all its comparisons and magnitude scores.
    pub fn remove_item(&self, item: ItemId) -> PriorityResult<Item> {
        let removed = {
            let _gate = self.gate.write();
            let mut roster = self.roster.write();
            let removed = roster.items.remove(&item).context(UnknownItemSnafu { item })?;
            let n = self.votes.remove_item(item);
            self.magnitudes.remove_item(item);
            self.bump();
            info!("Removed {} and {} comparisons", item, n);
            removed
        };
        self.publish_progress();
        Ok(removed)
    }

    pub fn item(&self, item: ItemId) -> PriorityResult<Item> {
        self.roster
            .read()
            .items
            .get(&item)
            .cloned()
            .context(UnknownItemSnafu { item })
    }

    /// Finds an item by title, ignoring case and surrounding spaces.
    pub fn item_by_title(&self, title: &str) -> Option<Item> {
        let norm = title.trim().to_lowercase();
        self.roster
            .read()
            .items
            .values()
            .find(|i| i.title.trim().to_lowercase() == norm)
            .cloned()
    }

    pub fn items(&self) -> Vec<Item> {
        self.roster.read().items.values().cloned().collect()
    }

    /// Registers a participant. Open comparisons now also wait for their vote.
    pub fn add_participant(&self, name: &str, role: &str, is_facilitator: bool) -> ParticipantId {
        let _gate = self.gate.write();
        let mut roster = self.roster.write();
        let id = ParticipantId(roster.next_participant);
        roster.next_participant += 1;
        roster.participants.insert(
            id,
            Participant {
                id,
                name: name.to_string(),
                role: role.to_string(),
                is_facilitator,
            },
        );
        self.bump();
        info!("Added {}: {} ({})", id, name, role);
        id
    }

    /// Removes a participant. Their votes no longer count, which may complete some
    /// comparisons right away.
    pub fn remove_participant(&self, participant: ParticipantId) -> PriorityResult<Participant> {
        let (removed, events) = {
            let _gate = self.gate.write();
            let mut roster = self.roster.write();
            let removed = roster
                .participants
                .remove(&participant)
                .context(UnknownParticipantSnafu { participant })?;
            let eligible = roster.eligible();
            let mut events: Vec<DomainEvent> = Vec::new();
            for id in self.votes.ids() {
                if let Some(outcome) = self.votes.reevaluate(id, &eligible)? {
                    let record = self.votes.get(id)?;
                    events.push(locked_event(&self.id, &record, outcome));
                }
            }
            for (item, criterion) in self.magnitudes.keys() {
                if let Some(value) = self.magnitudes.reevaluate(item, criterion, &eligible)? {
                    events.push(DomainEvent::MagnitudeConsensusLocked {
                        project: self.id.clone(),
                        item,
                        criterion,
                        value,
                    });
                }
            }
            self.bump();
            (removed, events)
        };
        info!(
            "Removed {}, {} keys locked on re-evaluation",
            participant,
            events.len()
        );
        self.publish(events);
        self.publish_progress();
        Ok(removed)
    }

    pub fn participant(&self, participant: ParticipantId) -> PriorityResult<Participant> {
        self.roster.read().participant(participant).cloned()
    }

    pub fn participants(&self) -> Vec<Participant> {
        self.roster.read().participants.values().cloned().collect()
    }

    pub fn create_session(&self) -> SessionId {
        let mut roster = self.roster.write();
        let id = SessionId(roster.sessions.iter().map(|s| s.0).max().unwrap_or(0) + 1);
        roster.sessions.insert(id);
        id
    }

    pub fn sessions(&self) -> Vec<SessionId> {
        self.roster.read().sessions.iter().cloned().collect()
    }

    // ******** Comparisons ********

    /// Creates the comparisons of the current items that do not exist yet.
    pub fn generate_matrix(
        &self,
        criterion: Criterion,
        session: SessionId,
    ) -> PriorityResult<Vec<ComparisonId>> {
        let created = {
            let _gate = self.gate.write();
            let roster = self.roster.read();
            roster.check_session(session)?;
            let items: Vec<ItemId> = roster.items.keys().cloned().collect();
            let pending = generate_matrix(&items, criterion, session)?;
            let created = self.votes.register(&pending);
            if !created.is_empty() {
                self.bump();
            }
            created
        };
        info!(
            "Generated {} new {} comparisons in {}",
            created.len(),
            criterion,
            session
        );
        if !created.is_empty() {
            self.publish_progress();
        }
        Ok(created)
    }

    /// The comparison of two items, whatever the order of the arguments.
    pub fn comparison_for(
        &self,
        criterion: Criterion,
        x: ItemId,
        y: ItemId,
    ) -> Option<ComparisonId> {
        PairKey::new(x, y).and_then(|pair| self.votes.find(criterion, pair))
    }

    pub fn comparison(&self, comparison: ComparisonId) -> PriorityResult<ComparisonRecord> {
        self.votes.get(comparison)
    }

    pub fn comparisons(&self) -> Vec<ComparisonRecord> {
        self.votes.snapshot()
    }

    /// The votes of the current participants on a comparison.
    pub fn tally(&self, comparison: ComparisonId) -> PriorityResult<VoteTally> {
        let eligible = self.roster.read().eligible();
        Ok(self.votes.get(comparison)?.tally(&eligible))
    }

    /// Records the vote of a participant and locks the comparison if everybody agrees.
    pub fn submit_vote(
        &self,
        comparison: ComparisonId,
        participant: ParticipantId,
        choice: VoteChoice,
    ) -> PriorityResult<Consensus<ComparisonOutcome>> {
        let (res, events) = {
            let _gate = self.gate.read();
            let roster = self.roster.read();
            self.check_submitter(&roster, participant)?;
            let res = match self
                .votes
                .submit(comparison, participant, choice, &roster.eligible())
            {
                Ok(r) => r,
                Err(e) => {
                    warn!("Rejected vote of {} on {}: {}", participant, comparison, e);
                    return Err(e);
                }
            };
            let mut events: Vec<DomainEvent> = Vec::new();
            if let Consensus::Reached(outcome) = res {
                self.bump();
                let record = self.votes.get(comparison)?;
                events.push(locked_event(&self.id, &record, outcome));
            }
            (res, events)
        };
        if !events.is_empty() {
            self.publish(events);
            self.publish_progress();
        }
        Ok(res)
    }

    // ******** Magnitudes ********

    pub fn magnitude(&self, item: ItemId, criterion: Criterion) -> PriorityResult<MagnitudeRecord> {
        self.magnitudes.get(item, criterion)
    }

    /// Records the magnitude score of a participant and locks it if everybody agrees.
    pub fn submit_magnitude(
        &self,
        item: ItemId,
        criterion: Criterion,
        participant: ParticipantId,
        value: u32,
    ) -> PriorityResult<Consensus<Magnitude>> {
        let value = Magnitude::new(value)?;
        let res = {
            let _gate = self.gate.read();
            let roster = self.roster.read();
            self.check_submitter(&roster, participant)?;
            let res = match self.magnitudes.submit(
                item,
                criterion,
                participant,
                value,
                &roster.eligible(),
            ) {
                Ok(r) => r,
                Err(e) => {
                    warn!(
                        "Rejected {} score of {} on {}: {}",
                        criterion, participant, item, e
                    );
                    return Err(e);
                }
            };
            if res.is_reached() {
                self.bump();
            }
            res
        };
        if let Consensus::Reached(value) = res {
            self.publish(vec![DomainEvent::MagnitudeConsensusLocked {
                project: self.id.clone(),
                item,
                criterion,
                value,
            }]);
            self.publish_progress();
        }
        Ok(res)
    }

    // ******** Administration ********

    /// Clears the lock and every vote of a comparison.
    pub fn reset_comparison(
        &self,
        actor: ParticipantId,
        comparison: ComparisonId,
    ) -> PriorityResult<()> {
        {
            let _gate = self.gate.write();
            let roster = self.roster.read();
            self.check_admin(&roster, actor, "reset comparisons")?;
            self.votes.reset(comparison)?;
            self.bump();
        }
        self.publish_progress();
        Ok(())
    }

    /// Clears the consensus and every score of an item for one criterion.
    pub fn reset_magnitude(
        &self,
        actor: ParticipantId,
        item: ItemId,
        criterion: Criterion,
    ) -> PriorityResult<()> {
        {
            let _gate = self.gate.write();
            let roster = self.roster.read();
            self.check_admin(&roster, actor, "reset magnitude scores")?;
            self.magnitudes.reset(item, criterion)?;
            self.bump();
        }
        self.publish_progress();
        Ok(())
    }

    pub fn move_comparison(
        &self,
        actor: ParticipantId,
        comparison: ComparisonId,
        session: SessionId,
    ) -> PriorityResult<()> {
        let _gate = self.gate.write();
        let roster = self.roster.read();
        self.check_admin(&roster, actor, "move comparisons")?;
        roster.check_session(session)?;
        self.votes.move_to(comparison, session)?;
        debug!("Moved {} to {}", comparison, session);
        Ok(())
    }

    /// Moves every comparison of a session that is not decided yet to another session.
    /// Returns the number of moved comparisons.
    pub fn reassign_pending(
        &self,
        actor: ParticipantId,
        from: SessionId,
        to: SessionId,
    ) -> PriorityResult<usize> {
        let _gate = self.gate.write();
        let roster = self.roster.read();
        self.check_admin(&roster, actor, "reassign comparisons")?;
        roster.check_session(from)?;
        roster.check_session(to)?;
        let mut moved = 0;
        for record in self.votes.snapshot() {
            if record.session == from && !record.is_locked() {
                self.votes.move_to(record.id, to)?;
                moved += 1;
            }
        }
        info!("Reassigned {} pending comparisons from {} to {}", moved, from, to);
        Ok(moved)
    }

    // ******** Progress and calculation ********

    pub fn progress(&self) -> Progress {
        let _gate = self.gate.read();
        let items = self.roster.read().item_ids();
        compute_progress(&items, &self.votes.snapshot(), &self.magnitudes.snapshot())
    }

    pub fn session_progress(
        &self,
        session: SessionId,
    ) -> PriorityResult<Vec<(Criterion, PhaseProgress)>> {
        self.roster.read().check_session(session)?;
        Ok(session_progress(session, &self.votes.snapshot()))
    }

    /// The last successful calculation, if any. It may be stale.
    pub fn report(&self) -> Option<Arc<PriorityReport>> {
        self.report.read().clone()
    }

    /// Computes the ranking of all the items.
    ///
    /// Only one calculation runs at a time. The inputs are copied in one consistent
    /// snapshot, and the preconditions are checked against that same snapshot. If the
    /// inputs did not change since the last calculation, the previous report is
    /// returned. A failed calculation leaves the previous report in place.
    pub fn calculate(&self) -> PriorityResult<Arc<PriorityReport>> {
        let _calculation = self.calculation.lock();
        let (items, comparisons, magnitudes, generation) = {
            let _gate = self.gate.write();
            let roster = self.roster.read();
            (
                roster.items.clone(),
                self.votes.snapshot(),
                self.magnitudes.snapshot(),
                self.generation(),
            )
        };

        if let Some(previous) = self.report.read().as_ref() {
            if previous.generation == generation {
                debug!("calculate: generation {} unchanged, reusing report", generation);
                return Ok(previous.clone());
            }
        }

        let item_ids: BTreeSet<ItemId> = items.keys().cloned().collect();
        let progress = compute_progress(&item_ids, &comparisons, &magnitudes);
        if !progress.ready_to_calculate {
            let missing = progress.missing();
            warn!("calculate: not ready: {:?}", missing);
            return PreconditionNotMetSnafu { missing }.fail();
        }

        let ids: Vec<ItemId> = item_ids.into_iter().collect();
        let value_weights = win_count_weights(
            Criterion::Value,
            &ids,
            &locked_comparisons(Criterion::Value, &comparisons),
        )?;
        let complexity_weights = win_count_weights(
            Criterion::Complexity,
            &ids,
            &locked_comparisons(Criterion::Complexity, &comparisons),
        )?;
        let consensus: BTreeMap<(ItemId, Criterion), Magnitude> = magnitudes
            .iter()
            .filter_map(|m| m.consensus.map(|c| ((m.item, m.criterion), c)))
            .collect();

        let mut inputs: Vec<PriorityInput> = Vec::with_capacity(items.len());
        for item in items.values() {
            let magnitude = |criterion: Criterion| {
                consensus
                    .get(&(item.id, criterion))
                    .copied()
                    .context(PreconditionNotMetSnafu {
                        missing: progress.missing(),
                    })
            };
            let weight = |weights: &BTreeMap<ItemId, f64>, criterion: Criterion| {
                weights.get(&item.id).copied().context(NoComparisonsSnafu {
                    item: item.id,
                    criterion,
                })
            };
            inputs.push(PriorityInput {
                item: item.id,
                title: item.title.clone(),
                value_weight: weight(&value_weights, Criterion::Value)?,
                complexity_weight: weight(&complexity_weights, Criterion::Complexity)?,
                value_magnitude: magnitude(Criterion::Value)?,
                complexity_magnitude: magnitude(Criterion::Complexity)?,
            });
        }

        let report = Arc::new(calculate_priorities(&inputs, &self.rules, generation)?);
        *self.report.write() = Some(report.clone());
        self.publish(vec![DomainEvent::PriorityCalculated {
            project: self.id.clone(),
            report: (*report).clone(),
        }]);
        Ok(report)
    }

    /// How every comparison was decided.
    pub fn provenance(&self) -> Vec<ComparisonProvenance> {
        self.votes
            .snapshot()
            .iter()
            .map(|r| ComparisonProvenance {
                comparison: r.id,
                criterion: r.criterion,
                session: r.session,
                item_a: r.pair.item_a(),
                item_b: r.pair.item_b(),
                outcome: r.outcome,
                votes: r.votes.len(),
            })
            .collect()
    }

    // ******** Persistence ********

    pub fn snapshot(&self) -> ProjectSnapshot {
        let _gate = self.gate.write();
        let roster = self.roster.read();
        ProjectSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            rules: self.rules.clone(),
            items: roster.items.values().cloned().collect(),
            participants: roster.participants.values().cloned().collect(),
            sessions: roster.sessions.iter().cloned().collect(),
            comparisons: self.votes.snapshot(),
            magnitudes: self.magnitudes.snapshot(),
            report: self.report.read().as_ref().map(|r| (**r).clone()),
            generation: self.generation(),
            next_item: roster.next_item,
            next_participant: roster.next_participant,
            next_comparison: self.votes.next_id(),
        }
    }

    /// Rebuilds a project from a snapshot, with the default sink and authorizer.
    pub fn restore(snapshot: ProjectSnapshot) -> Project {
        let next_item = snapshot.next_item.max(highest_item(&snapshot) + 1);
        let next_participant = snapshot
            .next_participant
            .max(highest_participant(&snapshot) + 1);
        let project = Project::new(snapshot.id, &snapshot.name).with_rules(&snapshot.rules);
        {
            let mut roster = project.roster.write();
            roster.next_item = next_item;
            roster.next_participant = next_participant;
            roster.items = snapshot.items.into_iter().map(|i| (i.id, i)).collect();
            roster.participants = snapshot
                .participants
                .into_iter()
                .map(|p| (p.id, p))
                .collect();
            roster.sessions.extend(snapshot.sessions);
            roster
                .sessions
                .extend(snapshot.comparisons.iter().map(|c| c.session));
        }
        project
            .votes
            .restore(snapshot.comparisons, snapshot.next_comparison);
        project.magnitudes.restore(snapshot.magnitudes);
        project.generation.store(snapshot.generation, Ordering::SeqCst);
        *project.report.write() = snapshot.report.map(Arc::new);
        project
    }

    pub fn save(&self, store: &dyn ProjectStore) -> PriorityResult<()> {
        let snapshot = self.snapshot();
        store.save(&snapshot)?;
        debug!("Saved {} (generation {})", self.id, snapshot.generation);
        Ok(())
    }

    pub fn load(store: &dyn ProjectStore, id: &ProjectId) -> PriorityResult<Option<Project>> {
        Ok(store.load(id)?.map(Project::restore))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{AllowAll, InMemoryStore, RecordingSink};

    struct Fixture {
        project: Project,
        sink: Arc<RecordingSink>,
        a: ItemId,
        b: ItemId,
        c: ItemId,
        facilitator: ParticipantId,
        member: ParticipantId,
    }

    fn fixture(rules: &ScoringRules) -> Fixture {
        let _ = env_logger::builder().is_test(true).try_init();
        let sink = Arc::new(RecordingSink::new());
        let project = Project::new(ProjectId("demo".to_string()), "Demo")
            .with_rules(rules)
            .with_sink(sink.clone());
        let a = project.add_item("A", "", "").unwrap();
        let b = project.add_item("B", "", "").unwrap();
        let c = project.add_item("C", "", "").unwrap();
        let facilitator = project.add_participant("Fran", "product", true);
        let member = project.add_participant("Mo", "dev", false);
        for criterion in Criterion::ALL {
            project
                .generate_matrix(criterion, SessionId::DEFAULT)
                .unwrap();
        }
        sink.clear();
        Fixture {
            project,
            sink,
            a,
            b,
            c,
            facilitator,
            member,
        }
    }

    fn choice_for(p: &Project, id: ComparisonId, winner: Option<ItemId>) -> VoteChoice {
        let pair = p.comparison(id).unwrap().pair;
        match winner {
            None => VoteChoice::Tie,
            Some(w) if w == pair.item_a() => VoteChoice::PrefersA,
            Some(_) => VoteChoice::PrefersB,
        }
    }

    // Everybody agrees on the outcome of a comparison.
    fn decide(p: &Project, criterion: Criterion, x: ItemId, y: ItemId, winner: Option<ItemId>) {
        let id = p.comparison_for(criterion, x, y).unwrap();
        let choice = choice_for(p, id, winner);
        for part in p.participants() {
            p.submit_vote(id, part.id, choice).unwrap();
        }
        assert!(p.comparison(id).unwrap().is_locked());
    }

    fn score(p: &Project, item: ItemId, criterion: Criterion, value: u32) {
        for part in p.participants() {
            p.submit_magnitude(item, criterion, part.id, value).unwrap();
        }
    }

    fn complete(f: &Fixture) {
        let p = &f.project;
        decide(p, Criterion::Value, f.a, f.b, Some(f.a));
        decide(p, Criterion::Value, f.a, f.c, Some(f.a));
        decide(p, Criterion::Value, f.b, f.c, Some(f.b));
        decide(p, Criterion::Complexity, f.a, f.b, None);
        decide(p, Criterion::Complexity, f.a, f.c, None);
        decide(p, Criterion::Complexity, f.b, f.c, None);
        for (item, v, c) in [(f.a, 8, 5), (f.b, 5, 3), (f.c, 3, 2)] {
            score(p, item, Criterion::Value, v);
            score(p, item, Criterion::Complexity, c);
        }
    }

    fn titles(r: &PriorityReport) -> Vec<String> {
        r.results.iter().map(|p| p.title.clone()).collect()
    }

    #[test]
    fn three_items_end_to_end() {
        let f = fixture(&ScoringRules::DEFAULT_RULES);
        complete(&f);
        assert!(f.project.progress().ready_to_calculate);
        let r = f.project.calculate().unwrap();
        assert_eq!(titles(&r), vec!["A", "B", "C"]);
        assert_eq!(r.results[0].value_weight, 1.0);
        assert_eq!(r.results[0].complexity_weight, 0.5);
        assert_eq!(r.results[0].final_score, Some(3.2));
        assert!((r.results[1].final_score.unwrap() - 5.0 / 3.0).abs() < 1e-12);
        assert_eq!(r.results[2].final_score, Some(0.0));
        assert_eq!(r.generation, f.project.generation());

        let names = f.sink.names();
        assert_eq!(names.iter().filter(|n| **n == "comparisonLocked").count(), 6);
        assert_eq!(
            names
                .iter()
                .filter(|n| **n == "magnitudeConsensusLocked")
                .count(),
            6
        );
        assert_eq!(names.last(), Some(&"priorityCalculated"));
    }

    #[test]
    fn calculation_waits_for_every_phase() {
        let f = fixture(&ScoringRules::DEFAULT_RULES);
        decide(&f.project, Criterion::Value, f.a, f.b, Some(f.a));
        match f.project.calculate() {
            Err(PriorityError::PreconditionNotMet { missing }) => {
                assert_eq!(missing.len(), 4);
                assert_eq!(
                    missing[0],
                    MissingPhase {
                        criterion: Criterion::Value,
                        phase: Phase::Pairwise,
                        completed: 1,
                        total: 3
                    }
                );
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(f.project.report(), None);
    }

    #[test]
    fn unchanged_state_reuses_the_report() {
        let f = fixture(&ScoringRules::DEFAULT_RULES);
        complete(&f);
        let r1 = f.project.calculate().unwrap();
        let r2 = f.project.calculate().unwrap();
        assert!(Arc::ptr_eq(&r1, &r2));
        // Votes on decided comparisons are rejected and change nothing.
        let id = f
            .project
            .comparison_for(Criterion::Value, f.a, f.b)
            .unwrap();
        assert!(f
            .project
            .submit_vote(id, f.member, VoteChoice::Tie)
            .is_err());
        assert!(Arc::ptr_eq(&r1, &f.project.calculate().unwrap()));
    }

    #[test]
    fn reset_allows_a_different_outcome() {
        let f = fixture(&ScoringRules::DEFAULT_RULES);
        complete(&f);
        let r1 = f.project.calculate().unwrap();
        let id = f
            .project
            .comparison_for(Criterion::Value, f.b, f.c)
            .unwrap();
        assert_eq!(
            f.project.reset_comparison(f.member, id),
            Err(PriorityError::Unauthorized {
                participant: f.member,
                operation: "reset comparisons".to_string()
            })
        );
        assert!(f.project.comparison(id).unwrap().is_locked());

        f.project.reset_comparison(f.facilitator, id).unwrap();
        let rec = f.project.comparison(id).unwrap();
        assert!(!rec.is_locked());
        assert!(rec.votes.is_empty());
        assert!(!f.project.progress().ready_to_calculate);
        // The last good report stays available.
        assert_eq!(f.project.report(), Some(r1.clone()));

        decide(&f.project, Criterion::Value, f.b, f.c, Some(f.c));
        assert_eq!(
            f.project.comparison(id).unwrap().outcome,
            Some(ComparisonOutcome::Winner(f.c))
        );
        let r2 = f.project.calculate().unwrap();
        assert!(r2.generation > r1.generation);
        // C now has a value weight of 0.5: 1.5 / 1.0 against B's 0.0.
        assert_eq!(titles(&r2), vec!["A", "C", "B"]);
    }

    #[test]
    fn failed_calculation_keeps_the_previous_report() {
        let f = fixture(&ScoringRules::DEFAULT_RULES);
        complete(&f);
        let r1 = f.project.calculate().unwrap();
        let d = f.project.add_item("D", "new one", "").unwrap();
        f.project
            .generate_matrix(Criterion::Value, SessionId::DEFAULT)
            .unwrap();
        assert!(f
            .project
            .comparison_for(Criterion::Value, d, f.a)
            .is_some());
        assert!(matches!(
            f.project.calculate(),
            Err(PriorityError::PreconditionNotMet { .. })
        ));
        assert_eq!(f.project.report(), Some(r1));
    }

    #[test]
    fn degenerate_complexity() {
        let f = fixture(&ScoringRules::DEFAULT_RULES);
        let p = &f.project;
        decide(p, Criterion::Value, f.a, f.b, Some(f.a));
        decide(p, Criterion::Value, f.a, f.c, Some(f.a));
        decide(p, Criterion::Value, f.b, f.c, Some(f.b));
        // C loses every complexity comparison.
        decide(p, Criterion::Complexity, f.a, f.b, None);
        decide(p, Criterion::Complexity, f.a, f.c, Some(f.a));
        decide(p, Criterion::Complexity, f.b, f.c, Some(f.b));
        for item in [f.a, f.b, f.c] {
            score(p, item, Criterion::Value, 5);
            score(p, item, Criterion::Complexity, 3);
        }
        assert_eq!(
            p.calculate(),
            Err(PriorityError::DegenerateComplexity { item: f.c })
        );

        let lenient = Project::restore(p.snapshot()).with_rules(&ScoringRules {
            degenerate_complexity: DegenerateComplexityMode::RankLast,
        });
        let r = lenient.calculate().unwrap();
        assert_eq!(titles(&r), vec!["A", "B", "C"]);
        assert_eq!(r.results[2].final_score, None);
        assert_eq!(r.results[2].rank, 3);
    }

    #[test]
    fn votes_need_registered_participants() {
        let f = fixture(&ScoringRules::DEFAULT_RULES);
        let id = f
            .project
            .comparison_for(Criterion::Value, f.a, f.b)
            .unwrap();
        let stranger = ParticipantId(42);
        assert_eq!(
            f.project.submit_vote(id, stranger, VoteChoice::Tie),
            Err(PriorityError::UnknownParticipant {
                participant: stranger
            })
        );
        assert_eq!(
            f.project
                .submit_magnitude(f.a, Criterion::Value, f.member, 4),
            Err(PriorityError::InvalidMagnitude { value: 4 })
        );
        assert!(f.project.comparison(id).unwrap().votes.is_empty());
    }

    #[test]
    fn comparison_lookup_ignores_order() {
        let f = fixture(&ScoringRules::DEFAULT_RULES);
        let p = &f.project;
        let id = p.comparison_for(Criterion::Complexity, f.c, f.a);
        assert!(id.is_some());
        assert_eq!(id, p.comparison_for(Criterion::Complexity, f.a, f.c));
        assert_ne!(id, p.comparison_for(Criterion::Value, f.a, f.c));
        assert_eq!(p.comparison_for(Criterion::Value, f.a, f.a), None);
    }

    #[test]
    fn titles_are_unique() {
        let f = fixture(&ScoringRules::DEFAULT_RULES);
        assert_eq!(
            f.project.add_item(" a ", "", ""),
            Err(PriorityError::DuplicateTitle {
                title: " a ".to_string()
            })
        );
        assert!(f.project.update_item(f.b, "c", "", "").is_err());
        f.project.update_item(f.b, "B2", "better", "done when").unwrap();
        assert_eq!(f.project.item_by_title("b2").map(|i| i.id), Some(f.b));
    }

    #[test]
    fn removing_a_participant_completes_pending_comparisons() {
        let f = fixture(&ScoringRules::DEFAULT_RULES);
        let p = &f.project;
        let late = p.add_participant("Lee", "qa", false);
        let id = p.comparison_for(Criterion::Value, f.a, f.b).unwrap();
        let choice = choice_for(p, id, Some(f.b));
        p.submit_vote(id, f.facilitator, choice).unwrap();
        let res = p.submit_vote(id, f.member, choice).unwrap();
        assert_eq!(
            res,
            Consensus::Pending {
                voted: 2,
                eligible: 3
            }
        );
        f.sink.clear();
        p.remove_participant(late).unwrap();
        assert_eq!(
            p.comparison(id).unwrap().outcome,
            Some(ComparisonOutcome::Winner(f.b))
        );
        assert_eq!(f.sink.names(), vec!["comparisonLocked", "progressChanged"]);
    }

    #[test]
    fn a_new_participant_keeps_decided_comparisons() {
        let f = fixture(&ScoringRules::DEFAULT_RULES);
        let p = &f.project;
        decide(p, Criterion::Value, f.a, f.b, Some(f.a));
        let open = p.comparison_for(Criterion::Value, f.a, f.c).unwrap();
        p.submit_vote(open, f.member, VoteChoice::Tie).unwrap();
        p.add_participant("Lee", "qa", false);
        let decided = p.comparison_for(Criterion::Value, f.a, f.b).unwrap();
        assert!(p.comparison(decided).unwrap().is_locked());
        let t = p.tally(open).unwrap();
        assert_eq!((t.voted(), t.eligible()), (1, 3));
    }

    #[test]
    fn sessions_split_the_work() {
        let f = fixture(&ScoringRules::DEFAULT_RULES);
        let p = &f.project;
        let second = p.create_session();
        decide(p, Criterion::Value, f.a, f.b, Some(f.a));
        assert_eq!(
            p.reassign_pending(f.member, SessionId::DEFAULT, second),
            Err(PriorityError::Unauthorized {
                participant: f.member,
                operation: "reassign comparisons".to_string()
            })
        );
        assert_eq!(
            p.reassign_pending(f.facilitator, SessionId::DEFAULT, second),
            Ok(5)
        );
        let s1 = p.session_progress(SessionId::DEFAULT).unwrap();
        assert_eq!(s1[0].1, PhaseProgress { completed: 1, total: 1 });
        let s2 = p.session_progress(second).unwrap();
        assert_eq!(s2[0].1, PhaseProgress { completed: 0, total: 2 });
        assert_eq!(s2[1].1, PhaseProgress { completed: 0, total: 3 });

        let id = p.comparison_for(Criterion::Value, f.b, f.c).unwrap();
        p.move_comparison(f.facilitator, id, SessionId::DEFAULT)
            .unwrap();
        assert_eq!(p.comparison(id).unwrap().session, SessionId::DEFAULT);
        assert_eq!(
            p.move_comparison(f.facilitator, id, SessionId(9)),
            Err(PriorityError::UnknownSession {
                session: SessionId(9)
            })
        );
    }

    #[test]
    fn save_and_load() {
        let f = fixture(&ScoringRules::DEFAULT_RULES);
        complete(&f);
        f.project.calculate().unwrap();
        let store = InMemoryStore::new();
        f.project.save(&store).unwrap();
        let loaded = Project::load(&store, f.project.id()).unwrap().unwrap();
        assert_eq!(loaded.snapshot(), f.project.snapshot());
        assert_eq!(loaded.report(), f.project.report());
        // Identifiers keep growing after a restore.
        let d = loaded.add_item("D", "", "").unwrap();
        assert!(d.0 > f.c.0);
        assert_eq!(
            Project::load(&store, &ProjectId("nope".to_string()))
                .unwrap()
                .map(|p| p.name().to_string()),
            None
        );
    }

    #[test]
    fn allow_all_lets_members_administer() {
        let sink = Arc::new(RecordingSink::new());
        let project = ProjectId("open".to_string());
        let p = Project::new(project.clone(), "Open")
            .with_sink(sink.clone())
            .with_authorizer(Arc::new(AllowAll));
        let a = p.add_item("A", "", "").unwrap();
        let b = p.add_item("B", "", "").unwrap();
        let mo = p.add_participant("Mo", "dev", false);
        let id = p
            .generate_matrix(Criterion::Value, SessionId::DEFAULT)
            .unwrap()[0];
        sink.clear();

        p.submit_vote(id, mo, VoteChoice::PrefersB).unwrap();
        assert_eq!(
            sink.events()[0],
            DomainEvent::ComparisonLocked {
                project,
                comparison: id,
                criterion: Criterion::Value,
                item_a: a,
                item_b: b,
                winner: Some(b),
                is_tie: false,
            }
        );
        p.reset_comparison(mo, id).unwrap();
        assert!(!p.comparison(id).unwrap().is_locked());
        assert_eq!(
            sink.names(),
            vec!["comparisonLocked", "progressChanged", "progressChanged"]
        );
    }

    #[test]
    fn restored_projects_never_reuse_identifiers() {
        let f = fixture(&ScoringRules::DEFAULT_RULES);
        let p = &f.project;
        let kim = p.add_participant("Kim", "ops", false);
        let open = p.comparison_for(Criterion::Value, f.a, f.b).unwrap();
        p.submit_vote(open, kim, VoteChoice::PrefersA).unwrap();
        p.remove_participant(kim).unwrap();
        let highest_comparison = p.comparisons().iter().map(|c| c.id).max().unwrap();
        p.remove_item(f.c).unwrap();

        // Older documents carry no counters.
        let current = p.snapshot();
        let mut legacy = current.clone();
        legacy.next_item = 0;
        legacy.next_participant = 0;
        legacy.next_comparison = 0;

        for snapshot in [current, legacy] {
            let restored = Project::restore(snapshot);
            let lee = restored.add_participant("Lee", "qa", false);
            assert!(lee.0 > kim.0);
            let t = restored.tally(open).unwrap();
            assert_eq!((t.voted(), t.eligible()), (0, 3));
            restored
                .submit_vote(open, f.facilitator, VoteChoice::PrefersA)
                .unwrap();
            assert!(matches!(
                restored.submit_vote(open, f.member, VoteChoice::PrefersA),
                Ok(Consensus::Pending { .. })
            ));
            assert_eq!(
                restored.submit_vote(open, lee, VoteChoice::PrefersA),
                Ok(Consensus::Reached(ComparisonOutcome::Winner(f.a)))
            );
        }

        let restored = Project::restore(p.snapshot());
        let d = restored.add_item("D", "", "").unwrap();
        assert!(d.0 > f.c.0);
        let created = restored
            .generate_matrix(Criterion::Value, SessionId::DEFAULT)
            .unwrap();
        assert_eq!(created.len(), 2);
        assert!(created.iter().all(|id| *id > highest_comparison));
    }

    #[test]
    fn remove_item_drops_its_comparisons() {
        let f = fixture(&ScoringRules::DEFAULT_RULES);
        let p = &f.project;
        p.remove_item(f.c).unwrap();
        assert_eq!(p.comparisons().len(), 2);
        assert_eq!(
            p.magnitude(f.c, Criterion::Value),
            Err(PriorityError::UnknownItem { item: f.c })
        );
        let v = p.progress();
        assert_eq!(
            v.criterion(Criterion::Value).unwrap().pairwise,
            PhaseProgress { completed: 0, total: 1 }
        );
    }

    #[test]
    fn concurrent_submissions() {
        let project = Project::new(ProjectId("busy".to_string()), "Busy");
        let items: Vec<ItemId> = (0..5)
            .map(|i| project.add_item(&format!("item {}", i), "", "").unwrap())
            .collect();
        let people: Vec<ParticipantId> = (0..6)
            .map(|i| project.add_participant(&format!("p{}", i), "dev", false))
            .collect();
        let ids = project
            .generate_matrix(Criterion::Value, SessionId::DEFAULT)
            .unwrap();
        std::thread::scope(|s| {
            for who in people.iter() {
                let project = &project;
                let ids = &ids;
                let items = &items;
                s.spawn(move || {
                    for id in ids.iter() {
                        project
                            .submit_vote(*id, *who, VoteChoice::PrefersB)
                            .unwrap();
                    }
                    for item in items.iter() {
                        project
                            .submit_magnitude(*item, Criterion::Value, *who, 13)
                            .unwrap();
                    }
                });
            }
            s.spawn(|| {
                for _ in 0..20 {
                    let _ = project.progress();
                    let _ = project.calculate();
                }
            });
        });
        let progress = project.progress();
        let value = progress.criterion(Criterion::Value).unwrap();
        assert_eq!(value.pairwise, PhaseProgress { completed: 10, total: 10 });
        assert_eq!(value.magnitude, PhaseProgress { completed: 5, total: 5 });
        for rec in project.comparisons() {
            assert_eq!(rec.votes.len(), 6);
            assert_eq!(rec.outcome, Some(ComparisonOutcome::Winner(rec.pair.item_b())));
        }
    }
}
