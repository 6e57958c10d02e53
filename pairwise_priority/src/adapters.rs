//! In-memory implementations of the ports.

use log::info;
use parking_lot::RwLock;

use std::collections::BTreeMap;

use crate::config::*;
use crate::events::DomainEvent;
use crate::ports::{Authorizer, EventSink, ProjectSnapshot, ProjectStore};

/// A store that keeps the snapshots in memory. Mostly useful for tests.
#[derive(Default)]
pub struct InMemoryStore {
    projects: RwLock<BTreeMap<ProjectId, ProjectSnapshot>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProjectStore for InMemoryStore {
    fn load(&self, id: &ProjectId) -> PriorityResult<Option<ProjectSnapshot>> {
        Ok(self.projects.read().get(id).cloned())
    }

    fn save(&self, snapshot: &ProjectSnapshot) -> PriorityResult<()> {
        self.projects
            .write()
            .insert(snapshot.id.clone(), snapshot.clone());
        Ok(())
    }

    fn list(&self) -> PriorityResult<Vec<ProjectId>> {
        Ok(self.projects.read().keys().cloned().collect())
    }
}

/// Keeps every published event.
#[derive(Default)]
pub struct RecordingSink {
    events: RwLock<Vec<DomainEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.read().clone()
    }

    pub fn event_count(&self) -> usize {
        self.events.read().len()
    }

    /// The names of the events, in publication order.
    pub fn names(&self) -> Vec<&'static str> {
        self.events.read().iter().map(|e| e.name()).collect()
    }

    pub fn clear(&self) {
        self.events.write().clear();
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: &DomainEvent) {
        self.events.write().push(event.clone());
    }
}

/// Writes a line to the log for every event.
pub struct LogSink;

impl EventSink for LogSink {
    fn publish(&self, event: &DomainEvent) {
        match event {
            DomainEvent::ComparisonLocked {
                project,
                comparison,
                criterion,
                winner,
                ..
            } => match winner {
                Some(w) => info!("[{}] {} ({}) won by {}", project, comparison, criterion, w),
                None => info!("[{}] {} ({}) is a tie", project, comparison, criterion),
            },
            DomainEvent::MagnitudeConsensusLocked {
                project,
                item,
                criterion,
                value,
            } => info!("[{}] {} {} magnitude: {}", project, item, criterion, value),
            DomainEvent::ProgressChanged { project, progress } => {
                for cp in progress.criteria.iter() {
                    info!(
                        "[{}] {}: comparisons {}/{}, magnitudes {}/{}",
                        project,
                        cp.criterion,
                        cp.pairwise.completed,
                        cp.pairwise.total,
                        cp.magnitude.completed,
                        cp.magnitude.total
                    );
                }
            }
            DomainEvent::PriorityCalculated { project, report } => {
                for r in report.results.iter() {
                    info!("[{}] {:>4} {:?} {}", project, r.rank, r.final_score, r.title);
                }
            }
        }
    }
}

/// Registered participants may vote, facilitators may administer.
pub struct RosterAuthorizer;

impl Authorizer for RosterAuthorizer {
    fn may_submit(&self, _project: &ProjectId, _participant: &Participant) -> bool {
        true
    }

    fn may_administer(&self, _project: &ProjectId, participant: &Participant) -> bool {
        participant.is_facilitator
    }
}

/// Lets everybody do everything.
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn may_submit(&self, _project: &ProjectId, _participant: &Participant) -> bool {
        true
    }

    fn may_administer(&self, _project: &ProjectId, _participant: &Participant) -> bool {
        true
    }
}
