//! The collaborators the engine talks to.
//!
//! - [`ProjectStore`]: loads and saves whole projects
//! - [`EventSink`]: receives the domain events after each transition
//! - [`Authorizer`]: decides who may vote and who may run administrative operations

use serde::{Deserialize, Serialize};

use crate::config::*;
use crate::events::DomainEvent;
use crate::ledger::{ComparisonRecord, MagnitudeRecord};

/// Everything needed to restore a project.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    pub id: ProjectId,
    pub name: String,
    #[serde(default)]
    pub rules: ScoringRules,
    pub items: Vec<Item>,
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub sessions: Vec<SessionId>,
    pub comparisons: Vec<ComparisonRecord>,
    pub magnitudes: Vec<MagnitudeRecord>,
    pub report: Option<PriorityReport>,
    pub generation: u64,
    /// The next identifiers to hand out. Identifiers are never reused, even after a
    /// removal. When absent (0), they are derived from the highest identifiers found
    /// anywhere in the snapshot, votes and scores included.
    #[serde(default)]
    pub next_item: u32,
    #[serde(default)]
    pub next_participant: u32,
    #[serde(default)]
    pub next_comparison: u32,
}

/// Persistence port. Implementations must replace a saved project atomically.
pub trait ProjectStore: Send + Sync {
    fn load(&self, id: &ProjectId) -> PriorityResult<Option<ProjectSnapshot>>;

    fn save(&self, snapshot: &ProjectSnapshot) -> PriorityResult<()>;

    fn list(&self) -> PriorityResult<Vec<ProjectId>>;
}

/// Real-time fan-out port.
///
/// Publishing must not block and cannot fail from the point of view of the engine.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: &DomainEvent);
}

/// Authorization port.
pub trait Authorizer: Send + Sync {
    /// May this participant submit votes and magnitude scores?
    fn may_submit(&self, project: &ProjectId, participant: &Participant) -> bool;

    /// May this participant reset or move comparisons?
    fn may_administer(&self, project: &ProjectId, participant: &Participant) -> bool;
}
