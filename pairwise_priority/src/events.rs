use serde::{Deserialize, Serialize};

use crate::config::*;
use crate::progress::Progress;

/// The events published after each state transition of a project.
///
/// Delivery is fire-and-forget: the engine never waits for a sink.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DomainEvent {
    #[serde(rename_all = "camelCase")]
    ComparisonLocked {
        project: ProjectId,
        comparison: ComparisonId,
        criterion: Criterion,
        item_a: ItemId,
        item_b: ItemId,
        winner: Option<ItemId>,
        is_tie: bool,
    },
    #[serde(rename_all = "camelCase")]
    MagnitudeConsensusLocked {
        project: ProjectId,
        item: ItemId,
        criterion: Criterion,
        value: Magnitude,
    },
    #[serde(rename_all = "camelCase")]
    ProgressChanged {
        project: ProjectId,
        progress: Progress,
    },
    #[serde(rename_all = "camelCase")]
    PriorityCalculated {
        project: ProjectId,
        report: PriorityReport,
    },
}

impl DomainEvent {
    pub fn project(&self) -> &ProjectId {
        match self {
            DomainEvent::ComparisonLocked { project, .. } => project,
            DomainEvent::MagnitudeConsensusLocked { project, .. } => project,
            DomainEvent::ProgressChanged { project, .. } => project,
            DomainEvent::PriorityCalculated { project, .. } => project,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::ComparisonLocked { .. } => "comparisonLocked",
            DomainEvent::MagnitudeConsensusLocked { .. } => "magnitudeConsensusLocked",
            DomainEvent::ProgressChanged { .. } => "progressChanged",
            DomainEvent::PriorityCalculated { .. } => "priorityCalculated",
        }
    }
}
