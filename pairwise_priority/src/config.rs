// ********* Identifiers ***********

use std::fmt;

use serde::{Deserialize, Serialize};
use snafu::Snafu;

/// Identifies an item (feature) inside a project.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ItemId(pub u32);

/// Identifies a participant (voter) inside a project.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ParticipantId(pub u32);

/// Identifies one pairwise comparison inside a project.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ComparisonId(pub u32);

/// Identifies a comparison session. Comparisons are grouped in sessions so that
/// facilitators can split the voting work.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct SessionId(pub u32);

impl SessionId {
    pub const DEFAULT: SessionId = SessionId(1);
}

#[derive(Eq, PartialEq, Debug, Clone, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ProjectId(pub String);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item#{}", self.0)
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "participant#{}", self.0)
    }
}

impl fmt::Display for ComparisonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "comparison#{}", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ********* Input data structures ***********

/// The two independent dimensions along which items are compared and scored.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Criterion {
    /// Business value. Winning a comparison means being worth more.
    Value,
    /// Implementation complexity. Winning a comparison means being harder to build.
    Complexity,
}

impl Criterion {
    pub const ALL: [Criterion; 2] = [Criterion::Value, Criterion::Complexity];
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Criterion::Value => write!(f, "value"),
            Criterion::Complexity => write!(f, "complexity"),
        }
    }
}

/// An entity to be prioritized.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub title: String,
    pub description: String,
    pub acceptance_notes: String,
}

/// A voter of the project.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    pub role: String,
    /// Facilitators may reset and reassign comparisons. The check itself is
    /// delegated to the [`crate::ports::Authorizer`].
    pub is_facilitator: bool,
}

/// A single vote on a comparison between item A and item B.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VoteChoice {
    PrefersA,
    PrefersB,
    Tie,
}

/// The allowed magnitude values, in increasing order.
pub const MAGNITUDE_SCALE: [u32; 10] = [1, 2, 3, 5, 8, 13, 21, 34, 55, 89];

/// An absolute score taken from [`MAGNITUDE_SCALE`].
///
/// It is not possible to build a magnitude outside of the scale, so a consensus
/// magnitude is always strictly positive.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Magnitude(u32);

impl Magnitude {
    pub fn new(value: u32) -> Result<Magnitude, PriorityError> {
        if MAGNITUDE_SCALE.contains(&value) {
            Ok(Magnitude(value))
        } else {
            InvalidMagnitudeSnafu { value }.fail()
        }
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for Magnitude {
    type Error = PriorityError;
    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Magnitude::new(value)
    }
}

impl From<Magnitude> for u32 {
    fn from(m: Magnitude) -> u32 {
        m.0
    }
}

impl fmt::Display for Magnitude {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ******** Output data structures *********

/// The locked outcome of a comparison. A comparison has either a winner or a tie, never both.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ComparisonOutcome {
    Winner(ItemId),
    Tie,
}

impl ComparisonOutcome {
    pub fn winner(&self) -> Option<ItemId> {
        match self {
            ComparisonOutcome::Winner(item) => Some(*item),
            ComparisonOutcome::Tie => None,
        }
    }

    pub fn is_tie(&self) -> bool {
        matches!(self, ComparisonOutcome::Tie)
    }
}

/// The priority of one item, with the full provenance of its score.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ItemPriority {
    pub item: ItemId,
    pub title: String,
    pub value_weight: f64,
    pub complexity_weight: f64,
    pub value_magnitude: Magnitude,
    pub complexity_magnitude: Magnitude,
    pub weighted_value: f64,
    pub weighted_complexity: f64,
    /// None only when the item was ranked last under [`DegenerateComplexityMode::RankLast`].
    pub final_score: Option<f64>,
    /// 1-based position in the ranking.
    pub rank: u32,
}

/// The outcome of one calculation, sorted by rank.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct PriorityReport {
    /// The state generation this report was computed from.
    pub generation: u64,
    pub results: Vec<ItemPriority>,
}

// ********* Configuration **********

/// What to do with an item whose weighted complexity is zero.
///
/// This happens when an item loses every complexity comparison: its win-count weight
/// is 0 and the ratio is undefined.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DegenerateComplexityMode {
    /// The whole calculation fails with [`PriorityError::DegenerateComplexity`].
    Fail,
    /// The item gets no score and is ranked after all the scored items.
    RankLast,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringRules {
    pub degenerate_complexity: DegenerateComplexityMode,
}

impl ScoringRules {
    pub const DEFAULT_RULES: ScoringRules = ScoringRules {
        degenerate_complexity: DegenerateComplexityMode::Fail,
    };
}

impl Default for ScoringRules {
    fn default() -> Self {
        ScoringRules::DEFAULT_RULES
    }
}

// ********* Errors **********

/// The phases a calculation depends on.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Pairwise,
    Magnitude,
}

/// A phase that is not complete yet, reported when a calculation is attempted too early.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct MissingPhase {
    pub criterion: Criterion,
    pub phase: Phase,
    pub completed: usize,
    pub total: usize,
}

impl fmt::Display for MissingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self.phase {
            Phase::Pairwise => "comparisons",
            Phase::Magnitude => "magnitude scores",
        };
        write!(
            f,
            "{} {}: {}/{}",
            self.criterion, phase, self.completed, self.total
        )
    }
}

fn describe_missing(missing: &[MissingPhase]) -> String {
    missing
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<String>>()
        .join(", ")
}

/// Errors reported by the engine. None of them is fatal: a rejected operation leaves
/// the prior state untouched.
#[derive(Debug, Snafu, PartialEq, Clone)]
#[snafu(visibility(pub))]
pub enum PriorityError {
    #[snafu(display("at least 2 items are required to compare, got {count}"))]
    InsufficientItems { count: usize },

    #[snafu(display("{comparison} is already decided"))]
    ComparisonLocked { comparison: ComparisonId },

    #[snafu(display("{criterion} magnitude of {item} is already decided"))]
    MagnitudeLocked { item: ItemId, criterion: Criterion },

    #[snafu(display("{} is not on the magnitude scale {:?}", value, MAGNITUDE_SCALE))]
    InvalidMagnitude { value: u32 },

    #[snafu(display("{item} has no locked {criterion} comparison"))]
    NoComparisons { item: ItemId, criterion: Criterion },

    #[snafu(display("{item} has a weighted complexity of zero"))]
    DegenerateComplexity { item: ItemId },

    #[snafu(display("calculation preconditions not met: {}", describe_missing(missing)))]
    PreconditionNotMet { missing: Vec<MissingPhase> },

    #[snafu(display("unknown {participant}"))]
    UnknownParticipant { participant: ParticipantId },

    #[snafu(display("unknown {comparison}"))]
    UnknownComparison { comparison: ComparisonId },

    #[snafu(display("unknown {item}"))]
    UnknownItem { item: ItemId },

    #[snafu(display("unknown {session}"))]
    UnknownSession { session: SessionId },

    #[snafu(display("{participant} is not allowed to {operation}"))]
    Unauthorized {
        participant: ParticipantId,
        operation: String,
    },

    #[snafu(display("an item titled {title:?} already exists"))]
    DuplicateTitle { title: String },

    #[snafu(display("persistence failure: {message}"))]
    Persistence { message: String },
}

pub type PriorityResult<T> = Result<T, PriorityError>;
