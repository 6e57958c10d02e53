use crate::prio::*;

use serde::{Deserialize, Serialize};
use serde_json::Value as JSValue;

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(rename = "projectName")]
    pub project_name: String,
    #[serde(rename = "projectId")]
    pub project_id: Option<String>,
    #[serde(rename = "outputPath")]
    pub output_path: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionRules {
    #[serde(rename = "degenerateComplexity")]
    pub degenerate_complexity: Option<String>,
}

impl SessionRules {
    pub fn scoring_rules(&self) -> PrioResult<ScoringRules> {
        let degenerate_complexity = match self.degenerate_complexity.as_deref() {
            None | Some("fail") => DegenerateComplexityMode::Fail,
            Some("rankLast") => DegenerateComplexityMode::RankLast,
            Some(x) => whatever!("unknown degenerateComplexity rule: {:?}", x),
        };
        Ok(ScoringRules {
            degenerate_complexity,
        })
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ItemEntry {
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "acceptanceNotes")]
    pub acceptance_notes: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantEntry {
    pub name: String,
    pub role: Option<String>,
    pub facilitator: Option<bool>,
}

/// A vote, with the items named by title. The choice is relative to the order of
/// `itemA` and `itemB` in the entry.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct BallotEntry {
    pub participant: String,
    pub criterion: Criterion,
    #[serde(rename = "itemA")]
    pub item_a: String,
    #[serde(rename = "itemB")]
    pub item_b: String,
    pub choice: VoteChoice,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct MagnitudeEntry {
    pub participant: String,
    pub criterion: Criterion,
    pub item: String,
    pub value: u32,
}

/// Resets either a comparison (`itemA` and `itemB`) or a magnitude score (`item`), then
/// replays the new votes.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ResetEntry {
    pub by: String,
    pub criterion: Criterion,
    #[serde(rename = "itemA")]
    pub item_a: Option<String>,
    #[serde(rename = "itemB")]
    pub item_b: Option<String>,
    pub item: Option<String>,
    #[serde(default)]
    pub revotes: Vec<BallotEntry>,
    #[serde(default)]
    pub rescores: Vec<MagnitudeEntry>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(rename = "outputSettings")]
    pub output_settings: OutputSettings,
    #[serde(default)]
    pub rules: SessionRules,
    #[serde(default)]
    pub items: Vec<ItemEntry>,
    #[serde(rename = "itemsFile")]
    pub items_file: Option<String>,
    pub participants: Vec<ParticipantEntry>,
    #[serde(default)]
    pub ballots: Vec<BallotEntry>,
    #[serde(default)]
    pub magnitudes: Vec<MagnitudeEntry>,
    #[serde(default)]
    pub resets: Vec<ResetEntry>,
}

pub fn read_config(path: &str) -> PrioResult<SessionConfig> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })
}

pub fn read_summary(path: &str) -> PrioResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    debug!("read_summary: {:?}", js);
    Ok(js)
}
