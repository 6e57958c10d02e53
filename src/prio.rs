use log::{debug, info, warn};

use pairwise_priority::builder::Builder;
use pairwise_priority::ports::EventSink;
use pairwise_priority::*;
use snafu::{prelude::*, Snafu};

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::prio::config_reader::*;
use crate::prio::io_common::*;
use crate::prio::io_csv::*;
use crate::prio::io_json_store::JsonFileStore;

pub mod config_reader;
pub mod io_common;
pub mod io_csv;
pub mod io_json_store;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PrioError {
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing the JSON content of {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Error producing JSON"))]
    WritingJson { source: serde_json::Error },
    #[snafu(display("Error writing {path}"))]
    WritingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error opening the CSV file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error parsing line {lineno} of the CSV file"))]
    CsvLineParse { source: csv::Error, lineno: usize },
    #[snafu(display("Line {lineno} of the CSV file has no title"))]
    CsvMissingTitle { lineno: usize },
    #[snafu(display("Error writing CSV"))]
    CsvWrite { source: csv::Error },
    #[snafu(display("Error flushing CSV"))]
    FlushingCsv { source: std::io::Error },
    #[snafu(display("The session file has no parent directory"))]
    MissingParentDir {},
    #[snafu(display("Error while {step}: {source}"))]
    Engine {
        source: PriorityError,
        step: String,
    },
    #[snafu(display("Difference detected between calculated summary and reference summary"))]
    ReferenceMismatch {},
    #[snafu(display("--events prints to stdout, the summary must be written to a file"))]
    EventsOnStdout {},

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type PrioResult<T> = Result<T, PrioError>;

/// Where the outputs of a run go.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub reference: Option<String>,
    pub out: Option<String>,
    pub csv_out: Option<String>,
    pub store: Option<String>,
    pub events: bool,
}

// The outcome of replaying a session file.
struct Replay {
    project: Project,
    rejected_ballots: usize,
    rejected_magnitudes: usize,
    rejected_resets: usize,
    calculation: PriorityResult<Arc<PriorityReport>>,
}

// Looks up the names used in the session file.
struct Names {
    participants: HashMap<String, ParticipantId>,
}

impl Names {
    fn participant(&self, name: &str) -> PrioResult<ParticipantId> {
        match self.participants.get(name) {
            Some(p) => Ok(*p),
            None => whatever!("unknown participant {:?}", name),
        }
    }

    fn item(&self, project: &Project, title: &str) -> PrioResult<ItemId> {
        match project.item_by_title(title) {
            Some(i) => Ok(i.id),
            None => whatever!("unknown item {:?}", title),
        }
    }

    fn comparison(
        &self,
        project: &Project,
        criterion: Criterion,
        title_a: &str,
        title_b: &str,
    ) -> PrioResult<(ComparisonId, ItemId)> {
        let a = self.item(project, title_a)?;
        let b = self.item(project, title_b)?;
        match project.comparison_for(criterion, a, b) {
            Some(id) => Ok((id, a)),
            None => whatever!(
                "no {} comparison between {:?} and {:?}",
                criterion,
                title_a,
                title_b
            ),
        }
    }
}

fn collect_items(config: &SessionConfig, root: &Path) -> PrioResult<Vec<ItemEntry>> {
    let mut items = config.items.clone();
    if let Some(f) = &config.items_file {
        let p = resolve_path(root, f);
        let p2 = p.as_path().display().to_string();
        info!("Attempting to read items file {:?}", p2);
        items.extend(read_items_csv(&p2)?);
    }
    Ok(items)
}

fn build_project(
    config: &SessionConfig,
    items: &[ItemEntry],
    rules: &ScoringRules,
    sink: Option<Arc<dyn EventSink>>,
) -> PrioResult<Project> {
    let id = config
        .output_settings
        .project_id
        .clone()
        .unwrap_or_else(|| slug(&config.output_settings.project_name));
    let mut builder = Builder::new(&id, rules)
        .context(EngineSnafu {
            step: "setting up the project",
        })?
        .name(&config.output_settings.project_name);
    if let Some(s) = sink {
        builder = builder.sink(s);
    }
    for it in items.iter() {
        builder
            .add_item(
                &it.title,
                it.description.as_deref().unwrap_or(""),
                it.acceptance_notes.as_deref().unwrap_or(""),
            )
            .context(EngineSnafu {
                step: "reading the items",
            })?;
    }
    for p in config.participants.iter() {
        builder.add_participant(
            &p.name,
            p.role.as_deref().unwrap_or(""),
            p.facilitator.unwrap_or(false),
        );
    }
    builder.build().context(EngineSnafu {
        step: "generating the comparisons",
    })
}

// The choice of a ballot is relative to the order of its items, which may differ from
// the order of the comparison.
fn apply_ballot(project: &Project, names: &Names, b: &BallotEntry) -> PrioResult<bool> {
    let participant = names.participant(&b.participant)?;
    let (id, first) = names.comparison(project, b.criterion, &b.item_a, &b.item_b)?;
    let pair = project
        .comparison(id)
        .context(EngineSnafu {
            step: "reading a comparison",
        })?
        .pair;
    let choice = match b.choice {
        c if pair.item_a() == first => c,
        VoteChoice::PrefersA => VoteChoice::PrefersB,
        VoteChoice::PrefersB => VoteChoice::PrefersA,
        VoteChoice::Tie => VoteChoice::Tie,
    };
    match project.submit_vote(id, participant, choice) {
        Ok(c) => {
            debug!("apply_ballot: {:?} -> {:?}", b, c);
            Ok(true)
        }
        Err(e) => {
            warn!("Ballot {:?} rejected: {}", b, e);
            Ok(false)
        }
    }
}

fn apply_magnitude(project: &Project, names: &Names, m: &MagnitudeEntry) -> PrioResult<bool> {
    let participant = names.participant(&m.participant)?;
    let item = names.item(project, &m.item)?;
    match project.submit_magnitude(item, m.criterion, participant, m.value) {
        Ok(c) => {
            debug!("apply_magnitude: {:?} -> {:?}", m, c);
            Ok(true)
        }
        Err(e) => {
            warn!("Magnitude score {:?} rejected: {}", m, e);
            Ok(false)
        }
    }
}

fn apply_reset(project: &Project, names: &Names, r: &ResetEntry) -> PrioResult<bool> {
    let by = names.participant(&r.by)?;
    let res = match (&r.item_a, &r.item_b, &r.item) {
        (Some(a), Some(b), None) => {
            let (id, _) = names.comparison(project, r.criterion, a, b)?;
            project.reset_comparison(by, id)
        }
        (None, None, Some(i)) => {
            let item = names.item(project, i)?;
            project.reset_magnitude(by, item, r.criterion)
        }
        _ => whatever!(
            "a reset needs either itemA and itemB, or item: {:?}",
            r
        ),
    };
    if let Err(e) = res {
        warn!("Reset {:?} rejected: {}", r, e);
        return Ok(false);
    }
    Ok(true)
}

fn replay(
    config: &SessionConfig,
    items: &[ItemEntry],
    rules: &ScoringRules,
    sink: Option<Arc<dyn EventSink>>,
) -> PrioResult<Replay> {
    let project = build_project(config, items, rules, sink)?;
    let mut participants: HashMap<String, ParticipantId> = HashMap::new();
    for p in project.participants() {
        if participants.insert(p.name.clone(), p.id).is_some() {
            whatever!("participant {:?} is declared twice", p.name);
        }
    }
    let names = Names { participants };

    let mut rejected_ballots = 0;
    let mut rejected_magnitudes = 0;
    let mut rejected_resets = 0;
    for b in config.ballots.iter() {
        if !apply_ballot(&project, &names, b)? {
            rejected_ballots += 1;
        }
    }
    for m in config.magnitudes.iter() {
        if !apply_magnitude(&project, &names, m)? {
            rejected_magnitudes += 1;
        }
    }
    for r in config.resets.iter() {
        if !apply_reset(&project, &names, r)? {
            rejected_resets += 1;
            continue;
        }
        for b in r.revotes.iter() {
            if !apply_ballot(&project, &names, b)? {
                rejected_ballots += 1;
            }
        }
        for m in r.rescores.iter() {
            if !apply_magnitude(&project, &names, m)? {
                rejected_magnitudes += 1;
            }
        }
    }

    let calculation = project.calculate();
    if let Err(e) = &calculation {
        warn!("The priorities could not be calculated: {}", e);
    }
    Ok(Replay {
        project,
        rejected_ballots,
        rejected_magnitudes,
        rejected_resets,
        calculation,
    })
}

fn progress_to_json(progress: &Progress) -> JSValue {
    let mut js: JSMap<String, JSValue> = JSMap::new();
    for cp in progress.criteria.iter() {
        js.insert(
            cp.criterion.to_string(),
            json!({
                "comparisons": format!("{}/{}", cp.pairwise.completed, cp.pairwise.total),
                "magnitudes": format!("{}/{}", cp.magnitude.completed, cp.magnitude.total),
            }),
        );
    }
    js.insert(
        "readyToCalculate".to_string(),
        json!(progress.ready_to_calculate),
    );
    JSValue::Object(js)
}

fn results_to_json(report: &PriorityReport) -> Vec<JSValue> {
    report
        .results
        .iter()
        .map(|r| {
            json!({
                "rank": r.rank,
                "title": r.title,
                "finalScore": r.final_score,
                "valueWeight": r.value_weight,
                "complexityWeight": r.complexity_weight,
                "valueMagnitude": r.value_magnitude.value(),
                "complexityMagnitude": r.complexity_magnitude.value(),
                "weightedValue": r.weighted_value,
                "weightedComplexity": r.weighted_complexity,
            })
        })
        .collect()
}

fn comparisons_to_json(project: &Project) -> Vec<JSValue> {
    let titles: HashMap<ItemId, String> = project
        .items()
        .into_iter()
        .map(|i| (i.id, i.title))
        .collect();
    let title = |id: ItemId| titles.get(&id).cloned().unwrap_or_else(|| id.to_string());
    project
        .provenance()
        .iter()
        .map(|p| {
            let outcome = match p.outcome {
                Some(ComparisonOutcome::Winner(w)) => json!(title(w)),
                Some(ComparisonOutcome::Tie) => json!("tie"),
                None => JSValue::Null,
            };
            json!({
                "criterion": p.criterion.to_string(),
                "session": p.session.0,
                "itemA": title(p.item_a),
                "itemB": title(p.item_b),
                "outcome": outcome,
                "votes": p.votes,
            })
        })
        .collect()
}

fn build_summary_js(config: &SessionConfig, rules: &ScoringRules, rp: &Replay) -> JSValue {
    let (results, error) = match &rp.calculation {
        Ok(report) => (results_to_json(report), JSValue::Null),
        Err(e) => (vec![], json!(e.to_string())),
    };
    let mode = match rules.degenerate_complexity {
        DegenerateComplexityMode::Fail => "fail",
        DegenerateComplexityMode::RankLast => "rankLast",
    };
    json!({
        "config": {
            "project": config.output_settings.project_name,
            "items": rp.project.items().len(),
            "participants": rp.project.participants().len(),
            "degenerateComplexity": mode,
        },
        "progress": progress_to_json(&rp.project.progress()),
        "rejected": {
            "ballots": rp.rejected_ballots,
            "magnitudes": rp.rejected_magnitudes,
            "resets": rp.rejected_resets,
        },
        "error": error,
        "results": results,
        "comparisons": comparisons_to_json(&rp.project),
    })
}

fn write_summary(out: Option<&str>, pretty_js: &str) -> PrioResult<()> {
    match out {
        None | Some("stdout") => {
            println!("{}", pretty_js);
        }
        Some("") => {
            debug!("write_summary: no output requested");
        }
        Some(path) => {
            fs::write(path, pretty_js).context(WritingFileSnafu { path })?;
            info!("Wrote the summary to {}", path);
        }
    }
    Ok(())
}

fn check_reference(summary_js: &JSValue, reference_path: &str) -> PrioResult<()> {
    let summary_ref = read_summary(reference_path)?;
    if summary_ref == *summary_js {
        info!("The summary matches the reference {}", reference_path);
        return Ok(());
    }
    let pretty_js_summary_ref =
        serde_json::to_string_pretty(&summary_ref).context(WritingJsonSnafu {})?;
    let pretty_js_stats = serde_json::to_string_pretty(summary_js).context(WritingJsonSnafu {})?;
    warn!("Found differences with the reference string");
    print_diff(
        pretty_js_summary_ref.as_str(),
        pretty_js_stats.as_ref(),
        "\n",
    );
    ReferenceMismatchSnafu {}.fail()
}

/// Replays a session file, computes the priorities and writes the requested outputs.
pub fn run_session(config_path: &str, opts: &RunOptions) -> PrioResult<()> {
    let config_p = Path::new(config_path);
    let config = read_config(config_path)?;
    info!("config: {:?}", config);

    let rules = config.rules.scoring_rules()?;
    let root_p = config_p.parent().context(MissingParentDirSnafu {})?;

    // The command line overrides the session file.
    let out: Option<String> = match (&opts.out, &config.output_settings.output_path) {
        (Some(o), _) => Some(o.clone()),
        (None, Some(p)) => Some(resolve_path(root_p, p).display().to_string()),
        (None, None) => None,
    };
    // Events and summary cannot share stdout.
    if opts.events && matches!(out.as_deref(), None | Some("stdout")) {
        return EventsOnStdoutSnafu {}.fail();
    }

    let items = collect_items(&config, root_p)?;
    let sink: Option<Arc<dyn EventSink>> = if opts.events {
        Some(Arc::new(JsonLinesSink::new(std::io::stdout())))
    } else {
        None
    };
    let rp = replay(&config, &items, &rules, sink)?;

    let summary_js = build_summary_js(&config, &rules, &rp);
    let pretty_js_stats = serde_json::to_string_pretty(&summary_js).context(WritingJsonSnafu {})?;

    write_summary(out.as_deref(), &pretty_js_stats)?;

    if let Some(csv_p) = &opts.csv_out {
        match &rp.calculation {
            Ok(report) => write_ranking_csv(csv_p, report)?,
            Err(_) => warn!("No ranking to write to {}", csv_p),
        }
    }

    if let Some(store_p) = &opts.store {
        let store = JsonFileStore::open(store_p)?;
        rp.project.save(&store).context(EngineSnafu {
            step: "saving the project",
        })?;
        info!("Saved {} in {}", rp.project.id(), store_p);
    }

    // The reference summary, if provided for comparison
    if let Some(summary_p) = &opts.reference {
        check_reference(&summary_js, summary_p)?;
    }

    Ok(())
}

fn run_session_test(test_name: &str, config_lpath: &str, summary_lpath: &str) {
    let test_dir = option_env!("PRIO_TEST_DIR").unwrap_or(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/testdata"
    ));
    info!("Running test {}", test_name);
    let opts = RunOptions {
        reference: Some(format!("{}/{}/{}", test_dir, test_name, summary_lpath)),
        out: Some("".to_string()),
        ..RunOptions::default()
    };
    let res = run_session(
        format!("{}/{}/{}", test_dir, test_name, config_lpath).as_str(),
        &opts,
    );
    if let Err(e) = res {
        warn!("Error occured {:?}", e);
        panic!("test {} failed: {}", test_name, e);
    }
}

pub fn test_wrapper(test_name: &str) {
    run_session_test(
        test_name,
        format!("{}_config.json", test_name).as_str(),
        format!("{}_expected_summary.json", test_name).as_str(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn three_items() {
        init();
        test_wrapper("three_items");
    }

    #[test]
    fn reset_revote() {
        init();
        test_wrapper("reset_revote");
    }

    #[test]
    fn rank_last() {
        init();
        test_wrapper("rank_last");
    }

    #[test]
    fn incomplete() {
        init();
        test_wrapper("incomplete");
    }

    #[test]
    fn outputs_and_store() {
        init();
        let dir = tempfile::tempdir().unwrap();
        let out = |name: &str| dir.path().join(name).display().to_string();
        let opts = RunOptions {
            reference: None,
            out: Some(out("summary.json")),
            csv_out: Some(out("ranking.csv")),
            store: Some(out("store")),
            events: false,
        };
        let config = concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/testdata/three_items/three_items_config.json"
        );
        run_session(config, &opts).unwrap();

        let summary = read_summary(&out("summary.json")).unwrap();
        assert_eq!(summary["results"][0]["title"], "A");
        let csv = fs::read_to_string(out("ranking.csv")).unwrap();
        assert_eq!(csv.lines().count(), 4);
        assert!(csv.lines().nth(1).unwrap().starts_with("1,A,3.2,"));

        let store = JsonFileStore::open(&out("store")).unwrap();
        let project = Project::load(&store, &ProjectId("three-items".to_string()))
            .unwrap()
            .unwrap();
        assert!(project.progress().ready_to_calculate);
        assert_eq!(project.report().unwrap().results.len(), 3);
    }

    #[test]
    fn mismatching_reference() {
        init();
        let dir = tempfile::tempdir().unwrap();
        let reference = dir.path().join("ref.json");
        fs::write(&reference, "{\"results\": []}").unwrap();
        let opts = RunOptions {
            reference: Some(reference.display().to_string()),
            out: Some("".to_string()),
            ..RunOptions::default()
        };
        let config = concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/testdata/three_items/three_items_config.json"
        );
        assert!(matches!(
            run_session(config, &opts),
            Err(PrioError::ReferenceMismatch {})
        ));
    }

    #[test]
    fn events_need_the_summary_in_a_file() {
        init();
        let config = concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/testdata/three_items/three_items_config.json"
        );
        for out in [None, Some("stdout".to_string())] {
            let opts = RunOptions {
                out,
                events: true,
                ..RunOptions::default()
            };
            assert!(matches!(
                run_session(config, &opts),
                Err(PrioError::EventsOnStdout {})
            ));
        }

        let dir = tempfile::tempdir().unwrap();
        let summary = dir.path().join("summary.json").display().to_string();
        let opts = RunOptions {
            out: Some(summary.clone()),
            events: true,
            ..RunOptions::default()
        };
        run_session(config, &opts).unwrap();
        assert_eq!(read_summary(&summary).unwrap()["error"], JSValue::Null);
    }

    #[test]
    fn unknown_names_are_fatal() {
        init();
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("bad_config.json");
        fs::write(
            &config,
            r#"{
                "outputSettings": { "projectName": "Bad" },
                "items": [ { "title": "A" }, { "title": "B" } ],
                "participants": [ { "name": "Ana" } ],
                "ballots": [
                    { "participant": "Zed", "criterion": "value",
                      "itemA": "A", "itemB": "B", "choice": "tie" }
                ]
            }"#,
        )
        .unwrap();
        let opts = RunOptions {
            out: Some("".to_string()),
            ..RunOptions::default()
        };
        match run_session(config.to_str().unwrap(), &opts) {
            Err(PrioError::Whatever { message, .. }) => assert!(message.contains("Zed")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
