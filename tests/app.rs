use std::fs;
use std::sync::Mutex;

use camino::Utf8PathBuf;

use kira_sra_digest::app::{App, CancelToken, ProgressEvent, ProgressSink, inspect, list_groups};
use kira_sra_digest::config::{Config, ConfigLoader, ConfigOverrides, ResolvedConfig};
use kira_sra_digest::domain::{Record, RecordKind};
use kira_sra_digest::error::IssueKind;
use kira_sra_digest::filter::RejectReason;
use kira_sra_digest::output::JsonOutput;

fn corpus_root() -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{}/tests/fixtures/corpus", env!("CARGO_MANIFEST_DIR")))
}

fn config_for(output: Utf8PathBuf) -> ResolvedConfig {
    ConfigLoader::resolve_config(
        Config::default(),
        &ConfigOverrides {
            input: Some(corpus_root()),
            output: Some(output),
            workers: Some(2),
            ..ConfigOverrides::default()
        },
    )
    .unwrap()
}

fn temp_output() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().join("out")).unwrap();
    (temp, root)
}

#[derive(Default)]
struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.messages.lock().unwrap().push(event.message);
    }
}

#[test]
fn run_over_fixture_corpus() {
    let (_temp, output) = temp_output();
    let app = App::new(config_for(output.clone())).unwrap();
    let sink = RecordingSink::default();

    let summary = app.run(&CancelToken::new(), &sink).unwrap();

    assert_eq!(summary.groups_seen, 6);
    assert_eq!(summary.groups_processed, 5);
    assert_eq!(summary.groups_skipped, 1);
    assert_eq!(summary.groups_failed, 0);
    assert_eq!(summary.groups_not_started, 0);
    assert_eq!(summary.studies_seen, 5);
    assert_eq!(summary.accepted, 1);
    assert_eq!(summary.rejected[&RejectReason::TooFewSamples], 2);
    assert_eq!(summary.rejected[&RejectReason::MissingStudyFields], 1);
    assert_eq!(summary.rejected[&RejectReason::NoAllowedOrganism], 1);
    assert_eq!(summary.errors[&IssueKind::OrphanRecord], 2);
    assert_eq!(summary.errors[&IssueKind::IncompleteGroup], 1);
    assert_eq!(summary.errors[&IssueKind::ParseFailure], 1);
    assert!(!summary.cancelled);
    assert!(summary.finished_at.is_some());

    let messages = sink.messages.lock().unwrap();
    assert!(messages.first().unwrap().starts_with("phase=Discover"));
    assert!(messages.last().unwrap().starts_with("phase=Done"));

    let written: Vec<String> = fs::read_dir(output.as_std_path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(written.len(), 2);
    assert!(written.contains(&"SRP000001.json".to_string()));
    assert!(written.contains(&"run-summary.json".to_string()));
}

#[test]
fn accepted_document_matches_expected_shape() {
    let (_temp, output) = temp_output();
    let app = App::new(config_for(output.clone())).unwrap();
    app.run(&CancelToken::new(), &JsonOutput).unwrap();

    let content = fs::read_to_string(output.join("SRP000001.json").as_std_path()).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&content).unwrap();

    assert_eq!(doc["bioproject"], "PRJNA100001");
    assert_eq!(doc["study"]["study_type"], "Transcriptome Analysis");
    assert_eq!(doc["organisms"][0]["name"], "Homo sapiens");
    assert_eq!(doc["organisms"][0]["count"], 3);
    assert_eq!(doc["samples"].as_array().unwrap().len(), 3);
    assert_eq!(doc["experiments"].as_array().unwrap().len(), 3);
    assert_eq!(doc["runs"].as_array().unwrap().len(), 3);

    let entries = doc["sample_attributes"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["count"], 2);
    assert_eq!(entries[0]["attributes"][0]["value"], "liver");
    assert_eq!(entries[1]["count"], 1);
    assert_eq!(doc["samples"][1]["attribute_set"], 0);
    assert_eq!(doc["samples"][2]["attribute_set"], 1);

    let summary = doc["attribute_summary"].as_array().unwrap();
    assert_eq!(summary[0]["key"], "tissue");
    assert_eq!(summary[0]["values"][0]["count"], 2);

    let run_sets = doc["run_attributes"].as_array().unwrap();
    assert_eq!(run_sets.len(), 2);
    assert_eq!(run_sets[0]["count"], 2);
}

#[test]
fn cancelled_before_start_processes_nothing() {
    let (_temp, output) = temp_output();
    let app = App::new(config_for(output.clone())).unwrap();
    let cancel = CancelToken::new();
    cancel.cancel();

    let summary = app.run(&cancel, &JsonOutput).unwrap();
    assert!(summary.cancelled);
    assert_eq!(summary.groups_not_started, 6);
    assert_eq!(summary.accepted, 0);
    assert!(!output.join("SRP000001.json").as_std_path().exists());
    assert!(output.join("run-summary.json").as_std_path().exists());
}

#[test]
fn limit_restricts_groups() {
    let (_temp, output) = temp_output();
    let mut config = config_for(output);
    config.limit = Some(2);
    let app = App::new(config).unwrap();
    let summary = app.run(&CancelToken::new(), &JsonOutput).unwrap();
    assert_eq!(summary.groups_seen, 2);
    assert_eq!(summary.accepted, 1);
}

#[test]
fn reruns_overwrite_instead_of_duplicating() {
    let (_temp, output) = temp_output();
    let app = App::new(config_for(output.clone())).unwrap();
    app.run(&CancelToken::new(), &JsonOutput).unwrap();
    let first = fs::read_to_string(output.join("SRP000001.json").as_std_path()).unwrap();
    app.run(&CancelToken::new(), &JsonOutput).unwrap();
    let second = fs::read_to_string(output.join("SRP000001.json").as_std_path()).unwrap();
    assert_eq!(first, second);
    assert_eq!(fs::read_dir(output.as_std_path()).unwrap().count(), 2);
}

#[test]
fn single_worker_matches_parallel_run() {
    let (_temp, output) = temp_output();
    let mut config = config_for(output);
    config.workers = 1;
    let summary = App::new(config).unwrap().run(&CancelToken::new(), &JsonOutput).unwrap();
    assert_eq!(summary.accepted, 1);
    assert_eq!(summary.groups_processed, 5);
}

#[test]
fn inspect_detects_kind_from_name() {
    let path = corpus_root().join("SRA000002/SRA000002.sample.xml");
    let result = inspect(&path, None, 0).unwrap();
    assert_eq!(result.kind, RecordKind::Sample);
    assert_eq!(result.records.len(), 1);
    assert!(matches!(&result.records[0], Record::Sample(sample) if sample.taxon_id == Some(10090)));
}

#[test]
fn groups_listing_marks_incomplete_groups() {
    let result = list_groups(&corpus_root()).unwrap();
    assert_eq!(result.groups.len(), 6);
    let incomplete: Vec<&str> = result
        .groups
        .iter()
        .filter(|group| !group.complete)
        .map(|group| group.label.as_str())
        .collect();
    assert_eq!(incomplete, vec!["SRA000005"]);
}
