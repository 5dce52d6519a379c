use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::assemble::assemble;
use crate::config::ResolvedConfig;
use crate::dedup::DedupedStudy;
use crate::document::StudyDocument;
use crate::domain::{
    ExperimentRecord, Record, RecordKind, RunRecord, SampleRecord, StudyRecord,
};
use crate::error::{IssueKind, KiraError};
use crate::extract::{Extraction, RecordIssue, extract_records};
use crate::filter::{StudyFilter, Verdict};
use crate::store::OutputStore;
use crate::summary::{GroupOutcome, GroupStatus, RunSummary, Tally};
use crate::walker::{FileGroup, discover_groups, read_file};

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
    pub tally: Option<Tally>,
}

impl ProgressEvent {
    fn phase(phase: &str, detail: impl AsRef<str>) -> Self {
        Self {
            message: format!("phase={phase}; {}", detail.as_ref()),
            elapsed: None,
            tally: None,
        }
    }
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

// Shared stop flag. Once set, no further group is started; groups already
// in flight run to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InspectResult {
    pub path: Utf8PathBuf,
    pub kind: RecordKind,
    pub records: Vec<Record>,
    pub issues: Vec<RecordIssue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupsResult {
    pub root: Utf8PathBuf,
    pub groups: Vec<GroupListing>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupListing {
    pub key: String,
    pub label: String,
    pub complete: bool,
    pub studies: usize,
    pub samples: usize,
    pub experiments: usize,
    pub runs: usize,
    pub ignored: usize,
}

impl From<&FileGroup> for GroupListing {
    fn from(group: &FileGroup) -> Self {
        Self {
            key: group.key.clone(),
            label: group.label.clone(),
            complete: group.has_study(),
            studies: group.studies.len(),
            samples: group.samples.len(),
            experiments: group.experiments.len(),
            runs: group.runs.len(),
            ignored: group.ignored,
        }
    }
}

#[derive(Debug, Default)]
struct GroupRecords {
    studies: Vec<StudyRecord>,
    samples: Vec<SampleRecord>,
    experiments: Vec<ExperimentRecord>,
    runs: Vec<RunRecord>,
}

impl GroupRecords {
    fn extend(&mut self, records: Vec<Record>) {
        for record in records {
            match record {
                Record::Study(study) => self.studies.push(study),
                Record::Sample(sample) => self.samples.push(sample),
                Record::Experiment(experiment) => self.experiments.push(experiment),
                Record::Run(run) => self.runs.push(run),
            }
        }
    }
}

pub struct App {
    config: ResolvedConfig,
    filter: StudyFilter,
    store: OutputStore,
}

impl App {
    pub fn new(config: ResolvedConfig) -> Result<Self, KiraError> {
        let filter = StudyFilter::new(&config.filter)?;
        let store = OutputStore::new(config.output.clone(), config.pretty);
        Ok(Self {
            config,
            filter,
            store,
        })
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn run(&self, cancel: &CancelToken, sink: &dyn ProgressSink) -> Result<RunSummary, KiraError> {
        let started = Instant::now();
        sink.event(ProgressEvent::phase("Discover", format!("scanning {}", self.config.input)));

        let mut groups = discover_groups(&self.config.input)?;
        if let Some(limit) = self.config.limit {
            groups.truncate(limit);
        }
        self.store.ensure_root()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .build()
            .map_err(|err| KiraError::WorkerPool(err.to_string()))?;

        info!(
            groups = groups.len(),
            workers = self.config.workers,
            input = %self.config.input,
            output = %self.config.output,
            "run started"
        );
        let mut summary = RunSummary::start(groups.len());
        sink.event(ProgressEvent {
            tally: Some(summary.tally()),
            ..ProgressEvent::phase("Process", format!("{} groups", groups.len()))
        });

        let (tx, rx) = mpsc::channel::<GroupOutcome>();
        let groups = &groups;
        let pool = &pool;
        thread::scope(|scope| {
            scope.spawn(move || {
                pool.install(|| {
                    groups.par_iter().for_each_with(tx, |tx, group| {
                        let outcome = if cancel.is_cancelled() {
                            GroupOutcome::not_started(&group.key)
                        } else {
                            self.process_group(group)
                        };
                        // The receiver only disappears if the coordinator panicked.
                        let _ = tx.send(outcome);
                    });
                });
            });

            for outcome in rx {
                summary.record(&outcome);
                sink.event(ProgressEvent {
                    message: format!("phase=Group; {} {:?}", outcome.group, outcome.status),
                    elapsed: Some(started.elapsed()),
                    tally: Some(summary.tally()),
                });
            }
        });

        summary.finish(cancel.is_cancelled());
        summary.output = Some(self.store.root().to_path_buf());
        if let Err(err) = self.store.write_summary(&summary) {
            warn!(error = %err, "run summary not written");
        }

        info!(
            accepted = summary.accepted,
            rejected = summary.rejected_total(),
            errors = summary.error_total(),
            cancelled = summary.cancelled,
            "run finished"
        );
        sink.event(ProgressEvent {
            message: "phase=Done; run finished".to_string(),
            elapsed: Some(started.elapsed()),
            tally: Some(summary.tally()),
        });
        Ok(summary)
    }

    pub fn process_group(&self, group: &FileGroup) -> GroupOutcome {
        let mut outcome = GroupOutcome::new(&group.key);
        if !group.has_study() {
            warn!(group = %group.key, "no study file in group, skipping");
            outcome.status = GroupStatus::Skipped;
            outcome.issue(IssueKind::IncompleteGroup);
            return outcome;
        }

        let mut records = GroupRecords::default();
        for kind in [
            RecordKind::Study,
            RecordKind::Sample,
            RecordKind::Experiment,
            RecordKind::Run,
        ] {
            for path in group.files(kind) {
                match self.extract_file(path, kind) {
                    Ok(extraction) => {
                        for issue in &extraction.issues {
                            debug!(path = %path, detail = %issue.detail, "{}", issue.kind);
                            outcome.issue(issue.kind);
                        }
                        records.extend(extraction.records);
                    }
                    Err(err) => {
                        warn!(group = %group.key, path = %path, error = %err, "file skipped");
                        outcome.issue(err.issue_kind().unwrap_or(IssueKind::ParseFailure));
                    }
                }
            }
        }

        if records.studies.is_empty() {
            warn!(group = %group.key, "no usable study record in group");
            outcome.status = GroupStatus::Failed;
            return outcome;
        }

        let assembly = assemble(
            records.studies,
            records.samples,
            records.experiments,
            records.runs,
        );
        for note in &assembly.orphans {
            debug!(group = %group.key, kind = %note.kind, accession = %note.accession, reason = %note.reason, "orphan dropped");
        }
        outcome.add_issues(IssueKind::OrphanRecord, assembly.orphan_count());
        outcome.studies_seen = assembly.studies.len();

        for assembled in assembly.studies {
            let accession = assembled.study.accession.clone();
            let study = DedupedStudy::from_assembled(assembled, &self.config.summary);
            match self.filter.evaluate(&study) {
                Verdict::Accept(organisms) => {
                    let document = StudyDocument::new(study, organisms);
                    match self.store.write_study(&document) {
                        Ok(path) => {
                            debug!(study = %accession, path = %path, "study accepted");
                            outcome.accepted.push(accession);
                            outcome.written.push(path);
                        }
                        Err(err) => {
                            warn!(study = %accession, error = %err, "study not written");
                            outcome.issue(IssueKind::WriteFailure);
                            outcome.status = GroupStatus::Failed;
                        }
                    }
                }
                Verdict::Reject(reason) => {
                    debug!(study = %accession, %reason, "study rejected");
                    outcome.rejected.push((accession, reason));
                }
            }
        }
        outcome
    }

    fn extract_file(&self, path: &Utf8Path, kind: RecordKind) -> Result<Extraction, KiraError> {
        let bytes = read_file(path, self.config.max_read_retries)?;
        extract_records(bytes.as_slice(), kind, path.as_str())
    }
}

pub fn list_groups(root: &Utf8Path) -> Result<GroupsResult, KiraError> {
    let groups = discover_groups(root)?;
    Ok(GroupsResult {
        root: root.to_path_buf(),
        groups: groups.iter().map(GroupListing::from).collect(),
    })
}

pub fn inspect(
    path: &Utf8Path,
    kind: Option<RecordKind>,
    max_retries: usize,
) -> Result<InspectResult, KiraError> {
    let kind = match kind {
        Some(kind) => kind,
        None => RecordKind::from_file_name(path.as_std_path())
            .ok_or_else(|| KiraError::UnknownKind(path.to_string()))?,
    };
    let bytes = read_file(path, max_retries)?;
    let extraction = extract_records(bytes.as_slice(), kind, path.as_str())?;
    Ok(InspectResult {
        path: path.to_path_buf(),
        kind,
        records: extraction.records,
        issues: extraction.issues,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn group_without_study_is_skipped() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let config = crate::config::ConfigLoader::resolve_config(
            crate::config::Config::default(),
            &crate::config::ConfigOverrides {
                input: Some(root.clone()),
                output: Some(root.join("out")),
                ..Default::default()
            },
        )
        .unwrap();
        let app = App::new(config).unwrap();
        let group = FileGroup {
            key: "SRA1".to_string(),
            label: "SRA1".to_string(),
            samples: vec![root.join("SRA1.sample.xml")],
            ..FileGroup::default()
        };

        let outcome = app.process_group(&group);
        assert_eq!(outcome.status, GroupStatus::Skipped);
        assert_eq!(outcome.issue_count(IssueKind::IncompleteGroup), 1);
    }
}
