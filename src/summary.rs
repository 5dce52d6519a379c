use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use chrono::Utc;
use serde::Serialize;

use crate::domain::StudyAccession;
use crate::error::IssueKind;
use crate::filter::RejectReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    Processed,
    Skipped,
    Failed,
    NotStarted,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupOutcome {
    pub group: String,
    pub status: GroupStatus,
    pub studies_seen: usize,
    pub accepted: Vec<StudyAccession>,
    pub rejected: Vec<(StudyAccession, RejectReason)>,
    pub issues: BTreeMap<IssueKind, usize>,
    pub written: Vec<Utf8PathBuf>,
}

impl GroupOutcome {
    pub fn new(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            status: GroupStatus::Processed,
            studies_seen: 0,
            accepted: Vec::new(),
            rejected: Vec::new(),
            issues: BTreeMap::new(),
            written: Vec::new(),
        }
    }

    pub fn not_started(group: impl Into<String>) -> Self {
        Self {
            status: GroupStatus::NotStarted,
            ..Self::new(group)
        }
    }

    pub fn issue(&mut self, kind: IssueKind) {
        self.add_issues(kind, 1);
    }

    pub fn add_issues(&mut self, kind: IssueKind, count: usize) {
        if count > 0 {
            *self.issues.entry(kind).or_insert(0) += count;
        }
    }

    pub fn issue_count(&self, kind: IssueKind) -> usize {
        self.issues.get(&kind).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub groups_total: usize,
    pub groups_done: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: String,
    pub finished_at: Option<String>,
    pub groups_seen: usize,
    pub groups_processed: usize,
    pub groups_skipped: usize,
    pub groups_failed: usize,
    pub groups_not_started: usize,
    pub studies_seen: usize,
    pub accepted: usize,
    pub rejected: BTreeMap<RejectReason, usize>,
    pub errors: BTreeMap<IssueKind, usize>,
    pub cancelled: bool,
    pub output: Option<Utf8PathBuf>,
}

impl RunSummary {
    pub fn start(groups_seen: usize) -> Self {
        Self {
            started_at: Utc::now().to_rfc3339(),
            finished_at: None,
            groups_seen,
            groups_processed: 0,
            groups_skipped: 0,
            groups_failed: 0,
            groups_not_started: 0,
            studies_seen: 0,
            accepted: 0,
            rejected: BTreeMap::new(),
            errors: BTreeMap::new(),
            cancelled: false,
            output: None,
        }
    }

    pub fn record(&mut self, outcome: &GroupOutcome) {
        match outcome.status {
            GroupStatus::Processed => self.groups_processed += 1,
            GroupStatus::Skipped => self.groups_skipped += 1,
            GroupStatus::Failed => self.groups_failed += 1,
            GroupStatus::NotStarted => self.groups_not_started += 1,
        }
        self.studies_seen += outcome.studies_seen;
        self.accepted += outcome.accepted.len();
        for (_, reason) in &outcome.rejected {
            *self.rejected.entry(*reason).or_insert(0) += 1;
        }
        for (kind, count) in &outcome.issues {
            *self.errors.entry(*kind).or_insert(0) += count;
        }
    }

    pub fn finish(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
        self.finished_at = Some(Utc::now().to_rfc3339());
    }

    pub fn rejected_total(&self) -> usize {
        self.rejected.values().sum()
    }

    pub fn error_total(&self) -> usize {
        self.errors.values().sum()
    }

    pub fn groups_done(&self) -> usize {
        self.groups_processed + self.groups_skipped + self.groups_failed + self.groups_not_started
    }

    pub fn tally(&self) -> Tally {
        Tally {
            groups_total: self.groups_seen,
            groups_done: self.groups_done(),
            accepted: self.accepted,
            rejected: self.rejected_total(),
            errors: self.error_total(),
        }
    }
}
