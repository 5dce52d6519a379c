use std::fmt;
use std::path::PathBuf;

use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum KiraError {
    #[error("missing config file kira-sra.json in current directory")]
    #[diagnostic(help("pass --config, or both --input and --output"))]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid corpus root {path}: {reason}")]
    InvalidRoot { path: PathBuf, reason: String },

    #[error("invalid accession: {0:?}")]
    InvalidAccession(String),

    #[error("invalid organism pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("unknown record kind: {0}")]
    UnknownKind(String),

    #[error("malformed XML in {path}: {message}")]
    ParseFailure { path: String, message: String },

    #[error("could not read {path} after {attempts} attempt(s): {message}")]
    TransientIo {
        path: PathBuf,
        attempts: usize,
        message: String,
    },

    #[error("could not commit output {path}: {message}")]
    WriteFailure { path: PathBuf, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to start worker pool: {0}")]
    WorkerPool(String),
}

impl KiraError {
    pub fn issue_kind(&self) -> Option<IssueKind> {
        match self {
            KiraError::ParseFailure { .. } => Some(IssueKind::ParseFailure),
            KiraError::TransientIo { .. } => Some(IssueKind::TransientIo),
            KiraError::WriteFailure { .. } => Some(IssueKind::WriteFailure),
            _ => None,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            KiraError::MissingConfig
                | KiraError::ConfigRead(_)
                | KiraError::ConfigParse(_)
                | KiraError::InvalidRoot { .. }
                | KiraError::InvalidPattern { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    ParseFailure,
    MissingAccession,
    IncompleteGroup,
    OrphanRecord,
    TransientIo,
    WriteFailure,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            IssueKind::ParseFailure => "parse_failure",
            IssueKind::MissingAccession => "missing_accession",
            IssueKind::IncompleteGroup => "incomplete_group",
            IssueKind::OrphanRecord => "orphan_record",
            IssueKind::TransientIo => "transient_io",
            IssueKind::WriteFailure => "write_failure",
        };
        write!(f, "{label}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_config_errors_are_fatal() {
        assert!(KiraError::MissingConfig.is_fatal());
        assert!(
            KiraError::InvalidRoot {
                path: PathBuf::from("/nope"),
                reason: "missing".to_string(),
            }
            .is_fatal()
        );
        let parse = KiraError::ParseFailure {
            path: "SRP1.sample.xml".to_string(),
            message: "bad".to_string(),
        };
        assert!(!parse.is_fatal());
        assert_eq!(parse.issue_kind(), Some(IssueKind::ParseFailure));
    }
}
