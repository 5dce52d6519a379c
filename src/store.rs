use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tempfile::Builder;
use tracing::{debug, warn};

use crate::document::StudyDocument;
use crate::domain::StudyAccession;
use crate::error::KiraError;
use crate::summary::RunSummary;

pub const SUMMARY_FILE: &str = "run-summary.json";

const WRITE_ATTEMPTS: usize = 2;

#[derive(Debug, Clone)]
pub struct OutputStore {
    root: Utf8PathBuf,
    pretty: bool,
}

impl OutputStore {
    pub fn new(root: Utf8PathBuf, pretty: bool) -> Self {
        Self { root, pretty }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn ensure_root(&self) -> Result<(), KiraError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| KiraError::Filesystem(format!("{}: {err}", self.root)))
    }

    pub fn study_path(&self, accession: &StudyAccession) -> Utf8PathBuf {
        self.root.join(format!("{}.json", accession.as_str()))
    }

    pub fn summary_path(&self) -> Utf8PathBuf {
        self.root.join(SUMMARY_FILE)
    }

    // Commits `<root>/<accession>.json`. A reader never sees a partial file.
    pub fn write_study(&self, document: &StudyDocument) -> Result<Utf8PathBuf, KiraError> {
        let path = self.study_path(&document.accession);
        self.write_with_retry(&path, document)?;
        Ok(path)
    }

    pub fn write_summary(&self, summary: &RunSummary) -> Result<Utf8PathBuf, KiraError> {
        let path = self.summary_path();
        self.write_with_retry(&path, summary)?;
        Ok(path)
    }

    fn write_with_retry<T: Serialize>(&self, path: &Utf8Path, value: &T) -> Result<(), KiraError> {
        let mut attempt = 1usize;
        loop {
            match write_json_atomic(path, value, self.pretty) {
                Ok(()) => {
                    debug!(path = %path, "output committed");
                    return Ok(());
                }
                Err(message) if attempt < WRITE_ATTEMPTS => {
                    warn!(path = %path, error = %message, "write failed, retrying");
                    attempt += 1;
                }
                Err(message) => {
                    return Err(KiraError::WriteFailure {
                        path: path.as_std_path().to_path_buf(),
                        message,
                    });
                }
            }
        }
    }
}

fn write_json_atomic<T: Serialize>(path: &Utf8Path, value: &T, pretty: bool) -> Result<(), String> {
    let parent = path
        .parent()
        .ok_or_else(|| "invalid destination path".to_string())?;
    fs::create_dir_all(parent.as_std_path()).map_err(|err| err.to_string())?;

    let bytes = if pretty {
        serde_json::to_vec_pretty(value)
    } else {
        serde_json::to_vec(value)
    }
    .map_err(|err| err.to_string())?;

    let mut temp = Builder::new()
        .prefix(".kira-sra")
        .suffix(".tmp")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| err.to_string())?;
    temp.write_all(&bytes).map_err(|err| err.to_string())?;
    temp.write_all(b"\n").map_err(|err| err.to_string())?;
    temp.as_file().sync_all().map_err(|err| err.to_string())?;
    temp.persist(path.as_std_path())
        .map_err(|err| err.error.to_string())?;
    Ok(())
}
