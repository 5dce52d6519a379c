use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::thread;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::MultiGzDecoder;
use serde::Serialize;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::domain::{RecordKind, split_file_name};
use crate::error::KiraError;

const BASE_DELAY_MS: u64 = 50;

#[derive(Debug, Clone, Default, Serialize)]
pub struct FileGroup {
    pub key: String,
    pub label: String,
    pub studies: Vec<Utf8PathBuf>,
    pub samples: Vec<Utf8PathBuf>,
    pub experiments: Vec<Utf8PathBuf>,
    pub runs: Vec<Utf8PathBuf>,
    pub ignored: usize,
}

impl FileGroup {
    fn new(key: String, label: String) -> Self {
        Self {
            key,
            label,
            ..Self::default()
        }
    }

    pub fn files(&self, kind: RecordKind) -> &[Utf8PathBuf] {
        match kind {
            RecordKind::Study => &self.studies,
            RecordKind::Sample => &self.samples,
            RecordKind::Experiment => &self.experiments,
            RecordKind::Run => &self.runs,
            RecordKind::Analysis | RecordKind::Submission => &[],
        }
    }

    pub fn has_study(&self) -> bool {
        !self.studies.is_empty()
    }

    pub fn file_count(&self) -> usize {
        self.studies.len() + self.samples.len() + self.experiments.len() + self.runs.len()
    }

    fn push(&mut self, kind: RecordKind, path: Utf8PathBuf) {
        match kind {
            RecordKind::Study => self.studies.push(path),
            RecordKind::Sample => self.samples.push(path),
            RecordKind::Experiment => self.experiments.push(path),
            RecordKind::Run => self.runs.push(path),
            RecordKind::Analysis | RecordKind::Submission => self.ignored += 1,
        }
    }
}

pub fn discover_groups(root: &Utf8Path) -> Result<Vec<FileGroup>, KiraError> {
    validate_root(root)?;

    let mut groups: BTreeMap<String, FileGroup> = BTreeMap::new();
    for entry in WalkDir::new(root.as_std_path()).follow_links(true).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "skipping unreadable corpus entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some((prefix, kind)) = split_file_name(entry.path()) else {
            continue;
        };
        let path = match Utf8PathBuf::from_path_buf(entry.into_path()) {
            Ok(path) => path,
            Err(path) => {
                warn!(path = %path.display(), "skipping non UTF-8 path");
                continue;
            }
        };

        let relative_dir = path
            .parent()
            .and_then(|parent| parent.strip_prefix(root).ok())
            .map(|dir| dir.as_str().to_string())
            .unwrap_or_default();
        let key = group_key(&relative_dir, &prefix);
        let label = group_label(root, &relative_dir, &prefix);

        groups
            .entry(key.clone())
            .or_insert_with(|| FileGroup::new(key, label))
            .push(kind, path);
    }

    let groups: Vec<FileGroup> = groups.into_values().collect();
    debug!(root = %root, groups = groups.len(), "corpus discovered");
    Ok(groups)
}

fn validate_root(root: &Utf8Path) -> Result<(), KiraError> {
    let metadata = std::fs::metadata(root.as_std_path()).map_err(|err| KiraError::InvalidRoot {
        path: root.as_std_path().to_path_buf(),
        reason: err.to_string(),
    })?;
    if !metadata.is_dir() {
        return Err(KiraError::InvalidRoot {
            path: root.as_std_path().to_path_buf(),
            reason: "not a directory".to_string(),
        });
    }
    Ok(())
}

fn group_key(relative_dir: &str, prefix: &str) -> String {
    match (relative_dir.is_empty(), prefix.is_empty()) {
        (true, _) => prefix.to_string(),
        (false, true) => relative_dir.to_string(),
        (false, false) => format!("{relative_dir}/{prefix}"),
    }
}

fn group_label(root: &Utf8Path, relative_dir: &str, prefix: &str) -> String {
    if !prefix.is_empty() {
        return prefix.to_string();
    }
    Utf8Path::new(relative_dir)
        .file_name()
        .or_else(|| root.file_name())
        .unwrap_or(".")
        .to_string()
}

pub fn read_file(path: &Utf8Path, max_retries: usize) -> Result<Vec<u8>, KiraError> {
    read_with_retry(path, max_retries, read_once)
}

fn read_with_retry<F>(
    path: &Utf8Path,
    max_retries: usize,
    mut read: F,
) -> Result<Vec<u8>, KiraError>
where
    F: FnMut(&Utf8Path) -> io::Result<Vec<u8>>,
{
    let mut attempt = 0usize;
    loop {
        match read(path) {
            Ok(bytes) => return Ok(bytes),
            Err(err) => {
                if is_corrupt_archive(path, &err) {
                    return Err(KiraError::ParseFailure {
                        path: path.to_string(),
                        message: format!("corrupt gzip stream: {err}"),
                    });
                }
                if attempt < max_retries && is_retryable_io(&err) {
                    let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                    debug!(path = %path, attempt = attempt + 1, "read retry");
                    thread::sleep(Duration::from_millis(delay));
                    attempt += 1;
                    continue;
                }
                return Err(KiraError::TransientIo {
                    path: path.as_std_path().to_path_buf(),
                    attempts: attempt + 1,
                    message: err.to_string(),
                });
            }
        }
    }
}

fn read_once(path: &Utf8Path) -> io::Result<Vec<u8>> {
    let file = File::open(path.as_std_path())?;
    let mut bytes = Vec::new();
    if is_gzip(path) {
        MultiGzDecoder::new(BufReader::new(file)).read_to_end(&mut bytes)?;
    } else {
        BufReader::new(file).read_to_end(&mut bytes)?;
    }
    Ok(bytes)
}

fn is_gzip(path: &Utf8Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false)
}

fn is_corrupt_archive(path: &Utf8Path, err: &io::Error) -> bool {
    is_gzip(path)
        && matches!(
            err.kind(),
            io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput | io::ErrorKind::UnexpectedEof
        )
}

fn is_retryable_io(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
            | io::ErrorKind::ResourceBusy
    )
}
