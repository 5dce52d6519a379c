use std::fmt;
use std::path::Path;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::KiraError;

macro_rules! accession_type {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = KiraError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                let normalized = value.trim();
                let is_valid = !normalized.is_empty()
                    && normalized
                        .chars()
                        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.'));
                if !is_valid {
                    return Err(KiraError::InvalidAccession(value.to_string()));
                }
                Ok(Self(normalized.to_string()))
            }
        }
    };
}

accession_type!(StudyAccession);
accession_type!(SampleAccession);
accession_type!(ExperimentAccession);
accession_type!(RunAccession);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Study,
    Sample,
    Experiment,
    Run,
    Analysis,
    Submission,
}

impl RecordKind {
    pub fn element(self) -> &'static str {
        match self {
            RecordKind::Study => "STUDY",
            RecordKind::Sample => "SAMPLE",
            RecordKind::Experiment => "EXPERIMENT",
            RecordKind::Run => "RUN",
            RecordKind::Analysis => "ANALYSIS",
            RecordKind::Submission => "SUBMISSION",
        }
    }

    pub fn is_extracted(self) -> bool {
        !matches!(self, RecordKind::Analysis | RecordKind::Submission)
    }

    pub fn from_file_name(path: &Path) -> Option<Self> {
        let (_, kind) = split_file_name(path)?;
        Some(kind)
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Study => write!(f, "study"),
            RecordKind::Sample => write!(f, "sample"),
            RecordKind::Experiment => write!(f, "experiment"),
            RecordKind::Run => write!(f, "run"),
            RecordKind::Analysis => write!(f, "analysis"),
            RecordKind::Submission => write!(f, "submission"),
        }
    }
}

impl FromStr for RecordKind {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "study" => Ok(RecordKind::Study),
            "sample" => Ok(RecordKind::Sample),
            "experiment" => Ok(RecordKind::Experiment),
            "run" => Ok(RecordKind::Run),
            "analysis" => Ok(RecordKind::Analysis),
            "submission" => Ok(RecordKind::Submission),
            _ => Err(KiraError::UnknownKind(value.to_string())),
        }
    }
}

// Splits a corpus file name into its group prefix and record kind.
// `SRP1.sample.xml.gz` gives `("SRP1", Sample)`, `study.xml` gives `("", Study)`.
pub fn split_file_name(path: &Path) -> Option<(String, RecordKind)> {
    let name = path.file_name()?.to_str()?;
    let lower = name.to_ascii_lowercase();
    let lower = lower.strip_suffix(".gz").unwrap_or(&lower);
    let stem = lower.strip_suffix(".xml")?;
    let (prefix_len, suffix) = match stem.rsplit_once('.') {
        Some((prefix, suffix)) => (prefix.len(), suffix),
        None => (0, stem),
    };
    let kind = suffix.parse().ok()?;
    Some((name[..prefix_len].to_string(), kind))
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Attribute {
    pub key: String,
    pub value: String,
}

impl Attribute {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StudyLink {
    Xref { db: String, id: String },
    Url { label: Option<String>, url: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudyRecord {
    pub accession: StudyAccession,
    pub bioproject: Option<String>,
    pub title: Option<String>,
    #[serde(rename = "abstract")]
    pub study_abstract: Option<String>,
    pub description: Option<String>,
    pub study_type: Option<String>,
    pub links: Vec<StudyLink>,
}

impl StudyRecord {
    pub fn new(accession: StudyAccession) -> Self {
        Self {
            accession,
            bioproject: None,
            title: None,
            study_abstract: None,
            description: None,
            study_type: None,
            links: Vec::new(),
        }
    }

    pub fn summary_text(&self) -> Option<&str> {
        non_empty(self.study_abstract.as_deref()).or_else(|| non_empty(self.description.as_deref()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleRecord {
    pub accession: SampleAccession,
    pub biosample: Option<String>,
    pub study_refs: Vec<String>,
    pub title: Option<String>,
    pub sample_name: Option<String>,
    pub taxon_id: Option<u32>,
    pub description: Option<String>,
    pub attributes: Vec<Attribute>,
}

impl SampleRecord {
    pub fn new(accession: SampleAccession) -> Self {
        Self {
            accession,
            biosample: None,
            study_refs: Vec::new(),
            title: None,
            sample_name: None,
            taxon_id: None,
            description: None,
            attributes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LibraryDescriptor {
    pub name: Option<String>,
    pub strategy: Option<String>,
    pub source: Option<String>,
    pub selection: Option<String>,
    pub layout: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Platform {
    pub technology: Option<String>,
    pub instrument_model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExperimentRecord {
    pub accession: ExperimentAccession,
    pub study_ref: Option<String>,
    pub sample_ref: Option<String>,
    pub title: Option<String>,
    pub design: Option<String>,
    pub library: LibraryDescriptor,
    pub platform: Platform,
}

impl ExperimentRecord {
    pub fn new(accession: ExperimentAccession) -> Self {
        Self {
            accession,
            study_ref: None,
            sample_ref: None,
            title: None,
            design: None,
            library: LibraryDescriptor::default(),
            platform: Platform::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRecord {
    pub accession: RunAccession,
    pub experiment_ref: Option<String>,
    pub attributes: Vec<Attribute>,
}

impl RunRecord {
    pub fn new(accession: RunAccession) -> Self {
        Self {
            accession,
            experiment_ref: None,
            attributes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Record {
    Study(StudyRecord),
    Sample(SampleRecord),
    Experiment(ExperimentRecord),
    Run(RunRecord),
}

pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}
