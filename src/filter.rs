use std::fmt;

use regex::Regex;
use serde::Serialize;

use crate::config::{FilterConfig, MIN_SAMPLES_FLOOR, OrganismSpec};
use crate::dedup::DedupedStudy;
use crate::domain::non_empty;
use crate::error::KiraError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    TooFewSamples,
    MissingStudyFields,
    MissingSampleFields,
    NoAllowedOrganism,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RejectReason::TooFewSamples => "too_few_samples",
            RejectReason::MissingStudyFields => "missing_study_fields",
            RejectReason::MissingSampleFields => "missing_sample_fields",
            RejectReason::NoAllowedOrganism => "no_allowed_organism",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept(Vec<String>),
    Reject(RejectReason),
}

impl Verdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Verdict::Accept(_))
    }
}

#[derive(Debug)]
struct CompiledOrganism {
    label: String,
    taxon_ids: Vec<u32>,
    names: Vec<String>,
    patterns: Vec<Regex>,
}

impl CompiledOrganism {
    fn compile(spec: &OrganismSpec) -> Result<Self, KiraError> {
        let patterns = spec
            .patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|err| KiraError::InvalidPattern {
                    pattern: pattern.clone(),
                    message: err.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            label: spec.label.clone(),
            taxon_ids: spec.taxon_ids.clone(),
            names: spec.names.iter().map(|name| name.trim().to_lowercase()).collect(),
            patterns,
        })
    }

    fn matches_taxonomy(&self, taxon_id: Option<u32>, name: Option<&str>) -> bool {
        let by_id = taxon_id.map(|id| self.taxon_ids.contains(&id)).unwrap_or(false);
        let by_name = name
            .map(|name| name.trim().to_lowercase())
            .map(|name| self.names.contains(&name))
            .unwrap_or(false);
        by_id || by_name
    }

    fn matches_text(&self, text: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.is_match(text))
    }
}

#[derive(Debug)]
pub struct OrganismMatcher {
    organisms: Vec<CompiledOrganism>,
    free_text_keys: Vec<String>,
    search_titles: bool,
}

impl OrganismMatcher {
    pub fn new(config: &FilterConfig) -> Result<Self, KiraError> {
        let organisms = config
            .organisms
            .iter()
            .map(CompiledOrganism::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            organisms,
            free_text_keys: config
                .free_text_keys
                .iter()
                .map(|key| key.trim().to_lowercase())
                .collect(),
            search_titles: config.search_titles,
        })
    }

    pub fn detect(&self, study: &DedupedStudy) -> Vec<String> {
        let has_taxonomy = study.samples.iter().any(|sample| {
            sample.taxon_id.is_some() || non_empty(sample.sample_name.as_deref()).is_some()
        });

        let matched = if has_taxonomy {
            self.organisms
                .iter()
                .filter(|organism| {
                    study.samples.iter().any(|sample| {
                        organism.matches_taxonomy(sample.taxon_id, sample.sample_name.as_deref())
                    })
                })
                .collect::<Vec<_>>()
        } else {
            let texts = self.free_text(study);
            self.organisms
                .iter()
                .filter(|organism| texts.iter().any(|text| organism.matches_text(text)))
                .collect::<Vec<_>>()
        };

        matched.into_iter().map(|organism| organism.label.clone()).collect()
    }

    fn free_text<'a>(&self, study: &'a DedupedStudy) -> Vec<&'a str> {
        let mut texts = Vec::new();
        for index in 0..study.samples.len() {
            texts.extend(
                study
                    .sample_attributes_of(index)
                    .iter()
                    .filter(|attr| self.free_text_keys.contains(&attr.key.trim().to_lowercase()))
                    .map(|attr| attr.value.as_str()),
            );
        }
        if self.search_titles {
            texts.extend(study.samples.iter().filter_map(|sample| sample.title.as_deref()));
            texts.extend(
                study
                    .experiments
                    .iter()
                    .filter_map(|experiment| experiment.title.as_deref()),
            );
        }
        texts
    }
}

#[derive(Debug)]
pub struct StudyFilter {
    min_samples: usize,
    matcher: OrganismMatcher,
}

impl StudyFilter {
    pub fn new(config: &FilterConfig) -> Result<Self, KiraError> {
        Ok(Self {
            min_samples: config.min_samples.max(MIN_SAMPLES_FLOOR),
            matcher: OrganismMatcher::new(config)?,
        })
    }

    pub fn evaluate(&self, study: &DedupedStudy) -> Verdict {
        if study.sample_count() < self.min_samples {
            return Verdict::Reject(RejectReason::TooFewSamples);
        }
        let record = &study.study;
        if non_empty(record.title.as_deref()).is_none() || record.summary_text().is_none() {
            return Verdict::Reject(RejectReason::MissingStudyFields);
        }
        let sample_missing_fields = study.samples.iter().any(|sample| {
            non_empty(sample.title.as_deref()).is_none()
                && non_empty(sample.sample_name.as_deref()).is_none()
        });
        if sample_missing_fields {
            return Verdict::Reject(RejectReason::MissingSampleFields);
        }
        let organisms = self.matcher.detect(study);
        if organisms.is_empty() {
            return Verdict::Reject(RejectReason::NoAllowedOrganism);
        }
        Verdict::Accept(organisms)
    }
}
