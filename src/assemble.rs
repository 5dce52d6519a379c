use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Serialize;

use crate::domain::{ExperimentRecord, RecordKind, RunRecord, SampleRecord, StudyRecord};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssembledStudy {
    pub study: StudyRecord,
    pub samples: Vec<SampleRecord>,
    pub experiments: Vec<ExperimentRecord>,
    pub runs: Vec<RunRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrphanNote {
    pub kind: RecordKind,
    pub accession: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Assembly {
    pub studies: Vec<AssembledStudy>,
    pub orphans: Vec<OrphanNote>,
}

impl Assembly {
    pub fn orphan_count(&self) -> usize {
        self.orphans.len()
    }
}

pub fn assemble(
    studies: Vec<StudyRecord>,
    samples: Vec<SampleRecord>,
    experiments: Vec<ExperimentRecord>,
    runs: Vec<RunRecord>,
) -> Assembly {
    let mut orphans = Vec::new();

    let studies = first_wins(studies, RecordKind::Study, |s| s.accession.as_str(), &mut orphans);
    let samples = first_wins(samples, RecordKind::Sample, |s| s.accession.as_str(), &mut orphans);
    let experiments = first_wins(
        experiments,
        RecordKind::Experiment,
        |e| e.accession.as_str(),
        &mut orphans,
    );
    let runs = first_wins(runs, RecordKind::Run, |r| r.accession.as_str(), &mut orphans);

    let study_index = index_studies(&studies);
    let resolve_study = |reference: &str| study_index.get(reference.trim()).copied();

    // Study each experiment claims, before its sample is checked.
    let mut claimed: Vec<Option<usize>> = Vec::with_capacity(experiments.len());
    for experiment in &experiments {
        let target = match experiment.study_ref.as_deref() {
            Some(reference) => resolve_study(reference),
            None if studies.len() == 1 => Some(0),
            None => None,
        };
        claimed.push(target);
    }

    let mut sample_homes: HashMap<&str, BTreeSet<usize>> = HashMap::new();
    let mut attached_samples: Vec<(usize, BTreeSet<usize>)> = Vec::new();
    for (position, sample) in samples.iter().enumerate() {
        let homes = sample_studies(sample, &studies, &experiments, &claimed, &resolve_study);
        if homes.is_empty() {
            let reason = if sample.study_refs.is_empty() {
                "no experiment in the group references this sample".to_string()
            } else {
                format!("study refs {:?} not in group", sample.study_refs)
            };
            orphans.push(orphan(RecordKind::Sample, sample.accession.as_str(), reason));
            continue;
        }
        sample_homes.insert(sample.accession.as_str(), homes.clone());
        attached_samples.push((position, homes));
    }

    let mut experiment_homes: HashMap<&str, usize> = HashMap::new();
    let mut attached_experiments: Vec<(usize, usize)> = Vec::new();
    for (position, experiment) in experiments.iter().enumerate() {
        let accession = experiment.accession.as_str();
        let Some(study) = claimed[position] else {
            let reason = match experiment.study_ref.as_deref() {
                Some(reference) => format!("study ref {reference} not in group"),
                None => "no study reference".to_string(),
            };
            orphans.push(orphan(RecordKind::Experiment, accession, reason));
            continue;
        };
        let Some(sample_ref) = experiment.sample_ref.as_deref().map(str::trim) else {
            orphans.push(orphan(RecordKind::Experiment, accession, "no sample reference"));
            continue;
        };
        let sample_matches = sample_homes
            .get(sample_ref)
            .map(|homes| homes.contains(&study))
            .unwrap_or(false);
        if !sample_matches {
            let reason = format!(
                "sample {sample_ref} is not attached to study {}",
                studies[study].accession
            );
            orphans.push(orphan(RecordKind::Experiment, accession, reason));
            continue;
        }
        experiment_homes.insert(accession, study);
        attached_experiments.push((position, study));
    }

    let mut attached_runs: Vec<(usize, usize)> = Vec::new();
    for (position, run) in runs.iter().enumerate() {
        let home = run
            .experiment_ref
            .as_deref()
            .and_then(|reference| experiment_homes.get(reference.trim()).copied());
        match home {
            Some(study) => attached_runs.push((position, study)),
            None => {
                let reason = match run.experiment_ref.as_deref() {
                    Some(reference) => format!("experiment {reference} not attached in group"),
                    None => "no experiment reference".to_string(),
                };
                orphans.push(orphan(RecordKind::Run, run.accession.as_str(), reason));
            }
        }
    }

    let mut assembled: Vec<AssembledStudy> = studies
        .iter()
        .map(|study| AssembledStudy {
            study: study.clone(),
            samples: Vec::new(),
            experiments: Vec::new(),
            runs: Vec::new(),
        })
        .collect();
    for (position, homes) in attached_samples {
        for study in homes {
            assembled[study].samples.push(samples[position].clone());
        }
    }
    for (position, study) in attached_experiments {
        assembled[study].experiments.push(experiments[position].clone());
    }
    for (position, study) in attached_runs {
        assembled[study].runs.push(runs[position].clone());
    }

    Assembly {
        studies: assembled,
        orphans,
    }
}

fn sample_studies(
    sample: &SampleRecord,
    studies: &[StudyRecord],
    experiments: &[ExperimentRecord],
    claimed: &[Option<usize>],
    resolve_study: &impl Fn(&str) -> Option<usize>,
) -> BTreeSet<usize> {
    if !sample.study_refs.is_empty() {
        return sample
            .study_refs
            .iter()
            .filter_map(|reference| resolve_study(reference.as_str()))
            .collect();
    }
    if studies.len() == 1 {
        return BTreeSet::from([0]);
    }
    experiments
        .iter()
        .zip(claimed)
        .filter(|(experiment, _)| {
            experiment.sample_ref.as_deref().map(str::trim) == Some(sample.accession.as_str())
        })
        .filter_map(|(_, study)| *study)
        .collect()
}

fn index_studies(studies: &[StudyRecord]) -> HashMap<String, usize> {
    let mut index = HashMap::new();
    for (position, study) in studies.iter().enumerate() {
        index.insert(study.accession.as_str().to_string(), position);
        if let Some(bioproject) = study.bioproject.as_deref() {
            index.entry(bioproject.to_string()).or_insert(position);
        }
    }
    index
}

fn first_wins<T>(
    records: Vec<T>,
    kind: RecordKind,
    accession: impl Fn(&T) -> &str,
    orphans: &mut Vec<OrphanNote>,
) -> Vec<T> {
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(records.len());
    for record in records {
        if seen.insert(accession(&record).to_string()) {
            kept.push(record);
        } else {
            orphans.push(orphan(kind, accession(&record), "duplicate"));
        }
    }
    kept
}

fn orphan(kind: RecordKind, accession: &str, reason: impl Into<String>) -> OrphanNote {
    OrphanNote {
        kind,
        accession: accession.to_string(),
        reason: reason.into(),
    }
}
