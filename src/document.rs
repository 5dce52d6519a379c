use serde::Serialize;

use crate::dedup::{AttributeEntry, DedupedStudy, KeySummary};
use crate::domain::{LibraryDescriptor, Platform, StudyAccession, StudyLink};

#[derive(Debug, Clone, Serialize)]
pub struct StudyDocument {
    pub accession: StudyAccession,
    pub bioproject: Option<String>,
    pub study: StudySection,
    pub matched_organisms: Vec<String>,
    pub organisms: Vec<OrganismCount>,
    pub samples: Vec<SampleEntry>,
    pub sample_attributes: Vec<AttributeEntry>,
    pub attribute_summary: Vec<KeySummary>,
    pub experiments: Vec<ExperimentEntry>,
    pub runs: Vec<RunEntry>,
    pub run_attributes: Vec<AttributeEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudySection {
    pub title: Option<String>,
    pub description: Option<String>,
    pub study_type: Option<String>,
    pub links: Vec<StudyLink>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrganismCount {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SampleEntry {
    pub accession: String,
    pub biosample: Option<String>,
    pub title: Option<String>,
    pub sample_name: Option<String>,
    pub taxon_id: Option<u32>,
    pub description: Option<String>,
    pub attribute_set: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExperimentEntry {
    pub accession: String,
    pub sample: Option<String>,
    pub title: Option<String>,
    pub design: Option<String>,
    pub library: LibraryDescriptor,
    pub platform: Platform,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunEntry {
    pub accession: String,
    pub experiment: Option<String>,
    pub attribute_set: usize,
}

impl StudyDocument {
    pub fn new(study: DedupedStudy, matched_organisms: Vec<String>) -> Self {
        let DedupedStudy {
            study,
            samples,
            sample_attributes,
            attribute_summary,
            organisms,
            experiments,
            runs,
            run_attributes,
        } = study;

        let description = study.summary_text().map(str::to_string);
        let samples = samples
            .into_iter()
            .zip(&sample_attributes.assignments)
            .map(|(sample, index)| SampleEntry {
                accession: sample.accession.to_string(),
                biosample: sample.biosample,
                title: sample.title,
                sample_name: sample.sample_name,
                taxon_id: sample.taxon_id,
                description: sample.description,
                attribute_set: *index,
            })
            .collect();
        let runs = runs
            .into_iter()
            .zip(&run_attributes.assignments)
            .map(|(run, index)| RunEntry {
                accession: run.accession.to_string(),
                experiment: run.experiment_ref,
                attribute_set: *index,
            })
            .collect();
        let experiments = experiments
            .into_iter()
            .map(|experiment| ExperimentEntry {
                accession: experiment.accession.to_string(),
                sample: experiment.sample_ref,
                title: experiment.title,
                design: experiment.design,
                library: experiment.library,
                platform: experiment.platform,
            })
            .collect();

        Self {
            accession: study.accession,
            bioproject: study.bioproject,
            study: StudySection {
                title: study.title,
                description,
                study_type: study.study_type,
                links: study.links,
            },
            matched_organisms,
            organisms: organisms
                .into_iter()
                .map(|organism| OrganismCount {
                    name: organism.value,
                    count: organism.count,
                })
                .collect(),
            samples,
            sample_attributes: sample_attributes.entries,
            attribute_summary,
            experiments,
            runs,
            run_attributes: run_attributes.entries,
        }
    }
}
