use kira_sra_digest::assemble::AssembledStudy;
use kira_sra_digest::config::{FilterConfig, OrganismSpec, SummaryConfig};
use kira_sra_digest::dedup::DedupedStudy;
use kira_sra_digest::domain::{Attribute, ExperimentRecord, SampleRecord, StudyRecord};
use kira_sra_digest::filter::{OrganismMatcher, RejectReason, StudyFilter, Verdict};

fn study_record() -> StudyRecord {
    let mut study = StudyRecord::new("SRP1".parse().unwrap());
    study.title = Some("Liver atlas".to_string());
    study.study_abstract = Some("Profiling of liver tissue.".to_string());
    study
}

fn human_sample(accession: &str) -> SampleRecord {
    let mut sample = SampleRecord::new(accession.parse().unwrap());
    sample.title = Some(format!("{accession} liver"));
    sample.taxon_id = Some(9606);
    sample.sample_name = Some("Homo sapiens".to_string());
    sample
}

fn untyped_sample(accession: &str, attributes: Vec<Attribute>) -> SampleRecord {
    let mut sample = SampleRecord::new(accession.parse().unwrap());
    sample.title = Some(format!("{accession} sample"));
    sample.attributes = attributes;
    sample
}

fn dedup(study: StudyRecord, samples: Vec<SampleRecord>) -> DedupedStudy {
    DedupedStudy::from_assembled(
        AssembledStudy {
            study,
            samples,
            experiments: Vec::new(),
            runs: Vec::new(),
        },
        &SummaryConfig::default(),
    )
}

fn filter() -> StudyFilter {
    StudyFilter::new(&FilterConfig::default()).unwrap()
}

#[test]
fn accepts_complete_human_study() {
    let study = dedup(study_record(), vec![human_sample("SRS1"), human_sample("SRS2")]);
    assert_eq!(filter().evaluate(&study), Verdict::Accept(vec!["human".to_string()]));
}

#[test]
fn too_few_samples_wins_over_other_reasons() {
    let mut record = study_record();
    record.title = None;
    let study = dedup(record, vec![human_sample("SRS1")]);
    assert_eq!(
        filter().evaluate(&study),
        Verdict::Reject(RejectReason::TooFewSamples)
    );
}

#[test]
fn single_sample_is_rejected_even_with_lower_threshold() {
    let config = FilterConfig {
        min_samples: 1,
        ..FilterConfig::default()
    };
    let filter = StudyFilter::new(&config).unwrap();
    let study = dedup(study_record(), vec![human_sample("SRS1")]);
    assert_eq!(
        filter.evaluate(&study),
        Verdict::Reject(RejectReason::TooFewSamples)
    );
}

#[test]
fn study_without_description_is_rejected() {
    let mut record = study_record();
    record.study_abstract = None;
    let study = dedup(record, vec![human_sample("SRS1"), human_sample("SRS2")]);
    assert_eq!(
        filter().evaluate(&study),
        Verdict::Reject(RejectReason::MissingStudyFields)
    );
}

#[test]
fn description_fallback_satisfies_study_fields() {
    let mut record = study_record();
    record.study_abstract = None;
    record.description = Some("Fallback description".to_string());
    let study = dedup(record, vec![human_sample("SRS1"), human_sample("SRS2")]);
    assert!(filter().evaluate(&study).is_accept());
}

#[test]
fn sample_without_title_or_name_is_rejected() {
    let mut bare = SampleRecord::new("SRS2".parse().unwrap());
    bare.taxon_id = Some(9606);
    let study = dedup(study_record(), vec![human_sample("SRS1"), bare]);
    assert_eq!(
        filter().evaluate(&study),
        Verdict::Reject(RejectReason::MissingSampleFields)
    );
}

#[test]
fn taxonomy_overrides_free_text() {
    let mut fish = SampleRecord::new("SRS1".parse().unwrap());
    fish.title = Some("human wound model".to_string());
    fish.taxon_id = Some(7955);
    fish.sample_name = Some("Danio rerio".to_string());
    fish.attributes = vec![Attribute::new("host", "human")];
    let mut other = fish.clone();
    other.accession = "SRS2".parse().unwrap();

    let study = dedup(study_record(), vec![fish, other]);
    assert_eq!(
        filter().evaluate(&study),
        Verdict::Reject(RejectReason::NoAllowedOrganism)
    );
}

#[test]
fn free_text_is_used_without_taxonomy() {
    let study = dedup(
        study_record(),
        vec![
            untyped_sample("SRS1", vec![Attribute::new("Organism", "Mus musculus")]),
            untyped_sample("SRS2", vec![Attribute::new("strain", "C57BL/6")]),
        ],
    );
    let matcher = OrganismMatcher::new(&FilterConfig::default()).unwrap();
    assert_eq!(matcher.detect(&study), vec!["mouse".to_string()]);
}

#[test]
fn experiment_titles_count_as_free_text() {
    let mut assembled = AssembledStudy {
        study: study_record(),
        samples: vec![
            untyped_sample("SRS1", Vec::new()),
            untyped_sample("SRS2", Vec::new()),
        ],
        experiments: Vec::new(),
        runs: Vec::new(),
    };
    let mut experiment = ExperimentRecord::new("SRX1".parse().unwrap());
    experiment.title = Some("RNA-seq of human fibroblasts".to_string());
    assembled.experiments.push(experiment);
    let study = DedupedStudy::from_assembled(assembled, &SummaryConfig::default());
    assert!(filter().evaluate(&study).is_accept());

    let config = FilterConfig {
        search_titles: false,
        ..FilterConfig::default()
    };
    let strict = StudyFilter::new(&config).unwrap();
    assert_eq!(
        strict.evaluate(&study),
        Verdict::Reject(RejectReason::NoAllowedOrganism)
    );
}

#[test]
fn custom_organisms_replace_defaults() {
    let config = FilterConfig {
        organisms: vec![OrganismSpec {
            label: "zebrafish".to_string(),
            taxon_ids: vec![7955],
            names: vec!["Danio rerio".to_string()],
            patterns: vec![r"(?i)\bzebrafish\b".to_string()],
        }],
        ..FilterConfig::default()
    };
    let mut fish = SampleRecord::new("SRS1".parse().unwrap());
    fish.title = Some("fin".to_string());
    fish.sample_name = Some("danio rerio".to_string());
    let mut other = fish.clone();
    other.accession = "SRS2".parse().unwrap();

    let study = dedup(study_record(), vec![fish, other]);
    let filter = StudyFilter::new(&config).unwrap();
    assert_eq!(filter.evaluate(&study), Verdict::Accept(vec!["zebrafish".to_string()]));
}
