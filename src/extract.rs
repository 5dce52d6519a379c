use std::io::BufRead;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde::Serialize;

use crate::domain::{
    Attribute, ExperimentRecord, Record, RecordKind, RunRecord, SampleRecord, StudyLink,
    StudyRecord,
};
use crate::error::{IssueKind, KiraError};

#[derive(Debug, Clone, Default, Serialize)]
pub struct Extraction {
    pub records: Vec<Record>,
    pub issues: Vec<RecordIssue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordIssue {
    pub kind: IssueKind,
    pub detail: String,
}

impl Extraction {
    pub fn count(&self, kind: IssueKind) -> usize {
        self.issues.iter().filter(|issue| issue.kind == kind).count()
    }
}

pub fn extract_records<R: BufRead>(
    input: R,
    kind: RecordKind,
    origin: &str,
) -> Result<Extraction, KiraError> {
    let mut extraction = Extraction::default();
    if !kind.is_extracted() {
        return Ok(extraction);
    }

    // Text is kept raw here; attribute values must survive untrimmed.
    let mut reader = Reader::from_reader(input);

    let entry_name = kind.element();
    let mut stack: Vec<Frame> = Vec::new();
    let mut entry: Option<(usize, EntryBuilder)> = None;
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|err| parse_failure(origin, reader.buffer_position(), err))?;
        match event {
            Event::Start(start) => {
                let frame = Frame::open(&start, origin)?;
                if entry.is_none() && frame.name == entry_name {
                    let builder = EntryBuilder::new(kind, frame.attr("accession"));
                    entry = Some((stack.len(), builder));
                }
                stack.push(frame);
            }
            Event::Empty(start) => {
                let frame = Frame::open(&start, origin)?;
                if entry.is_none() && frame.name == entry_name {
                    let builder = EntryBuilder::new(kind, frame.attr("accession"));
                    finish_entry(builder, origin, &mut extraction);
                } else if let Some((depth, builder)) = entry.as_mut() {
                    let path = relative_path(&stack, *depth, &frame.name);
                    builder.close(&path, &frame);
                }
            }
            Event::Text(text) => {
                if let Some(frame) = stack.last_mut() {
                    let text = text
                        .unescape()
                        .map_err(|err| parse_failure(origin, reader.buffer_position(), err))?;
                    frame.text.push_str(&text);
                }
            }
            Event::CData(data) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::End(_) => {
                let Some(frame) = stack.pop() else {
                    return Err(KiraError::ParseFailure {
                        path: origin.to_string(),
                        message: "closing tag without an open element".to_string(),
                    });
                };
                match entry.take() {
                    Some((depth, builder)) if depth == stack.len() => {
                        finish_entry(builder, origin, &mut extraction);
                    }
                    Some((depth, mut builder)) => {
                        let path = relative_path(&stack, depth, &frame.name);
                        builder.close(&path, &frame);
                        entry = Some((depth, builder));
                    }
                    None => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(KiraError::ParseFailure {
            path: origin.to_string(),
            message: format!("document ended inside <{}>", open.name),
        });
    }

    Ok(extraction)
}

fn parse_failure(
    origin: &str,
    position: impl std::fmt::Display,
    err: impl std::fmt::Display,
) -> KiraError {
    KiraError::ParseFailure {
        path: origin.to_string(),
        message: format!("at byte {position}: {err}"),
    }
}

fn finish_entry(builder: EntryBuilder, origin: &str, extraction: &mut Extraction) {
    match builder.finish() {
        Ok(record) => extraction.records.push(record),
        Err(detail) => {
            tracing::debug!(origin, %detail, "dropping entry without accession");
            extraction.issues.push(RecordIssue {
                kind: IssueKind::MissingAccession,
                detail: format!("{origin}: {detail}"),
            });
        }
    }
}

// Path relative to the entry element, e.g. `DESIGN/LIBRARY_DESCRIPTOR/LIBRARY_NAME`.
fn relative_path(stack: &[Frame], entry_depth: usize, closing: &str) -> String {
    let mut parts: Vec<&str> = stack
        .iter()
        .skip(entry_depth + 1)
        .map(|frame| frame.name.as_str())
        .collect();
    parts.push(closing);
    parts.join("/")
}

#[derive(Debug)]
struct Frame {
    name: String,
    attrs: Vec<(String, String)>,
    text: String,
}

impl Frame {
    fn open(start: &BytesStart<'_>, origin: &str) -> Result<Self, KiraError> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut attrs = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|err| KiraError::ParseFailure {
                path: origin.to_string(),
                message: format!("bad attribute on <{name}>: {err}"),
            })?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|err| KiraError::ParseFailure {
                    path: origin.to_string(),
                    message: format!("bad attribute value on <{name}>: {err}"),
                })?
                .into_owned();
            attrs.push((key, value));
        }
        Ok(Self {
            name,
            attrs,
            text: String::new(),
        })
    }

    fn attr(&self, key: &str) -> Option<String> {
        self.attrs
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn value(&self) -> Option<String> {
        let text = self.text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }

    fn raw_value(&self) -> Option<String> {
        Some(self.text.clone())
    }
}

#[derive(Debug, Default)]
struct PairCollector {
    tag: Option<String>,
    value: Option<String>,
}

impl PairCollector {
    fn take(&mut self) -> Option<Attribute> {
        let tag = self.tag.take();
        let value = self.value.take();
        tag.map(|key| Attribute::new(key, value.unwrap_or_default()))
    }
}

#[derive(Debug)]
struct LinkCollector {
    db: Option<String>,
    id: Option<String>,
    label: Option<String>,
    url: Option<String>,
}

impl LinkCollector {
    fn new() -> Self {
        Self {
            db: None,
            id: None,
            label: None,
            url: None,
        }
    }
}

#[derive(Debug)]
struct EntryBuilder {
    kind: RecordKind,
    accession: Option<String>,
    primary_id: Option<String>,
    fields: Fields,
}

#[derive(Debug)]
enum Fields {
    Study {
        record: StudyFields,
        link: LinkCollector,
    },
    Sample {
        record: SampleFields,
        pair: PairCollector,
        link: LinkCollector,
    },
    Experiment {
        record: ExperimentFields,
        layout: Vec<String>,
    },
    Run {
        record: RunFields,
        pair: PairCollector,
    },
}

#[derive(Debug, Default)]
struct StudyFields {
    bioproject: Option<String>,
    title: Option<String>,
    study_abstract: Option<String>,
    description: Option<String>,
    study_type: Option<String>,
    links: Vec<StudyLink>,
}

#[derive(Debug, Default)]
struct SampleFields {
    biosample: Option<String>,
    study_refs: Vec<String>,
    title: Option<String>,
    scientific_name: Option<String>,
    common_name: Option<String>,
    taxon_id: Option<u32>,
    description: Option<String>,
    attributes: Vec<Attribute>,
}

#[derive(Debug, Default)]
struct ExperimentFields {
    study_ref: Option<String>,
    sample_ref: Option<String>,
    title: Option<String>,
    design: Option<String>,
    library_name: Option<String>,
    library_strategy: Option<String>,
    library_source: Option<String>,
    library_selection: Option<String>,
    technology: Option<String>,
    instrument_model: Option<String>,
}

#[derive(Debug, Default)]
struct RunFields {
    experiment_ref: Option<String>,
    attributes: Vec<Attribute>,
}

impl EntryBuilder {
    fn new(kind: RecordKind, accession: Option<String>) -> Self {
        let fields = match kind {
            RecordKind::Study => Fields::Study {
                record: StudyFields::default(),
                link: LinkCollector::new(),
            },
            RecordKind::Sample => Fields::Sample {
                record: SampleFields::default(),
                pair: PairCollector::default(),
                link: LinkCollector::new(),
            },
            RecordKind::Experiment => Fields::Experiment {
                record: ExperimentFields::default(),
                layout: Vec::new(),
            },
            RecordKind::Run | RecordKind::Analysis | RecordKind::Submission => Fields::Run {
                record: RunFields::default(),
                pair: PairCollector::default(),
            },
        };
        Self {
            kind,
            accession,
            primary_id: None,
            fields,
        }
    }

    fn close(&mut self, path: &str, frame: &Frame) {
        if path == "IDENTIFIERS/PRIMARY_ID" {
            self.primary_id = frame.value();
            return;
        }
        match &mut self.fields {
            Fields::Study { record, link } => close_study(record, link, path, frame),
            Fields::Sample { record, pair, link } => close_sample(record, pair, link, path, frame),
            Fields::Experiment { record, layout } => close_experiment(record, layout, path, frame),
            Fields::Run { record, pair } => close_run(record, pair, path, frame),
        }
    }

    fn finish(self) -> Result<Record, String> {
        let element = self.kind.element();
        let accession = self
            .accession
            .or(self.primary_id)
            .ok_or_else(|| format!("<{element}> has no accession"))?;
        let record = match self.fields {
            Fields::Study { record, .. } => {
                let accession = accession
                    .parse()
                    .map_err(|_| format!("<{element}> has invalid accession {accession:?}"))?;
                Record::Study(StudyRecord {
                    accession,
                    bioproject: record.bioproject,
                    title: record.title,
                    study_abstract: record.study_abstract,
                    description: record.description,
                    study_type: record.study_type,
                    links: record.links,
                })
            }
            Fields::Sample { record, .. } => {
                let accession = accession
                    .parse()
                    .map_err(|_| format!("<{element}> has invalid accession {accession:?}"))?;
                Record::Sample(SampleRecord {
                    accession,
                    biosample: record.biosample,
                    study_refs: record.study_refs,
                    title: record.title,
                    sample_name: record.scientific_name.or(record.common_name),
                    taxon_id: record.taxon_id,
                    description: record.description,
                    attributes: record.attributes,
                })
            }
            Fields::Experiment { record, layout } => {
                let accession = accession
                    .parse()
                    .map_err(|_| format!("<{element}> has invalid accession {accession:?}"))?;
                let mut experiment = ExperimentRecord::new(accession);
                experiment.study_ref = record.study_ref;
                experiment.sample_ref = record.sample_ref;
                experiment.title = record.title;
                experiment.design = record.design;
                experiment.library.name = record.library_name;
                experiment.library.strategy = record.library_strategy;
                experiment.library.source = record.library_source;
                experiment.library.selection = record.library_selection;
                experiment.library.layout = (!layout.is_empty()).then(|| layout.join("|"));
                experiment.platform.technology = record.technology;
                experiment.platform.instrument_model = record.instrument_model;
                Record::Experiment(experiment)
            }
            Fields::Run { record, .. } => {
                let accession = accession
                    .parse()
                    .map_err(|_| format!("<{element}> has invalid accession {accession:?}"))?;
                Record::Run(RunRecord {
                    accession,
                    experiment_ref: record.experiment_ref,
                    attributes: record.attributes,
                })
            }
        };
        Ok(record)
    }
}

fn close_study(record: &mut StudyFields, link: &mut LinkCollector, path: &str, frame: &Frame) {
    match path {
        "IDENTIFIERS/EXTERNAL_ID" => {
            let is_bioproject = frame
                .attr("namespace")
                .map(|ns| ns.eq_ignore_ascii_case("BioProject"))
                .unwrap_or(false);
            if is_bioproject && record.bioproject.is_none() {
                record.bioproject = frame.value();
            }
        }
        "DESCRIPTOR/STUDY_TITLE" => record.title = frame.value(),
        "DESCRIPTOR/STUDY_ABSTRACT" => record.study_abstract = frame.value(),
        "DESCRIPTOR/STUDY_DESCRIPTION" => record.description = frame.value(),
        "DESCRIPTOR/STUDY_TYPE" => {
            record.study_type = frame
                .attr("existing_study_type")
                .or_else(|| frame.attr("new_study_type"));
        }
        _ => close_link(&mut record.links, link, path, frame),
    }
}

fn close_link(links: &mut Vec<StudyLink>, link: &mut LinkCollector, path: &str, frame: &Frame) {
    if !path.contains("STUDY_LINK/") {
        return;
    }
    if path.ends_with("XREF_LINK/DB") {
        link.db = frame.value();
    } else if path.ends_with("XREF_LINK/ID") {
        link.id = frame.value();
    } else if path.ends_with("URL_LINK/LABEL") {
        link.label = frame.value();
    } else if path.ends_with("URL_LINK/URL") {
        link.url = frame.value();
    } else if path.ends_with("/XREF_LINK") {
        if let (Some(db), Some(id)) = (link.db.take(), link.id.take()) {
            links.push(StudyLink::Xref { db, id });
        }
    } else if path.ends_with("/URL_LINK") {
        let label = link.label.take();
        if let Some(url) = link.url.take() {
            links.push(StudyLink::Url { label, url });
        }
    }
}

fn close_sample(
    record: &mut SampleFields,
    pair: &mut PairCollector,
    link: &mut LinkCollector,
    path: &str,
    frame: &Frame,
) {
    match path {
        "IDENTIFIERS/EXTERNAL_ID" => {
            let is_biosample = frame
                .attr("namespace")
                .map(|ns| ns.eq_ignore_ascii_case("BioSample"))
                .unwrap_or(false);
            if is_biosample && record.biosample.is_none() {
                record.biosample = frame.value();
            }
        }
        "TITLE" => record.title = frame.value(),
        "DESCRIPTION" => record.description = frame.value(),
        "SAMPLE_NAME/SCIENTIFIC_NAME" => record.scientific_name = frame.value(),
        "SAMPLE_NAME/COMMON_NAME" => record.common_name = frame.value(),
        "SAMPLE_NAME/TAXON_ID" => {
            record.taxon_id = frame.value().and_then(|value| value.parse().ok());
        }
        "SAMPLE_ATTRIBUTES/SAMPLE_ATTRIBUTE/TAG" => pair.tag = frame.value(),
        "SAMPLE_ATTRIBUTES/SAMPLE_ATTRIBUTE/VALUE" => pair.value = frame.raw_value(),
        "SAMPLE_ATTRIBUTES/SAMPLE_ATTRIBUTE" => {
            if let Some(attribute) = pair.take() {
                record.attributes.push(attribute);
            }
        }
        "SAMPLE_LINKS/SAMPLE_LINK/XREF_LINK/DB" => link.db = frame.value(),
        "SAMPLE_LINKS/SAMPLE_LINK/XREF_LINK/ID" => link.id = frame.value(),
        "SAMPLE_LINKS/SAMPLE_LINK/XREF_LINK" => {
            let db = link.db.take();
            let id = link.id.take();
            if let (Some(db), Some(id)) = (db, id) {
                if db.to_ascii_uppercase().ends_with("-STUDY") {
                    record.study_refs.push(id);
                }
            }
        }
        _ => {}
    }
}

fn close_experiment(
    record: &mut ExperimentFields,
    layout: &mut Vec<String>,
    path: &str,
    frame: &Frame,
) {
    match path {
        "TITLE" => record.title = frame.value(),
        "STUDY_REF" => {
            if let Some(accession) = frame.attr("accession") {
                record.study_ref = Some(accession);
            }
        }
        "STUDY_REF/IDENTIFIERS/PRIMARY_ID" => {
            if record.study_ref.is_none() {
                record.study_ref = frame.value();
            }
        }
        "DESIGN/DESIGN_DESCRIPTION" => record.design = frame.value(),
        "DESIGN/SAMPLE_DESCRIPTOR" => {
            if let Some(accession) = frame.attr("accession") {
                record.sample_ref = Some(accession);
            }
        }
        "DESIGN/SAMPLE_DESCRIPTOR/IDENTIFIERS/PRIMARY_ID" => {
            if record.sample_ref.is_none() {
                record.sample_ref = frame.value();
            }
        }
        "DESIGN/LIBRARY_DESCRIPTOR/LIBRARY_NAME" => record.library_name = frame.value(),
        "DESIGN/LIBRARY_DESCRIPTOR/LIBRARY_STRATEGY" => record.library_strategy = frame.value(),
        "DESIGN/LIBRARY_DESCRIPTOR/LIBRARY_SOURCE" => record.library_source = frame.value(),
        "DESIGN/LIBRARY_DESCRIPTOR/LIBRARY_SELECTION" => record.library_selection = frame.value(),
        _ => {
            if let Some(tag) = path.strip_prefix("DESIGN/LIBRARY_DESCRIPTOR/LIBRARY_LAYOUT/") {
                if !tag.contains('/') {
                    layout.push(tag.to_string());
                }
            } else if let Some(rest) = path.strip_prefix("PLATFORM/") {
                match rest.split_once('/') {
                    None => record.technology = Some(rest.to_string()),
                    Some((_, "INSTRUMENT_MODEL")) => record.instrument_model = frame.value(),
                    Some(_) => {}
                }
            }
        }
    }
}

fn close_run(record: &mut RunFields, pair: &mut PairCollector, path: &str, frame: &Frame) {
    match path {
        "EXPERIMENT_REF" => {
            if let Some(accession) = frame.attr("accession") {
                record.experiment_ref = Some(accession);
            }
        }
        "EXPERIMENT_REF/IDENTIFIERS/PRIMARY_ID" => {
            if record.experiment_ref.is_none() {
                record.experiment_ref = frame.value();
            }
        }
        "RUN_ATTRIBUTES/RUN_ATTRIBUTE/TAG" => pair.tag = frame.value(),
        "RUN_ATTRIBUTES/RUN_ATTRIBUTE/VALUE" => pair.value = frame.raw_value(),
        "RUN_ATTRIBUTES/RUN_ATTRIBUTE" => {
            if let Some(attribute) = pair.take() {
                record.attributes.push(attribute);
            }
        }
        _ => {}
    }
}
