use std::collections::HashMap;

use serde::Serialize;

use crate::assemble::AssembledStudy;
use crate::config::SummaryConfig;
use crate::domain::{Attribute, ExperimentRecord, RunRecord, SampleRecord, StudyRecord};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeEntry {
    pub attributes: Vec<Attribute>,
    pub count: usize,
}

// `assignments[i]` is the entry the i-th source record was folded into.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeduplicatedAttributeSet {
    pub entries: Vec<AttributeEntry>,
    #[serde(skip)]
    pub assignments: Vec<usize>,
}

impl DeduplicatedAttributeSet {
    pub fn total(&self) -> usize {
        self.entries.iter().map(|entry| entry.count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn attributes_of(&self, record: usize) -> &[Attribute] {
        self.assignments
            .get(record)
            .and_then(|index| self.entries.get(*index))
            .map(|entry| entry.attributes.as_slice())
            .unwrap_or(&[])
    }

    pub fn expand(&self) -> Vec<Vec<Attribute>> {
        self.entries
            .iter()
            .flat_map(|entry| std::iter::repeat_n(entry.attributes.clone(), entry.count))
            .collect()
    }
}

// Sorted multiset of pairs; duplicates are part of the identity.
pub fn canonical_key(attributes: &[Attribute]) -> Vec<Attribute> {
    let mut key = attributes.to_vec();
    key.sort();
    key
}

pub fn deduplicate<I, S>(sets: I) -> DeduplicatedAttributeSet
where
    I: IntoIterator<Item = S>,
    S: AsRef<[Attribute]>,
{
    let mut lookup: HashMap<Vec<Attribute>, usize> = HashMap::new();
    let mut result = DeduplicatedAttributeSet::default();
    for set in sets {
        let attributes = set.as_ref();
        let key = canonical_key(attributes);
        let index = match lookup.get(&key) {
            Some(index) => *index,
            None => {
                let index = result.entries.len();
                result.entries.push(AttributeEntry {
                    attributes: attributes.to_vec(),
                    count: 0,
                });
                lookup.insert(key, index);
                index
            }
        };
        result.entries[index].count += 1;
        result.assignments.push(index);
    }
    result
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValueCount {
    pub value: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeySummary {
    pub key: String,
    pub values: Vec<ValueCount>,
}

// Keys and values keep first-occurrence order. A key is dropped when it has
// more than `max_unique_values` distinct values and none of them reaches
// `min_value_count`.
pub fn summarize_attributes<I, S>(sets: I, config: &SummaryConfig) -> Vec<KeySummary>
where
    I: IntoIterator<Item = S>,
    S: AsRef<[Attribute]>,
{
    let mut keys: Vec<(String, ValueTally)> = Vec::new();
    let mut key_index: HashMap<String, usize> = HashMap::new();
    for set in sets {
        for attribute in set.as_ref() {
            let position = *key_index.entry(attribute.key.clone()).or_insert_with(|| {
                keys.push((attribute.key.clone(), ValueTally::default()));
                keys.len() - 1
            });
            keys[position].1.add(&attribute.value);
        }
    }

    keys.into_iter()
        .map(|(key, tally)| KeySummary {
            key,
            values: tally.into_values(),
        })
        .filter(|summary| {
            let top = summary.values.iter().map(|value| value.count).max().unwrap_or(0);
            !(summary.values.len() > config.max_unique_values && top < config.min_value_count)
        })
        .collect()
}

#[derive(Debug, Default)]
struct ValueTally {
    values: Vec<ValueCount>,
    index: HashMap<String, usize>,
}

impl ValueTally {
    fn add(&mut self, value: &str) {
        match self.index.get(value) {
            Some(position) => self.values[*position].count += 1,
            None => {
                self.index.insert(value.to_string(), self.values.len());
                self.values.push(ValueCount {
                    value: value.to_string(),
                    count: 1,
                });
            }
        }
    }

    fn into_values(self) -> Vec<ValueCount> {
        self.values
    }
}

#[derive(Debug, Clone)]
pub struct DedupedStudy {
    pub study: StudyRecord,
    pub samples: Vec<SampleRecord>,
    pub sample_attributes: DeduplicatedAttributeSet,
    pub attribute_summary: Vec<KeySummary>,
    pub organisms: Vec<ValueCount>,
    pub experiments: Vec<ExperimentRecord>,
    pub runs: Vec<RunRecord>,
    pub run_attributes: DeduplicatedAttributeSet,
}

impl DedupedStudy {
    pub fn from_assembled(assembled: AssembledStudy, config: &SummaryConfig) -> Self {
        let AssembledStudy {
            study,
            mut samples,
            experiments,
            mut runs,
        } = assembled;

        let sample_sets: Vec<Vec<Attribute>> = samples
            .iter_mut()
            .map(|sample| std::mem::take(&mut sample.attributes))
            .collect();
        let run_sets: Vec<Vec<Attribute>> = runs
            .iter_mut()
            .map(|run| std::mem::take(&mut run.attributes))
            .collect();

        let mut organisms = ValueTally::default();
        for name in samples.iter().filter_map(|sample| sample.sample_name.as_deref()) {
            organisms.add(name);
        }

        Self {
            attribute_summary: summarize_attributes(&sample_sets, config),
            sample_attributes: deduplicate(&sample_sets),
            run_attributes: deduplicate(&run_sets),
            organisms: organisms.into_values(),
            study,
            samples,
            experiments,
            runs,
        }
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn sample_attributes_of(&self, sample: usize) -> &[Attribute] {
        self.sample_attributes.attributes_of(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(pairs: &[(&str, &str)]) -> Vec<Attribute> {
        pairs.iter().map(|(k, v)| Attribute::new(*k, *v)).collect()
    }

    #[test]
    fn order_of_pairs_does_not_matter() {
        let sets = vec![
            set(&[("tissue", "liver"), ("sex", "F")]),
            set(&[("sex", "F"), ("tissue", "liver")]),
        ];
        let deduped = deduplicate(&sets);
        assert_eq!(deduped.entries.len(), 1);
        assert_eq!(deduped.entries[0].count, 2);
        assert_eq!(deduped.entries[0].attributes, sets[0]);
    }

    #[test]
    fn duplicate_pairs_are_part_of_identity() {
        let sets = vec![
            set(&[("tag", "a")]),
            set(&[("tag", "a"), ("tag", "a")]),
        ];
        assert_eq!(deduplicate(&sets).entries.len(), 2);
    }

    #[test]
    fn empty_input_gives_empty_set() {
        let deduped = deduplicate(Vec::<Vec<Attribute>>::new());
        assert!(deduped.is_empty());
        assert_eq!(deduped.total(), 0);
        assert!(deduped.attributes_of(0).is_empty());
    }

    #[test]
    fn summary_prunes_high_cardinality_keys() {
        let config = SummaryConfig {
            max_unique_values: 2,
            min_value_count: 2,
        };
        let sets = vec![
            set(&[("id", "a"), ("tissue", "liver")]),
            set(&[("id", "b"), ("tissue", "liver")]),
            set(&[("id", "c"), ("tissue", "lung")]),
        ];
        let summary = summarize_attributes(&sets, &config);
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].key, "tissue");
        assert_eq!(summary[0].values[0], ValueCount { value: "liver".to_string(), count: 2 });
    }

    #[test]
    fn unique_values_per_record_are_all_counted() {
        let config = SummaryConfig {
            max_unique_values: usize::MAX,
            min_value_count: 1,
        };
        let sets: Vec<Vec<Attribute>> = (0..20_000)
            .map(|n| {
                let id = format!("id-{n}");
                set(&[("sample_id", id.as_str()), ("tissue", "liver")])
            })
            .collect();
        let summary = summarize_attributes(&sets, &config);
        assert_eq!(summary[0].key, "sample_id");
        assert_eq!(summary[0].values.len(), 20_000);
        assert_eq!(summary[0].values[19_999].value, "id-19999");
        assert_eq!(summary[1].values, vec![ValueCount { value: "liver".to_string(), count: 20_000 }]);
    }

    #[test]
    fn padded_values_stay_distinct() {
        let sets = vec![set(&[("tissue", "liver")]), set(&[("tissue", " liver  ")])];
        let deduped = deduplicate(&sets);
        assert_eq!(deduped.entries.len(), 2);
        assert_eq!(deduped.assignments, vec![0, 1]);
    }
}
