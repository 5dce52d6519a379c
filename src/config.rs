use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::KiraError;

pub const DEFAULT_CONFIG_FILE: &str = "kira-sra.json";
pub const DEFAULT_READ_RETRIES: usize = 2;
// A single-sample study is never accepted, whatever the configuration says.
pub const MIN_SAMPLES_FLOOR: usize = 2;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub input: Option<Utf8PathBuf>,
    #[serde(default)]
    pub output: Option<Utf8PathBuf>,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub max_read_retries: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub pretty: Option<bool>,
    #[serde(default)]
    pub filter: Option<FilterSection>,
    #[serde(default)]
    pub summary: Option<SummarySection>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct FilterSection {
    #[serde(default)]
    pub min_samples: Option<usize>,
    #[serde(default)]
    pub organisms: Option<Vec<OrganismEntry>>,
    #[serde(default)]
    pub free_text_keys: Option<Vec<String>>,
    #[serde(default)]
    pub search_titles: Option<bool>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum OrganismEntry {
    Shorthand(String),
    Detailed(OrganismEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct OrganismEntryObject {
    pub label: String,
    #[serde(default)]
    pub taxon_ids: Vec<u32>,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SummarySection {
    #[serde(default)]
    pub max_unique_values: Option<usize>,
    #[serde(default)]
    pub min_value_count: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganismSpec {
    pub label: String,
    pub taxon_ids: Vec<u32>,
    pub names: Vec<String>,
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FilterConfig {
    pub min_samples: usize,
    pub organisms: Vec<OrganismSpec>,
    pub free_text_keys: Vec<String>,
    pub search_titles: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_samples: MIN_SAMPLES_FLOOR,
            organisms: default_organisms(),
            free_text_keys: default_free_text_keys(),
            search_titles: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryConfig {
    pub max_unique_values: usize,
    pub min_value_count: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            max_unique_values: 10,
            min_value_count: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub input: Utf8PathBuf,
    pub output: Utf8PathBuf,
    pub workers: usize,
    pub max_read_retries: usize,
    pub limit: Option<usize>,
    pub pretty: bool,
    pub filter: FilterConfig,
    pub summary: SummaryConfig,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub input: Option<Utf8PathBuf>,
    pub output: Option<Utf8PathBuf>,
    pub workers: Option<usize>,
    pub limit: Option<usize>,
    pub min_samples: Option<usize>,
    pub compact: bool,
}

impl ConfigOverrides {
    fn is_self_sufficient(&self) -> bool {
        self.input.is_some() && self.output.is_some()
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(
        path: Option<&str>,
        overrides: &ConfigOverrides,
    ) -> Result<ResolvedConfig, KiraError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            if overrides.is_self_sufficient() {
                return Self::resolve_config(Config::default(), overrides);
            }
            return Err(KiraError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| KiraError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| KiraError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config, overrides)
    }

    pub fn resolve_config(
        config: Config,
        overrides: &ConfigOverrides,
    ) -> Result<ResolvedConfig, KiraError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let input = overrides
            .input
            .clone()
            .or(config.input)
            .ok_or_else(|| KiraError::ConfigParse("no input corpus root configured".to_string()))?;
        let output = overrides
            .output
            .clone()
            .or(config.output)
            .ok_or_else(|| KiraError::ConfigParse("no output directory configured".to_string()))?;

        let workers = overrides
            .workers
            .or(config.workers)
            .filter(|workers| *workers > 0)
            .unwrap_or_else(default_workers);

        let filter_section = config.filter.unwrap_or_default();
        let mut filter = FilterConfig::default();
        if let Some(min_samples) = overrides.min_samples.or(filter_section.min_samples) {
            if min_samples < MIN_SAMPLES_FLOOR {
                return Err(KiraError::ConfigParse(format!(
                    "min_samples must be at least {MIN_SAMPLES_FLOOR}, got {min_samples}"
                )));
            }
            filter.min_samples = min_samples;
        }
        if let Some(entries) = filter_section.organisms {
            filter.organisms = entries
                .into_iter()
                .map(resolve_organism)
                .collect::<Result<Vec<_>, KiraError>>()?;
        }
        if let Some(keys) = filter_section.free_text_keys {
            filter.free_text_keys = keys;
        }
        if let Some(search_titles) = filter_section.search_titles {
            filter.search_titles = search_titles;
        }

        let summary_section = config.summary.unwrap_or_default();
        let defaults = SummaryConfig::default();
        let summary = SummaryConfig {
            max_unique_values: summary_section
                .max_unique_values
                .unwrap_or(defaults.max_unique_values),
            min_value_count: summary_section
                .min_value_count
                .unwrap_or(defaults.min_value_count),
        };

        Ok(ResolvedConfig {
            schema_version,
            input,
            output,
            workers,
            max_read_retries: config.max_read_retries.unwrap_or(DEFAULT_READ_RETRIES),
            limit: overrides.limit.or(config.limit),
            pretty: !overrides.compact && config.pretty.unwrap_or(true),
            filter,
            summary,
        })
    }
}

fn resolve_organism(entry: OrganismEntry) -> Result<OrganismSpec, KiraError> {
    match entry {
        OrganismEntry::Shorthand(value) => preset_organism(&value).ok_or_else(|| {
            KiraError::ConfigParse(format!("unknown organism preset: {value}"))
        }),
        OrganismEntry::Detailed(obj) => Ok(OrganismSpec {
            label: obj.label,
            taxon_ids: obj.taxon_ids,
            names: obj.names,
            patterns: obj.patterns,
        }),
    }
}

pub fn preset_organism(name: &str) -> Option<OrganismSpec> {
    match name.trim().to_ascii_lowercase().as_str() {
        "human" | "homo sapiens" => Some(OrganismSpec {
            label: "human".to_string(),
            taxon_ids: vec![9606],
            names: vec!["Homo sapiens".to_string()],
            patterns: vec![r"(?i)\bhomo sapiens\b".to_string(), r"(?i)\bhuman\b".to_string()],
        }),
        "mouse" | "mus musculus" => Some(OrganismSpec {
            label: "mouse".to_string(),
            taxon_ids: vec![10090],
            names: vec!["Mus musculus".to_string()],
            patterns: vec![r"(?i)\bmus musculus\b".to_string(), r"(?i)\bmouse\b".to_string()],
        }),
        _ => None,
    }
}

pub fn default_organisms() -> Vec<OrganismSpec> {
    ["human", "mouse"]
        .iter()
        .filter_map(|name| preset_organism(name))
        .collect()
}

pub fn default_free_text_keys() -> Vec<String> {
    vec![
        "organism".to_string(),
        "species".to_string(),
        "host".to_string(),
        "scientific_name".to_string(),
    ]
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overrides() -> ConfigOverrides {
        ConfigOverrides {
            input: Some(Utf8PathBuf::from("corpus")),
            output: Some(Utf8PathBuf::from("out")),
            ..ConfigOverrides::default()
        }
    }

    #[test]
    fn defaults_fill_empty_config() {
        let resolved = ConfigLoader::resolve_config(Config::default(), &overrides()).unwrap();
        assert_eq!(resolved.schema_version, 1);
        assert_eq!(resolved.filter.min_samples, 2);
        assert_eq!(resolved.filter.organisms.len(), 2);
        assert_eq!(resolved.max_read_retries, 2);
        assert!(resolved.workers > 0);
        assert!(resolved.pretty);
    }

    #[test]
    fn overrides_win_over_file_values() {
        let config: Config = serde_json::from_str(
            r#"{"input": "from-file", "output": "out", "workers": 3, "filter": {"min_samples": 5}}"#,
        )
        .unwrap();
        let mut overrides = overrides();
        overrides.min_samples = Some(4);
        overrides.compact = true;
        let resolved = ConfigLoader::resolve_config(config, &overrides).unwrap();
        assert_eq!(resolved.input, Utf8PathBuf::from("corpus"));
        assert_eq!(resolved.workers, 3);
        assert_eq!(resolved.filter.min_samples, 4);
        assert!(!resolved.pretty);
    }
}
