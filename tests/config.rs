use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use kira_sra_digest::config::{
    Config, ConfigLoader, ConfigOverrides, OrganismEntry, default_organisms, preset_organism,
};
use kira_sra_digest::error::KiraError;

#[test]
fn parse_config_with_organism_entries() {
    let config: Config = serde_json::from_str(
        r#"{
            "input": "corpus",
            "output": "out",
            "workers": 4,
            "filter": {
                "min_samples": 3,
                "organisms": [
                    "human",
                    {"label": "rat", "taxon_ids": [10116], "names": ["Rattus norvegicus"], "patterns": ["(?i)\\brat\\b"]}
                ]
            },
            "summary": {"max_unique_values": 20}
        }"#,
    )
    .unwrap();
    let organisms = config
        .filter
        .as_ref()
        .and_then(|filter| filter.organisms.as_ref())
        .unwrap();
    assert_matches!(&organisms[0], OrganismEntry::Shorthand(name) if name == "human");
    assert_matches!(&organisms[1], OrganismEntry::Detailed(_));

    let resolved = ConfigLoader::resolve_config(config, &ConfigOverrides::default()).unwrap();
    assert_eq!(resolved.input, Utf8PathBuf::from("corpus"));
    assert_eq!(resolved.workers, 4);
    assert_eq!(resolved.filter.min_samples, 3);
    assert_eq!(resolved.filter.organisms.len(), 2);
    assert_eq!(resolved.filter.organisms[1].taxon_ids, vec![10116]);
    assert_eq!(resolved.summary.max_unique_values, 20);
    assert_eq!(resolved.summary.min_value_count, 3);
}

#[test]
fn unknown_preset_is_rejected() {
    let config: Config = serde_json::from_str(
        r#"{"input": "in", "output": "out", "filter": {"organisms": ["dragon"]}}"#,
    )
    .unwrap();
    let err = ConfigLoader::resolve_config(config, &ConfigOverrides::default()).unwrap_err();
    assert_matches!(err, KiraError::ConfigParse(_));
}

#[test]
fn missing_input_is_a_config_error() {
    let err =
        ConfigLoader::resolve_config(Config::default(), &ConfigOverrides::default()).unwrap_err();
    assert_matches!(err, KiraError::ConfigParse(_));
    assert!(err.is_fatal());
}

#[test]
fn resolve_reads_explicit_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("custom.json");
    fs::write(&path, r#"{"input": "a", "output": "b", "pretty": false, "limit": 5}"#).unwrap();

    let resolved =
        ConfigLoader::resolve(path.to_str(), &ConfigOverrides::default()).unwrap();
    assert_eq!(resolved.output, Utf8PathBuf::from("b"));
    assert_eq!(resolved.limit, Some(5));
    assert!(!resolved.pretty);
}

#[test]
fn unreadable_or_invalid_file_errors() {
    let temp = tempfile::tempdir().unwrap();
    let missing = temp.path().join("nope.json");
    let err = ConfigLoader::resolve(missing.to_str(), &ConfigOverrides::default()).unwrap_err();
    assert_matches!(err, KiraError::ConfigRead(_));

    let broken = temp.path().join("broken.json");
    fs::write(&broken, "{ not json").unwrap();
    let err = ConfigLoader::resolve(broken.to_str(), &ConfigOverrides::default()).unwrap_err();
    assert_matches!(err, KiraError::ConfigParse(_));
}

#[test]
fn cli_paths_stand_in_for_missing_default_file() {
    let overrides = ConfigOverrides {
        input: Some(Utf8PathBuf::from("corpus")),
        output: Some(Utf8PathBuf::from("out")),
        ..ConfigOverrides::default()
    };
    let resolved = ConfigLoader::resolve(None, &overrides).unwrap();
    assert_eq!(resolved.filter.organisms, default_organisms());

    let err = ConfigLoader::resolve(None, &ConfigOverrides::default()).unwrap_err();
    assert_matches!(err, KiraError::MissingConfig);
}

#[test]
fn presets_accept_scientific_names() {
    let mouse = preset_organism("Mus musculus").unwrap();
    assert_eq!(mouse.label, "mouse");
    assert_eq!(mouse.taxon_ids, vec![10090]);
    assert!(preset_organism("yeast").is_none());
}

#[test]
fn min_samples_below_two_is_rejected() {
    let overrides = ConfigOverrides {
        input: Some(Utf8PathBuf::from("corpus")),
        output: Some(Utf8PathBuf::from("out")),
        min_samples: Some(1),
        ..ConfigOverrides::default()
    };
    let err = ConfigLoader::resolve_config(Config::default(), &overrides).unwrap_err();
    assert_matches!(err, KiraError::ConfigParse(message) if message.contains("min_samples"));

    let config: Config = serde_json::from_str(
        r#"{"input": "in", "output": "out", "filter": {"min_samples": 0}}"#,
    )
    .unwrap();
    let err = ConfigLoader::resolve_config(config, &ConfigOverrides::default()).unwrap_err();
    assert_matches!(err, KiraError::ConfigParse(_));
}
