use std::fs;

use assert_matches::assert_matches;
use tempfile::TempDir;

use sfa_harvester::config::{Config, ConfigLoader};
use sfa_harvester::domain::Alignment;
use sfa_harvester::error::HarvestError;

#[test]
fn resolve_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sfa-harvest.json");
    fs::write(
        &path,
        r#"{
            "bucket": "opendata-test",
            "store_host": "s3.example.org",
            "languages": ["fr", "de"],
            "alignment": "keyed",
            "catalog": { "url": "https://ckan.example.org/" },
            "queue_dir": "/var/lib/sfa"
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(resolved.base_language().as_str(), "fr");
    assert_eq!(resolved.base_url, "http://opendata-test.s3.example.org");
    assert_eq!(resolved.store.endpoint(), "https://opendata-test.s3.example.org");
    assert_eq!(resolved.alignment, Alignment::Keyed);
    assert_eq!(resolved.catalog.url, "https://ckan.example.org");
    assert_eq!(resolved.base_organization().name, "Archives fédérales suisses");
}

#[test]
fn explicit_base_url_wins() {
    let config = Config {
        base_url: Some("https://files.example.org/".to_string()),
        ..Config::default()
    };
    let resolved = ConfigLoader::resolve_config(config).unwrap();
    assert_eq!(resolved.base_url, "https://files.example.org");
}

#[test]
fn reject_bad_language_code() {
    let config = Config {
        languages: Some(vec!["de".to_string(), "fra".to_string()]),
        ..Config::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(config),
        Err(HarvestError::InvalidLanguage(_))
    );
}

#[test]
fn reject_empty_language_list() {
    let config = Config {
        languages: Some(Vec::new()),
        ..Config::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(config),
        Err(HarvestError::InvalidConfig(_))
    );
}

#[test]
fn reject_malformed_json() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.json");
    fs::write(&path, "{ \"bucket\": ").unwrap();
    assert_matches!(
        ConfigLoader::resolve(path.to_str()),
        Err(HarvestError::ConfigParse(_))
    );
}

#[test]
fn unreadable_explicit_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.json");
    assert_matches!(
        ConfigLoader::resolve(path.to_str()),
        Err(HarvestError::ConfigRead(_))
    );
}
