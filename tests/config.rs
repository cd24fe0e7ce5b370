use std::fs;

use assert_matches::assert_matches;

use granuloma_scraper::app::FailurePolicy;
use granuloma_scraper::config::{CategoryEntry, Config, ConfigLoader, ConfigOverrides};
use granuloma_scraper::domain::ProfileKind;
use granuloma_scraper::error::ScraperError;

const FILE: &str = r#"{
    "profile": "granuloma-type",
    "output_dir": "data/granulomas",
    "min_width": 512,
    "max_images": 4,
    "query_expansion": false,
    "failure_policy": "record-all",
    "blocklist": ["Example-Publisher.com"],
    "categories": [
        "Foreign_Body_Granulomas",
        {
            "id": "silicotic_nodules",
            "queries": ["silicotic nodule lung histology"],
            "features": [{ "any": ["birefringent"], "tag": "birefringent" }]
        }
    ]
}"#;

#[test]
fn file_values_are_parsed_and_layered() {
    let config: Config = serde_json::from_str(FILE).unwrap();
    assert_matches!(&config.categories[0], CategoryEntry::Select(id) if id == "Foreign_Body_Granulomas");
    assert_matches!(&config.categories[1], CategoryEntry::Define(def) if def.queries.len() == 1);

    let resolved = ConfigLoader::resolve(Some(config), ConfigOverrides::default()).unwrap();
    assert_eq!(resolved.profile.kind, ProfileKind::GranulomaType);
    assert_eq!(resolved.output_dir, "data/granulomas");
    assert_eq!(resolved.options.min_width, 512);
    assert_eq!(resolved.options.min_height, 300);
    assert_eq!(resolved.options.max_images, 4);
    assert_eq!(resolved.options.min_images, 3);
    assert!(!resolved.options.query_expansion);
    assert_eq!(resolved.options.failure_policy, FailurePolicy::RecordAll);
    assert_eq!(
        resolved.categories,
        vec!["foreign_body_granulomas".to_string(), "silicotic_nodules".to_string()]
    );
    assert!(resolved.profile.category("silicotic_nodules").is_some());
    assert!(resolved.profile.blocklist.contains(&"example-publisher.com".to_string()));
}

#[test]
fn command_line_wins_over_file() {
    let config: Config = serde_json::from_str(FILE).unwrap();
    let overrides = ConfigOverrides {
        profile: Some(ProfileKind::Disease),
        categories: vec!["Sarcoidosis".to_string()],
        output_dir: Some("elsewhere".to_string()),
        max_images: Some(10),
        min_images: Some(2),
        min_resolution: Some((800, 600)),
        no_query_expansion: false,
    };

    let resolved = ConfigLoader::resolve(Some(config), overrides).unwrap();
    assert_eq!(resolved.profile.kind, ProfileKind::Disease);
    assert_eq!(resolved.categories, vec!["sarcoidosis".to_string()]);
    assert_eq!(resolved.output_dir, "elsewhere");
    assert_eq!((resolved.options.min_width, resolved.options.min_height), (800, 600));
    assert_eq!(resolved.options.max_images, 10);
    assert_eq!(resolved.options.min_images, 2);
    // The file disabled expansion; the flag can only disable, never re-enable.
    assert!(!resolved.options.query_expansion);
}

#[test]
fn min_above_max_fails_before_anything_runs() {
    let overrides = ConfigOverrides {
        profile: Some(ProfileKind::GranulomaType),
        max_images: Some(2),
        ..ConfigOverrides::default()
    };
    let err = ConfigLoader::resolve(None, overrides).unwrap_err();
    assert_matches!(err, ScraperError::InvalidImageBounds { min: 3, max: 2 });
}

#[test]
fn invalid_defined_category_is_rejected() {
    let config: Config =
        serde_json::from_str(r#"{ "categories": [{ "id": "../escape", "queries": ["q"] }] }"#)
            .unwrap();
    let err = ConfigLoader::resolve(Some(config), ConfigOverrides::default()).unwrap_err();
    assert_matches!(err, ScraperError::InvalidCategoryId(_));
}

#[test]
fn explicit_missing_file_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let missing = temp.path().join("missing.json");
    let err = ConfigLoader::load(missing.to_str()).unwrap_err();
    assert_matches!(err, ScraperError::ConfigRead(_));
}

#[test]
fn malformed_file_is_a_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("granuloma-scraper.json");
    fs::write(&path, "{ \"max_images\": \"many\" }").unwrap();
    let err = ConfigLoader::load(path.to_str()).unwrap_err();
    assert_matches!(err, ScraperError::ConfigParse(_));
}
