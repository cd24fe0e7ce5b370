use std::fs;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::app::{FailurePolicy, RunOptions};
use crate::domain::{CategoryId, ProfileKind};
use crate::error::ScraperError;
use crate::taxonomy::{Category, FeatureRule, Profile};

pub const DEFAULT_CONFIG_FILE: &str = "granuloma-scraper.json";
pub const DEFAULT_OUTPUT_DIR: &str = "src/assets/images/granulomas";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub profile: Option<ProfileKind>,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub min_width: Option<u32>,
    #[serde(default)]
    pub min_height: Option<u32>,
    #[serde(default)]
    pub max_images: Option<usize>,
    #[serde(default)]
    pub min_images: Option<usize>,
    #[serde(default)]
    pub query_expansion: Option<bool>,
    #[serde(default)]
    pub failure_policy: Option<FailurePolicy>,
    /// Extra domains added to the profile's blocklist.
    #[serde(default)]
    pub blocklist: Vec<String>,
    #[serde(default)]
    pub categories: Vec<CategoryEntry>,
}

/// A category to scrape: either a built-in id, or a full definition that
/// replaces or extends the profile's taxonomy.
#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CategoryEntry {
    Select(String),
    Define(CategoryDefinition),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CategoryDefinition {
    pub id: String,
    pub queries: Vec<String>,
    #[serde(default)]
    pub features: Vec<FeatureRule>,
}

/// Values given on the command line. `None` and empty mean "not given".
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub profile: Option<ProfileKind>,
    pub categories: Vec<String>,
    pub output_dir: Option<String>,
    pub max_images: Option<usize>,
    pub min_images: Option<usize>,
    pub min_resolution: Option<(u32, u32)>,
    pub no_query_expansion: bool,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub profile: Profile,
    /// Normalized category ids to run, in order. Empty means all.
    pub categories: Vec<String>,
    pub output_dir: Utf8PathBuf,
    pub options: RunOptions,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `granuloma-scraper.json` in the working directory if it
    /// exists. An explicit path that cannot be read is an error.
    pub fn load(path: Option<&str>) -> Result<Option<Config>, ScraperError> {
        let config_path = match path {
            Some(path) => Utf8PathBuf::from(path),
            None => Utf8PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.as_std_path().exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(config_path.as_std_path())
            .map_err(|_| ScraperError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| ScraperError::ConfigParse(err.to_string()))?;
        debug!(path = %config_path, "config loaded");
        Ok(Some(config))
    }

    /// Layers command line over file over profile defaults and checks the
    /// image bounds.
    pub fn resolve(
        config: Option<Config>,
        overrides: ConfigOverrides,
    ) -> Result<ResolvedConfig, ScraperError> {
        let config = config.unwrap_or_default();
        let kind = overrides
            .profile
            .or(config.profile)
            .unwrap_or(ProfileKind::Disease);
        let mut profile = Profile::for_kind(kind);
        profile.extend_blocklist(config.blocklist);

        let mut file_categories = Vec::new();
        for entry in config.categories {
            match entry {
                CategoryEntry::Select(id) => file_categories.push(normalize_category(&id)),
                CategoryEntry::Define(definition) => {
                    let id: CategoryId = definition.id.parse()?;
                    if definition.queries.is_empty() {
                        return Err(ScraperError::ConfigParse(format!(
                            "category {id} defines no queries"
                        )));
                    }
                    file_categories.push(id.as_str().to_string());
                    profile.upsert_category(Category {
                        id,
                        queries: definition.queries,
                        features: definition.features,
                    });
                }
            }
        }

        let categories = if overrides.categories.is_empty() {
            file_categories
        } else {
            overrides
                .categories
                .iter()
                .map(|id| normalize_category(id))
                .collect()
        };

        let mut options = RunOptions::for_profile(&profile);
        options.max_images = overrides
            .max_images
            .or(config.max_images)
            .unwrap_or(options.max_images);
        options.min_images = overrides
            .min_images
            .or(config.min_images)
            .unwrap_or(options.min_images);
        let (min_width, min_height) = overrides.min_resolution.unwrap_or((
            config.min_width.unwrap_or(options.min_width),
            config.min_height.unwrap_or(options.min_height),
        ));
        options.min_width = min_width;
        options.min_height = min_height;
        options.query_expansion =
            !overrides.no_query_expansion && config.query_expansion.unwrap_or(true);
        options.failure_policy = config.failure_policy.unwrap_or_default();
        options.validate()?;

        let output_dir = overrides
            .output_dir
            .or(config.output_dir)
            .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string());

        Ok(ResolvedConfig {
            profile,
            categories,
            output_dir: Utf8PathBuf::from(output_dir),
            options,
        })
    }
}

/// Ids that do not parse are kept as typed so the run can report them as
/// unknown.
fn normalize_category(id: &str) -> String {
    id.parse::<CategoryId>()
        .map(|parsed| parsed.as_str().to_string())
        .unwrap_or_else(|_| id.trim().to_string())
}
