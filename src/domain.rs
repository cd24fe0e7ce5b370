use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::ScraperError;

pub const UNCLASSIFIED: &str = "Unclassified";

/// Which built-in scraping profile to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ProfileKind {
    /// Disease taxonomy, large per-category targets, paginated search.
    Disease,
    /// Granuloma-type taxonomy, 3-5 images per type, histology filter on.
    GranulomaType,
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileKind::Disease => write!(f, "disease"),
            ProfileKind::GranulomaType => write!(f, "granuloma-type"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CategoryId(String);

impl CategoryId {
    pub(crate) fn from_built_in(id: &str) -> Self {
        Self(id.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CategoryId {
    type Err = ScraperError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();
        let is_valid = !normalized.is_empty()
            && normalized
                .chars()
                .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_')
            && !normalized.starts_with('_');
        if !is_valid {
            return Err(ScraperError::InvalidCategoryId(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// An image proposed by a search provider for a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub image_url: String,
    pub title: String,
}

impl Candidate {
    pub fn new(image_url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            image_url: image_url.into(),
            title: title.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StainLabel(String);

impl StainLabel {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn unclassified() -> Self {
        Self(UNCLASSIFIED.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_unclassified(&self) -> bool {
        self.0 == UNCLASSIFIED
    }
}

impl fmt::Display for StainLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
