use regex::{Regex, RegexBuilder};

use crate::domain::StainLabel;
use crate::error::ScraperError;
use crate::taxonomy::StainPatterns;

/// Maps candidate text to a stain label. Labels are tried in table order and
/// the first label with any matching pattern wins.
#[derive(Debug, Clone)]
pub struct StainClassifier {
    table: Vec<(StainLabel, Vec<Regex>)>,
}

impl StainClassifier {
    pub fn new(stains: &[StainPatterns]) -> Result<Self, ScraperError> {
        let table = stains
            .iter()
            .map(|entry| {
                let compiled = entry
                    .patterns
                    .iter()
                    .map(|pattern| {
                        RegexBuilder::new(pattern)
                            .case_insensitive(true)
                            .build()
                            .map_err(|err| ScraperError::InvalidPattern {
                                stain: entry.label.clone(),
                                pattern: pattern.clone(),
                                message: err.to_string(),
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((StainLabel::new(entry.label.clone()), compiled))
            })
            .collect::<Result<Vec<_>, ScraperError>>()?;
        Ok(Self { table })
    }

    pub fn labels(&self) -> impl Iterator<Item = &StainLabel> {
        self.table.iter().map(|(label, _)| label)
    }

    pub fn classify(&self, url: &str, title: &str) -> StainLabel {
        let text = format!("{url} {title}").to_lowercase();
        self.table
            .iter()
            .find(|(_, patterns)| patterns.iter().any(|re| re.is_match(&text)))
            .map(|(label, _)| label.clone())
            .unwrap_or_else(StainLabel::unclassified)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::taxonomy::Profile;

    fn classifier() -> StainClassifier {
        StainClassifier::new(&Profile::granuloma_type().stains).unwrap()
    }

    #[test]
    fn hematoxylin_eosin_spelled_out() {
        let label = classifier().classify(
            "https://upload.wikimedia.org/lung.jpg",
            "Hematoxylin and Eosin section",
        );
        assert_eq!(label.as_str(), "H&E");
    }

    #[test]
    fn earlier_label_takes_precedence() {
        let label = classifier().classify(
            "https://upload.wikimedia.org/lung.jpg",
            "AFB stain next to GMS silver stain",
        );
        assert_eq!(label.as_str(), "AFB_Ziehl");
    }

    #[test]
    fn bad_pattern_is_reported() {
        let table = vec![StainPatterns {
            label: "Broken".to_string(),
            patterns: vec!["(unclosed".to_string()],
        }];
        let err = StainClassifier::new(&table).unwrap_err();
        assert_matches!(err, ScraperError::InvalidPattern { .. });
    }
}
