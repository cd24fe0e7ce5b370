use url::Url;

use crate::taxonomy::{HistologyVocabulary, Profile};

#[derive(Debug, Clone)]
pub struct CandidateFilter {
    blocklist: Vec<String>,
    histology: Option<HistologyVocabulary>,
}

impl CandidateFilter {
    pub fn new(blocklist: Vec<String>, histology: Option<HistologyVocabulary>) -> Self {
        let blocklist = blocklist
            .into_iter()
            .map(|domain| domain.to_lowercase())
            .collect();
        Self {
            blocklist,
            histology,
        }
    }

    pub fn from_profile(profile: &Profile) -> Self {
        Self::new(profile.blocklist.clone(), profile.histology.clone())
    }

    pub fn histology_enabled(&self) -> bool {
        self.histology.is_some()
    }

    /// Fails closed: URLs without a parseable host count as blocked.
    pub fn is_domain_blocked(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return true;
        };
        let Some(host) = parsed.host_str() else {
            return true;
        };
        let host = host.to_lowercase();
        self.blocklist
            .iter()
            .any(|blocked| host.contains(blocked.as_str()))
    }

    /// Always true when no histology vocabulary is configured.
    pub fn is_histology_relevant(&self, url: &str, title: &str) -> bool {
        let Some(vocabulary) = &self.histology else {
            return true;
        };
        let text = format!("{url} {title}").to_lowercase();
        let has_indicator = vocabulary
            .indicators
            .iter()
            .any(|term| text.contains(term.as_str()));
        let has_exclusion = vocabulary
            .exclusions
            .iter()
            .any(|term| text.contains(term.as_str()));
        has_indicator && !has_exclusion
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::{default_blocklist, default_histology_vocabulary};

    #[test]
    fn blocklist_matches_subdomains() {
        let filter = CandidateFilter::new(default_blocklist(), None);
        assert!(filter.is_domain_blocked("https://ars.els-cdn.elsevier.com/content/image.jpg"));
        assert!(filter.is_domain_blocked("https://WWW.NATURE.COM/articles/fig.png"));
        assert!(!filter.is_domain_blocked("https://upload.wikimedia.org/image.jpg"));
    }

    #[test]
    fn histology_requires_indicator_without_exclusion() {
        let filter =
            CandidateFilter::new(default_blocklist(), Some(default_histology_vocabulary()));
        let url = "https://upload.wikimedia.org/wiki/img.jpg";
        assert!(filter.is_histology_relevant(url, "Lung biopsy, H&E"));
        assert!(!filter.is_histology_relevant(url, "Chest X-ray of granulomas"));
        assert!(!filter.is_histology_relevant(url, "granulomas"));
    }
}
