use scraper::{Html, Selector};
use tracing::{debug, error};

use crate::domain::Candidate;
use crate::download::Transport;
use crate::error::ScraperError;
use crate::pacing::{DelayRange, Pacer};

use super::ImageSearchProvider;

pub const GOOGLE_SEARCH_URL: &str = "https://www.google.com/search";

/// Single results page from Google image search. Used as the fallback backend.
pub struct GoogleProvider<T, Z> {
    transport: T,
    pacer: Z,
    page_delay: DelayRange,
}

impl<T, Z> GoogleProvider<T, Z>
where
    T: Transport,
    Z: Pacer,
{
    pub fn new(transport: T, pacer: Z, page_delay: DelayRange) -> Self {
        Self {
            transport,
            pacer,
            page_delay,
        }
    }

    fn fetch_page(&self, url: &str) -> Result<String, ScraperError> {
        let response = self.transport.get(url)?;
        if !response.is_success() {
            return Err(ScraperError::HttpStatus {
                status: response.status,
                url: url.to_string(),
            });
        }
        response.read_text()
    }
}

impl<T, Z> ImageSearchProvider for GoogleProvider<T, Z>
where
    T: Transport,
    Z: Pacer,
{
    fn name(&self) -> &str {
        "google"
    }

    fn fetch(&self, query: &str, limit: usize) -> Vec<Candidate> {
        if limit == 0 {
            return Vec::new();
        }
        let url = google_search_url(query);
        match self.fetch_page(&url) {
            Ok(html) => {
                let mut candidates = parse_google_page(&html);
                candidates.truncate(limit);
                debug!(query, found = candidates.len(), "google page parsed");
                self.pacer.pause(self.page_delay, "search page");
                candidates
            }
            Err(err) => {
                error!(query, error = %err, "error fetching google results");
                Vec::new()
            }
        }
    }
}

pub fn google_search_url(query: &str) -> String {
    format!("{GOOGLE_SEARCH_URL}?q={}&tbm=isch", urlencoding::encode(query))
}

/// Every `img` whose `src` is an absolute http(s) URL. Inline `data:` images
/// have no host to attribute and are skipped. Titles are not available on
/// this page.
pub fn parse_google_page(html: &str) -> Vec<Candidate> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("img") else {
        return Vec::new();
    };
    document
        .select(&selector)
        .filter_map(|img| img.value().attr("src"))
        .filter(|src| src.starts_with("http"))
        .map(|src| Candidate::new(src, ""))
        .collect()
}
