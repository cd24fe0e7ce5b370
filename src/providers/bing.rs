use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::domain::Candidate;
use crate::download::Transport;
use crate::error::ScraperError;
use crate::pacing::{DelayRange, Pacer};
use crate::taxonomy::SearchMode;

use super::ImageSearchProvider;

pub const BING_SEARCH_URL: &str = "https://www.bing.com/images/search";
pub const BING_PAGE_SIZE: usize = 50;

/// Bing image search, paginated through `first=` offsets.
pub struct BingProvider<T, Z> {
    transport: T,
    pacer: Z,
    mode: SearchMode,
    page_delay: DelayRange,
    error_delay: DelayRange,
}

impl<T, Z> BingProvider<T, Z>
where
    T: Transport,
    Z: Pacer,
{
    pub fn new(
        transport: T,
        pacer: Z,
        mode: SearchMode,
        page_delay: DelayRange,
        error_delay: DelayRange,
    ) -> Self {
        Self {
            transport,
            pacer,
            mode,
            page_delay,
            error_delay,
        }
    }

    fn page_ceiling(&self) -> usize {
        match self.mode {
            SearchMode::Paginated { max_pages } => max_pages.max(1),
            SearchMode::SinglePage => 1,
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

impl<T, Z> ImageSearchProvider for BingProvider<T, Z>
where
    T: Transport,
    Z: Pacer,
{
    fn name(&self) -> &str {
        "bing"
    }

    fn fetch(&self, query: &str, limit: usize) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        let mut page = 1usize;
        let mut requests = 0usize;
        let ceiling = self.page_ceiling();

        // Failed requests count against the ceiling too, so a backend that
        // keeps erroring cannot stall the run.
        while candidates.len() < limit && requests < ceiling {
            requests += 1;
            let url = bing_search_url(query, page);
            let html = match self.fetch_page(&url) {
                Ok(html) => html,
                Err(err) => {
                    error!(query, error = %err, "error fetching bing results");
                    self.pacer.pause(self.error_delay, "search error");
                    continue;
                }
            };

            let parsed = parse_bing_page(&html);
            if parsed.anchors == 0 {
                warn!(query, page, "no more results");
                break;
            }
            debug!(query, page, found = parsed.candidates.len(), "bing page parsed");
            let remaining = limit - candidates.len();
            candidates.extend(parsed.candidates.into_iter().take(remaining));
            page += 1;
            self.pacer.pause(self.page_delay, "search page");
        }

        candidates.truncate(limit);
        candidates
    }
}

pub fn bing_search_url(query: &str, page: usize) -> String {
    format!(
        "{BING_SEARCH_URL}?q={}&form=HDRSC2&first={}",
        urlencoding::encode(query),
        page * BING_PAGE_SIZE
    )
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BingPage {
    /// Result anchors on the page, including ones that yielded nothing.
    pub anchors: usize,
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct BingMetadata {
    murl: Option<String>,
    t: Option<String>,
}

/// Extracts `(murl, t)` from the JSON in each `a.iusc` anchor's `m` attribute.
/// Anchors with missing or malformed metadata are skipped.
pub fn parse_bing_page(html: &str) -> BingPage {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a.iusc") else {
        return BingPage::default();
    };

    let mut page = BingPage::default();
    for anchor in document.select(&selector) {
        page.anchors += 1;
        let Some(raw) = anchor.value().attr("m") else {
            continue;
        };
        let metadata: BingMetadata = match serde_json::from_str(raw) {
            Ok(metadata) => metadata,
            Err(err) => {
                debug!(error = %err, "skipping anchor with bad metadata");
                continue;
            }
        };
        let Some(image_url) = metadata.murl.filter(|url| url.starts_with("http")) else {
            continue;
        };
        page.candidates
            .push(Candidate::new(image_url, metadata.t.unwrap_or_default()));
    }
    page
}
