//! The three persisted maps that make a run resumable.
//!
//! * citations: image key -> [`CitationRecord`]
//! * hashes: image key -> SHA-256 hex digest
//! * url cache: source URL -> RFC 3339 timestamp of when it was processed
//!
//! Each map is loaded independently; a missing or corrupt file yields an empty
//! map and a warning. Keys are `<category>/<stain>/<filename>` relative to the
//! output root.

use std::collections::BTreeMap;
use std::fs;

use camino::Utf8Path;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::ScraperError;
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationRecord {
    pub filename: String,
    pub category: String,
    pub stain: String,
    pub source_url: String,
    pub title: String,
    pub query: String,
    pub download_date: String,
    pub file_hash: String,
}

#[derive(Debug, Clone)]
pub struct Ledger {
    store: Store,
    citations: BTreeMap<String, CitationRecord>,
    hashes: BTreeMap<String, String>,
    urls: BTreeMap<String, String>,
}

impl Ledger {
    pub fn empty(store: Store) -> Self {
        Self {
            store,
            citations: BTreeMap::new(),
            hashes: BTreeMap::new(),
            urls: BTreeMap::new(),
        }
    }

    pub fn load(store: Store) -> Self {
        let citations = load_map(&store.citations_path());
        let hashes = load_map(&store.hashes_path());
        let urls = load_map(&store.url_cache_path());
        debug!(
            citations = citations.len(),
            hashes = hashes.len(),
            urls = urls.len(),
            "ledger loaded"
        );
        Self {
            store,
            citations,
            hashes,
            urls,
        }
    }

    pub fn citations(&self) -> &BTreeMap<String, CitationRecord> {
        &self.citations
    }

    pub fn hashes(&self) -> &BTreeMap<String, String> {
        &self.hashes
    }

    pub fn urls(&self) -> &BTreeMap<String, String> {
        &self.urls
    }

    pub fn contains_url(&self, url: &str) -> bool {
        self.urls.contains_key(url)
    }

    /// Keeps the first timestamp if the URL is already cached.
    pub fn record_url(&mut self, url: &str, timestamp: &str) {
        self.urls
            .entry(url.to_string())
            .or_insert_with(|| timestamp.to_string());
    }

    /// Adds the hash entry, the citation entry and the URL cache entry for a
    /// newly stored image in one step.
    pub fn commit(&mut self, key: &str, record: CitationRecord) {
        self.hashes
            .insert(key.to_string(), record.file_hash.clone());
        self.urls
            .entry(record.source_url.clone())
            .or_insert_with(|| record.download_date.clone());
        self.citations.insert(key.to_string(), record);
    }

    /// Writes all three files; every file is attempted even if one fails.
    pub fn save(&self) -> Result<(), ScraperError> {
        let results = [
            Store::write_json_atomic(&self.store.citations_path(), &self.citations),
            Store::write_json_atomic(&self.store.hashes_path(), &self.hashes),
            Store::write_json_atomic(&self.store.url_cache_path(), &self.urls),
        ];
        results.into_iter().collect::<Result<Vec<_>, _>>()?;
        Ok(())
    }

    /// Saves and logs failures instead of returning them. Returns whether the
    /// flush succeeded.
    pub fn flush(&self) -> bool {
        match self.save() {
            Ok(()) => {
                debug!(root = %self.store.root(), "ledger flushed");
                true
            }
            Err(err) => {
                error!(error = %err, "failed to save ledger");
                false
            }
        }
    }
}

fn load_map<T: DeserializeOwned>(path: &Utf8Path) -> BTreeMap<String, T> {
    if !path.as_std_path().exists() {
        return BTreeMap::new();
    }
    let parsed = fs::read_to_string(path.as_std_path())
        .map_err(|err| err.to_string())
        .and_then(|content| serde_json::from_str(&content).map_err(|err| err.to_string()));
    match parsed {
        Ok(map) => map,
        Err(err) => {
            warn!(path = %path, error = %err, "could not load ledger file, starting empty");
            BTreeMap::new()
        }
    }
}
