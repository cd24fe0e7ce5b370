use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tempfile::Builder;

use crate::domain::StainLabel;
use crate::error::ScraperError;

pub const CITATION_FILE: &str = "image_sources.json";
pub const HASH_FILE: &str = "image_hashes.json";
pub const URL_CACHE_FILE: &str = "scraped_urls.json";
pub const LOG_DIR: &str = "scraper_logs";
pub const BACKUP_DIR: &str = "backups";

/// On-disk layout of the output tree: `<root>/<category>/<stain>/<file>` plus
/// the ledger files at the root.
#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
}

impl Store {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn category_dir(&self, category: &str) -> Utf8PathBuf {
        self.root.join(category)
    }

    pub fn stain_dir(&self, category: &str, stain: &StainLabel) -> Utf8PathBuf {
        self.category_dir(category).join(stain.as_str())
    }

    /// Ledger key of a stored image, relative to the root.
    pub fn image_key(&self, category: &str, stain: &StainLabel, filename: &str) -> String {
        format!("{category}/{}/{filename}", stain.as_str())
    }

    pub fn resolve_key(&self, key: &str) -> Utf8PathBuf {
        self.root.join(key)
    }

    pub fn citations_path(&self) -> Utf8PathBuf {
        self.root.join(CITATION_FILE)
    }

    pub fn hashes_path(&self) -> Utf8PathBuf {
        self.root.join(HASH_FILE)
    }

    pub fn url_cache_path(&self) -> Utf8PathBuf {
        self.root.join(URL_CACHE_FILE)
    }

    pub fn ledger_paths(&self) -> [Utf8PathBuf; 3] {
        [
            self.citations_path(),
            self.hashes_path(),
            self.url_cache_path(),
        ]
    }

    pub fn log_dir(&self) -> Utf8PathBuf {
        self.root.join(LOG_DIR)
    }

    pub fn backup_dir(&self, label: &str) -> Utf8PathBuf {
        self.root.join(BACKUP_DIR).join(label)
    }

    pub fn ensure_root(&self) -> Result<(), ScraperError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| ScraperError::Filesystem(format!("create {}: {err}", self.root)))
    }

    /// Creates the category directory and one subdirectory per stain label.
    pub fn ensure_category_layout(
        &self,
        category: &str,
        stains: &[StainLabel],
    ) -> Result<(), ScraperError> {
        for stain in stains {
            let dir = self.stain_dir(category, stain);
            fs::create_dir_all(dir.as_std_path())
                .map_err(|err| ScraperError::Filesystem(format!("create {dir}: {err}")))?;
        }
        Ok(())
    }

    pub fn write_json_atomic<T: Serialize>(path: &Utf8Path, value: &T) -> Result<(), ScraperError> {
        let mut content = serde_json::to_vec_pretty(value)
            .map_err(|err| ScraperError::LedgerSerialize(err.to_string()))?;
        content.push(b'\n');
        Self::write_bytes_atomic(path, &content)
    }

    /// Writes through a temp file in the destination directory and renames it
    /// into place, so readers never observe a partial file.
    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), ScraperError> {
        let parent = path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."));
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| ScraperError::Filesystem(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix(".granuloma-scraper")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| ScraperError::Filesystem(err.to_string()))?;
        temp.write_all(content)
            .map_err(|err| ScraperError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| ScraperError::Filesystem(format!("persist {path}: {}", err.error)))?;
        Ok(())
    }

    pub fn copy_file_atomic(source: &Utf8Path, dest: &Utf8Path) -> Result<(), ScraperError> {
        let content = fs::read(source.as_std_path())
            .map_err(|err| ScraperError::Filesystem(format!("read {source}: {err}")))?;
        Self::write_bytes_atomic(dest, &content)
    }

    pub fn remove_file(path: &Utf8Path) -> Result<(), ScraperError> {
        fs::remove_file(path.as_std_path())
            .map_err(|err| ScraperError::Filesystem(format!("remove {path}: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let store = Store::new("/data/granulomas");
        let stain = StainLabel::new("AFB_Ziehl");

        let key = store.image_key("tuberculosis", &stain, "tb_01.jpg");
        assert_eq!(key, "tuberculosis/AFB_Ziehl/tb_01.jpg");
        assert!(store.resolve_key(&key).ends_with("tuberculosis/AFB_Ziehl/tb_01.jpg"));
        assert!(store.citations_path().ends_with("image_sources.json"));
        assert!(store.log_dir().ends_with("scraper_logs"));
    }

    #[test]
    fn atomic_write_replaces_content() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let path = root.join("nested").join("file.json");

        Store::write_bytes_atomic(&path, b"first").unwrap();
        Store::write_bytes_atomic(&path, b"second").unwrap();

        assert_eq!(fs::read(path.as_std_path()).unwrap(), b"second");
        let leftovers = fs::read_dir(root.join("nested").as_std_path())
            .unwrap()
            .count();
        assert_eq!(leftovers, 1);
    }
}
