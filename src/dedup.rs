use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::ScraperError;

/// Result of hashing a freshly written file against the hash index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashCheck {
    pub digest: String,
    /// Key of an already indexed file with the same digest.
    pub duplicate_of: Option<String>,
}

impl HashCheck {
    pub fn is_duplicate(&self) -> bool {
        self.duplicate_of.is_some()
    }
}

pub fn sha256_bytes(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}

pub fn sha256_file(path: &Path) -> Result<String, ScraperError> {
    let mut file = File::open(path)
        .map_err(|err| ScraperError::Filesystem(format!("open {}: {err}", path.display())))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .map_err(|err| ScraperError::Filesystem(format!("read {}: {err}", path.display())))?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Hashes `path` and looks for another key in `hashes` with the same digest.
/// The entry for `own_key` itself is ignored.
pub fn check_file(
    path: &Path,
    own_key: &str,
    hashes: &BTreeMap<String, String>,
) -> Result<HashCheck, ScraperError> {
    let digest = sha256_file(path)?;
    let duplicate_of = hashes
        .iter()
        .find(|(key, existing)| key.as_str() != own_key && **existing == digest)
        .map(|(key, _)| key.clone());
    if let Some(existing) = &duplicate_of {
        info!(file = %path.display(), existing = %existing, "duplicate detected");
    }
    Ok(HashCheck {
        digest,
        duplicate_of,
    })
}

pub fn is_duplicate(
    path: &Path,
    own_key: &str,
    hashes: &BTreeMap<String, String>,
) -> Result<bool, ScraperError> {
    Ok(check_file(path, own_key, hashes)?.is_duplicate())
}
