use chrono::Local;
use tracing::{info, warn};

use crate::error::ScraperError;
use crate::store::Store;

pub fn backup_label() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

/// Copies the ledger files that exist into `<root>/backups/<label>/`.
/// Returns how many files were copied.
pub fn backup_ledgers(store: &Store, label: &str) -> Result<usize, ScraperError> {
    let dir = store.backup_dir(label);
    let mut copied = 0usize;
    for source in store.ledger_paths() {
        if !source.as_std_path().exists() {
            continue;
        }
        let Some(name) = source.file_name() else {
            continue;
        };
        Store::copy_file_atomic(&source, &dir.join(name))?;
        copied += 1;
    }
    if copied > 0 {
        info!(dir = %dir, files = copied, "ledger backup created");
    }
    Ok(copied)
}

/// Like [`backup_ledgers`] with today's label; failures are only logged.
pub fn backup_before_run(store: &Store) {
    if let Err(err) = backup_ledgers(store, &backup_label()) {
        warn!(error = %err, "ledger backup failed");
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use camino::Utf8PathBuf;

    use super::*;

    #[test]
    fn copies_only_existing_ledgers() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let store = Store::new(root);
        fs::write(store.hashes_path().as_std_path(), b"{}\n").unwrap();

        let copied = backup_ledgers(&store, "2025-01-01").unwrap();
        assert_eq!(copied, 1);
        let backup = store.backup_dir("2025-01-01").join("image_hashes.json");
        assert_eq!(fs::read(backup.as_std_path()).unwrap(), b"{}\n");
        assert!(!store.backup_dir("2025-01-01").join("image_sources.json").exists());
    }
}
