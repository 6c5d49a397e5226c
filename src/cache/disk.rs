use crate::cache::traits::{CacheError, CacheResult, ResponseCache};
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Directory of JSON files, one per request digest
pub struct DiskCache {
    directory: PathBuf,
    temp_counter: AtomicU64,
}

impl DiskCache {
    /// Opens (creating if necessary) a cache directory
    ///
    /// # Arguments
    ///
    /// * `directory` - Directory that holds one file per digest
    ///
    /// # Returns
    ///
    /// * `Ok(DiskCache)` - The directory exists and is usable
    /// * `Err(CacheError)` - The directory could not be created
    pub fn open(directory: &Path) -> CacheResult<Self> {
        fs::create_dir_all(directory)?;
        Ok(Self {
            directory: directory.to_path_buf(),
            temp_counter: AtomicU64::new(0),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn entry_path(&self, digest: &str) -> CacheResult<PathBuf> {
        // Digests are hex; anything else could escape the directory
        if digest.is_empty() || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CacheError::InvalidDigest(digest.to_string()));
        }
        Ok(self.directory.join(digest))
    }
}

impl ResponseCache for DiskCache {
    fn get(&self, digest: &str) -> CacheResult<Option<Value>> {
        let path = self.entry_path(digest)?;
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| CacheError::Corrupt {
                digest: digest.to_string(),
                message: e.to_string(),
            })
    }

    fn put(&self, digest: &str, payload: &Value) -> CacheResult<()> {
        let path = self.entry_path(digest)?;

        // Write to a private temp file, then rename over the entry so readers
        // never observe a partial file.
        let sequence = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        let temp = self
            .directory
            .join(format!(".{}.{}.{}.tmp", digest, std::process::id(), sequence));
        fs::write(&temp, serde_json::to_vec(payload)?)?;
        if let Err(e) = fs::rename(&temp, &path) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }
        Ok(())
    }
}
