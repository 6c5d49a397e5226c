//! Content-addressed response cache
//!
//! This module handles:
//! - The [`ResponseCache`] interface the fetcher reads and writes through
//! - A durable directory-backed store ([`DiskCache`])
//! - An in-memory store for tests ([`MemoryCache`])

mod disk;
mod memory;
mod traits;

pub use disk::DiskCache;
pub use memory::MemoryCache;
pub use traits::{CacheError, CacheResult, ResponseCache};

use std::path::Path;
use std::sync::Arc;

/// Opens the directory cache as a shareable trait object
pub fn open_cache(directory: &Path) -> CacheResult<Arc<dyn ResponseCache>> {
    let cache = DiskCache::open(directory)?;
    tracing::debug!("Using response cache at {}", directory.display());
    Ok(Arc::new(cache))
}
