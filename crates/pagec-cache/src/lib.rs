//! Content-addressed cache for derived build artifacts.
//!
//! Compiled stylesheets, optimized SVGs and downloaded resources are stored
//! under a fingerprint of their inputs. Two traits of the design matter to
//! callers:
//!
//! - Entries are immutable. A changed input hashes to a new fingerprint and
//!   creates a new entry; the old one is orphaned, never corrected or deleted.
//! - A failing computation writes nothing, so a rerun recomputes it.
//!
//! # Layers
//!
//! - [`DerivativeCache::new`]: on-disk store, optionally fronted by a
//!   byte-bounded LRU ([`DerivativeCache::with_memory_limit`])
//! - [`DerivativeCache::disabled`]: always computes, stores nothing
//!
//! # Example
//!
//! ```
//! use pagec_cache::{CacheError, DerivativeCache};
//!
//! let dir = tempfile::tempdir()?;
//! let cache = DerivativeCache::new(dir.path().join("cache"));
//! let styles = cache.bucket("styles");
//!
//! let css = styles.get_or_compute(b"a { b: c }", || {
//!     Ok::<_, CacheError>(b"a{b:c}".to_vec())
//! })?;
//! assert_eq!(css, b"a{b:c}");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod file;
mod fingerprint;
mod memory;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

pub use fingerprint::Fingerprint;
use file::FileStore;
use memory::MemoryCache;
use pagec_paths::PathTraversal;

/// Error returned by cache reads and writes.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Filesystem failure while reading or persisting an entry.
    #[error("Cache I/O error at {}: {source}", .path.display())]
    Io {
        /// Path of the entry or directory involved.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
    /// Entry path resolved outside the cache root.
    #[error(transparent)]
    Traversal(#[from] PathTraversal),
    /// A text entry holds bytes that are not UTF-8.
    #[error("Cache entry {fingerprint} is not valid UTF-8")]
    InvalidUtf8 {
        /// Fingerprint of the offending entry.
        fingerprint: String,
    },
}

/// Handle to the derivative cache.
///
/// Cloning is cheap and every clone shares the same disk root and memory
/// layer, so one cache can be owned by the build and handed to each
/// consumer.
#[derive(Debug, Clone)]
pub struct DerivativeCache {
    disk: Option<Arc<FileStore>>,
    memory: Option<Arc<Mutex<MemoryCache>>>,
}

impl DerivativeCache {
    /// Cache rooted at `root`. The directory is created on first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            disk: Some(Arc::new(FileStore::new(root.into()))),
            memory: None,
        }
    }

    /// Cache that never stores anything: every lookup computes.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            disk: None,
            memory: None,
        }
    }

    /// Keep up to `bytes` of recently used bodies in memory.
    #[must_use]
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory = Some(Arc::new(Mutex::new(MemoryCache::new(bytes))));
        self
    }

    /// Disk root, `None` when caching is disabled.
    #[must_use]
    pub fn root(&self) -> Option<&Path> {
        self.disk.as_deref().map(FileStore::root)
    }

    /// Bytes currently held by the memory layer.
    #[must_use]
    pub fn memory_usage(&self) -> usize {
        self.memory.as_ref().map_or(0, |memory| {
            memory.lock().unwrap_or_else(PoisonError::into_inner).used()
        })
    }

    /// Open a named bucket (`styles`, `svg`, `remote`, ...).
    ///
    /// Buckets are separate directories, so equal inputs in different
    /// buckets never collide.
    #[must_use]
    pub fn bucket(&self, name: &str) -> CacheBucket {
        CacheBucket {
            cache: self.clone(),
            name: name.to_owned(),
        }
    }
}

/// A namespace within a [`DerivativeCache`].
#[derive(Debug, Clone)]
pub struct CacheBucket {
    cache: DerivativeCache,
    name: String,
}

impl CacheBucket {
    /// Bucket name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the cached body for `inputs`, computing and storing it on a miss.
    ///
    /// `compute` runs at most once per call and only on a miss. Its error is
    /// returned as is and nothing is written.
    pub fn get_or_compute<E, F>(&self, inputs: &[u8], compute: F) -> Result<Vec<u8>, E>
    where
        F: FnOnce() -> Result<Vec<u8>, E>,
        E: From<CacheError>,
    {
        let fingerprint = Fingerprint::of(inputs);
        if let Some(body) = self.lookup(&fingerprint)? {
            tracing::debug!(bucket = %self.name, %fingerprint, "Cache hit");
            return Ok(body);
        }

        tracing::debug!(bucket = %self.name, %fingerprint, "Cache miss");
        let body = compute()?;
        self.store(&fingerprint, &body)?;
        Ok(body)
    }

    /// [`get_or_compute`](Self::get_or_compute) for UTF-8 bodies.
    pub fn get_or_compute_string<E, F>(&self, inputs: &[u8], compute: F) -> Result<String, E>
    where
        F: FnOnce() -> Result<String, E>,
        E: From<CacheError>,
    {
        let body = self.get_or_compute(inputs, || compute().map(String::into_bytes))?;
        String::from_utf8(body).map_err(|_| {
            CacheError::InvalidUtf8 {
                fingerprint: Fingerprint::of(inputs).to_string(),
            }
            .into()
        })
    }

    fn memory_key(&self, fingerprint: &Fingerprint) -> String {
        format!("{}/{fingerprint}", self.name)
    }

    fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<Vec<u8>>, CacheError> {
        if let Some(memory) = &self.cache.memory {
            let mut memory = memory.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(body) = memory.get(&self.memory_key(fingerprint)) {
                return Ok(Some(body));
            }
        }

        let Some(disk) = &self.cache.disk else {
            return Ok(None);
        };
        let body = disk.read(&self.name, fingerprint)?;
        if let (Some(body), Some(memory)) = (&body, &self.cache.memory) {
            memory
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(&self.memory_key(fingerprint), body);
        }
        Ok(body)
    }

    fn store(&self, fingerprint: &Fingerprint, body: &[u8]) -> Result<(), CacheError> {
        if let Some(disk) = &self.cache.disk {
            disk.write(&self.name, fingerprint, body)?;
        }
        if let Some(memory) = &self.cache.memory {
            memory
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(&self.memory_key(fingerprint), body);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;
    use tempfile::TempDir;

    #[derive(Debug, thiserror::Error)]
    enum TestError {
        #[error(transparent)]
        Cache(#[from] CacheError),
        #[error("compiler exploded")]
        Compute,
    }

    fn counting_compute<'a>(
        calls: &'a Cell<usize>,
        body: &'a [u8],
    ) -> impl FnOnce() -> Result<Vec<u8>, TestError> + 'a {
        move || {
            calls.set(calls.get() + 1);
            Ok(body.to_vec())
        }
    }

    #[test]
    fn test_identical_inputs_compute_once() {
        let tmp = TempDir::new().unwrap();
        let bucket = DerivativeCache::new(tmp.path().join("cache")).bucket("styles");
        let calls = Cell::new(0);

        let first = bucket
            .get_or_compute(b"a { color: red }", counting_compute(&calls, b"a{color:red}"))
            .unwrap();
        let second = bucket
            .get_or_compute(b"a { color: red }", counting_compute(&calls, b"unused"))
            .unwrap();

        assert_eq!(calls.get(), 1);
        assert_eq!(first, b"a{color:red}");
        assert_eq!(second, b"a{color:red}");
    }

    #[test]
    fn test_changed_input_recomputes() {
        let tmp = TempDir::new().unwrap();
        let bucket = DerivativeCache::new(tmp.path().join("cache")).bucket("styles");
        let calls = Cell::new(0);

        bucket
            .get_or_compute(b"a { color: red }", counting_compute(&calls, b"red"))
            .unwrap();
        let changed = bucket
            .get_or_compute(b"a { color: rad }", counting_compute(&calls, b"rad"))
            .unwrap();

        assert_eq!(calls.get(), 2);
        assert_eq!(changed, b"rad");
    }

    #[test]
    fn test_entries_survive_new_handle() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("cache");
        let calls = Cell::new(0);

        DerivativeCache::new(root.clone())
            .bucket("svg")
            .get_or_compute(b"<svg> </svg>", counting_compute(&calls, b"<svg/>"))
            .unwrap();
        let reloaded = DerivativeCache::new(root)
            .bucket("svg")
            .get_or_compute(b"<svg> </svg>", counting_compute(&calls, b"other"))
            .unwrap();

        assert_eq!(calls.get(), 1);
        assert_eq!(reloaded, b"<svg/>");
    }

    #[test]
    fn test_failed_compute_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("cache");
        let bucket = DerivativeCache::new(root.clone()).bucket("styles");

        let result = bucket.get_or_compute(b"broken", || Err(TestError::Compute));

        assert!(matches!(result, Err(TestError::Compute)));
        assert!(!root.join("styles").exists());
    }

    #[test]
    fn test_buckets_are_isolated() {
        let tmp = TempDir::new().unwrap();
        let cache = DerivativeCache::new(tmp.path().join("cache"));
        let calls = Cell::new(0);

        cache
            .bucket("styles")
            .get_or_compute(b"same", counting_compute(&calls, b"css"))
            .unwrap();
        let svg = cache
            .bucket("svg")
            .get_or_compute(b"same", counting_compute(&calls, b"svg"))
            .unwrap();

        assert_eq!(calls.get(), 2);
        assert_eq!(svg, b"svg");
    }

    #[test]
    fn test_disabled_cache_always_computes() {
        let bucket = DerivativeCache::disabled().bucket("styles");
        let calls = Cell::new(0);

        bucket
            .get_or_compute(b"x", counting_compute(&calls, b"1"))
            .unwrap();
        bucket
            .get_or_compute(b"x", counting_compute(&calls, b"2"))
            .unwrap();

        assert_eq!(calls.get(), 2);
        assert!(DerivativeCache::disabled().root().is_none());
    }

    #[test]
    fn test_memory_layer_serves_without_disk_read() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("cache");
        let cache = DerivativeCache::new(root.clone()).with_memory_limit(1024);
        let bucket = cache.bucket("remote");
        let calls = Cell::new(0);

        bucket
            .get_or_compute(b"https://example.com/a.css", counting_compute(&calls, b"body{}"))
            .unwrap();
        assert_eq!(cache.memory_usage(), 6);

        // Remove the disk copy: the memory layer still answers
        std::fs::remove_dir_all(&root).unwrap();
        let body = bucket
            .get_or_compute(b"https://example.com/a.css", counting_compute(&calls, b"other"))
            .unwrap();

        assert_eq!(calls.get(), 1);
        assert_eq!(body, b"body{}");
    }

    #[test]
    fn test_string_bodies() {
        let tmp = TempDir::new().unwrap();
        let bucket = DerivativeCache::new(tmp.path().join("cache")).bucket("styles");

        let css = bucket
            .get_or_compute_string(b"src", || Ok::<_, TestError>("a{}".to_owned()))
            .unwrap();
        assert_eq!(css, "a{}");
    }

    #[test]
    fn test_string_bodies_reject_invalid_utf8() {
        let tmp = TempDir::new().unwrap();
        let bucket = DerivativeCache::new(tmp.path().join("cache")).bucket("styles");
        bucket
            .get_or_compute(b"src", || Ok::<_, TestError>(vec![0xFF, 0xFE]))
            .unwrap();

        let result = bucket.get_or_compute_string(b"src", || Ok::<_, TestError>(String::new()));
        assert!(matches!(
            result,
            Err(TestError::Cache(CacheError::InvalidUtf8 { .. }))
        ));
    }
}
