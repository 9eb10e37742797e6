//! On-disk entry storage.
//!
//! Entries live in one directory per bucket, sharded by the first two hex
//! characters of the fingerprint:
//!
//! ```text
//! {root}/
//! +-- styles/            # bucket "styles"
//! |   +-- 3f/
//! |       +-- 3fa9...    # entry body, raw bytes
//! +-- svg/               # bucket "svg"
//!     +-- ...
//! ```
//!
//! Writes go to a temporary file in the target directory which is then
//! renamed over the final path, so readers never observe a partial body and
//! two writers of the same fingerprint cannot corrupt each other.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use pagec_paths::PathGuard;
use tempfile::NamedTempFile;

use crate::{CacheError, Fingerprint};

/// Disk half of the derivative cache.
#[derive(Debug)]
pub(crate) struct FileStore {
    guard: PathGuard,
}

impl FileStore {
    pub(crate) fn new(root: PathBuf) -> Self {
        Self {
            guard: PathGuard::new(root),
        }
    }

    pub(crate) fn root(&self) -> &Path {
        self.guard.root()
    }

    fn entry_path(&self, bucket: &str, fingerprint: &Fingerprint) -> PathBuf {
        self.root()
            .join(bucket)
            .join(fingerprint.shard())
            .join(fingerprint.as_str())
    }

    /// Read an entry, `None` if it was never written.
    pub(crate) fn read(
        &self,
        bucket: &str,
        fingerprint: &Fingerprint,
    ) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.entry_path(bucket, fingerprint);
        match fs::read(&path) {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(CacheError::Io { path, source }),
        }
    }

    /// Persist an entry.
    pub(crate) fn write(
        &self,
        bucket: &str,
        fingerprint: &Fingerprint,
        body: &[u8],
    ) -> Result<(), CacheError> {
        let path = self.entry_path(bucket, fingerprint);
        self.guard.check(&path)?;

        let Some(dir) = path.parent() else {
            return Ok(());
        };
        fs::create_dir_all(dir).map_err(|source| CacheError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(|source| CacheError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        tmp.write_all(body).map_err(|source| CacheError::Io {
            path: tmp.path().to_path_buf(),
            source,
        })?;
        tmp.persist(&path).map_err(|e| CacheError::Io {
            path: path.clone(),
            source: e.error,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().join("cache"));
        let fp = Fingerprint::of(b"input");

        store.write("styles", &fp, b"compiled").unwrap();
        assert_eq!(
            store.read("styles", &fp).unwrap(),
            Some(b"compiled".to_vec())
        );
    }

    #[test]
    fn test_read_missing_entry() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().join("cache"));

        assert_eq!(store.read("styles", &Fingerprint::of(b"x")).unwrap(), None);
    }

    #[test]
    fn test_entry_layout_is_sharded() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("cache");
        let store = FileStore::new(root.clone());
        let fp = Fingerprint::of(b"input");

        store.write("svg", &fp, b"<svg/>").unwrap();

        let expected = root.join("svg").join(&fp.as_str()[..2]).join(fp.as_str());
        assert_eq!(fs::read(expected).unwrap(), b"<svg/>");
    }

    #[test]
    fn test_no_temporary_files_left_behind() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("cache");
        let store = FileStore::new(root.clone());
        let fp = Fingerprint::of(b"input");

        store.write("svg", &fp, b"one").unwrap();
        store.write("svg", &fp, b"one").unwrap();

        let shard = root.join("svg").join(fp.shard());
        let names: Vec<_> = fs::read_dir(shard)
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from(fp.as_str())]);
    }

    #[test]
    fn test_bucket_escaping_root_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().join("cache"));
        let fp = Fingerprint::of(b"input");

        let err = store.write("../elsewhere", &fp, b"x").unwrap_err();
        assert!(matches!(err, CacheError::Traversal(_)));
        assert!(!tmp.path().join("elsewhere").exists());
    }

    #[test]
    fn test_binary_bodies_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().join("cache"));
        let fp = Fingerprint::of(b"bin");
        let body: Vec<u8> = vec![0x00, 0x01, 0x0A, 0x0D, 0xFF, 0xFE, 0x80, 0x7F];

        store.write("remote", &fp, &body).unwrap();
        assert_eq!(store.read("remote", &fp).unwrap(), Some(body));
    }
}
