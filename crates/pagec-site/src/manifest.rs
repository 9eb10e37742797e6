//! Persisted record of the pages written by the last build.
//!
//! Provides the [`ManifestStore`] trait and two implementations:
//! - [`JsonManifestStore`]: JSON document on disk, rewritten on every mutation
//! - [`MemoryManifestStore`]: in-process only, for tests and dry runs
//!
//! # File Format
//!
//! ```json
//! {
//!     "compiled_pages": [
//!         {"path": "/index.html"},
//!         {"path": "/blog/index.html"}
//!     ]
//! }
//! ```

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

/// Error returned by manifest stores.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// The manifest file could not be read or written.
    #[error("Manifest I/O error at {}: {source}", .path.display())]
    Io {
        /// Manifest file or its directory.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
    /// The manifest file is not a valid document.
    #[error("Manifest at {} is malformed: {source}", .path.display())]
    Parse {
        /// Manifest file.
        path: PathBuf,
        /// Decoder error.
        source: serde_json::Error,
    },
    /// The store was used before [`ManifestStore::open`].
    #[error("Manifest store used before it was opened")]
    NotOpen,
}

/// Storage for the set of page paths written by the most recent build.
///
/// Paths are unique. Every mutation is durable once the call returns, so a
/// build that aborts halfway leaves a manifest describing exactly the work
/// done so far.
pub trait ManifestStore: Send {
    /// Load the manifest, creating an empty one if none exists.
    fn open(&mut self) -> Result<(), ManifestError>;

    /// All recorded paths, in insertion order.
    fn paths(&self) -> Vec<String>;

    /// Record `path`. Returns `false` if it was already present.
    fn insert(&mut self, path: &str) -> Result<bool, ManifestError>;

    /// Drop every path matching `predicate`. Returns how many were dropped.
    fn remove_where(&mut self, predicate: &dyn Fn(&str) -> bool) -> Result<usize, ManifestError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ManifestDocument {
    #[serde(default)]
    compiled_pages: Vec<ManifestRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestRow {
    path: String,
}

/// Manifest kept in a JSON file (conventionally `pages.json`).
#[derive(Debug)]
pub struct JsonManifestStore {
    path: PathBuf,
    document: Option<ManifestDocument>,
}

impl JsonManifestStore {
    /// Store backed by the file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            document: None,
        }
    }

    /// Manifest file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn document_mut(&mut self) -> Result<&mut ManifestDocument, ManifestError> {
        self.document.as_mut().ok_or(ManifestError::NotOpen)
    }

    /// Write the document through a temporary file in the same directory.
    fn persist(&self) -> Result<(), ManifestError> {
        let Some(document) = &self.document else {
            return Err(ManifestError::NotOpen);
        };
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| ManifestError::Io { path, source }
        };

        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(io_err(dir))?;

        let body = serde_json::to_vec(document).map_err(|source| ManifestError::Parse {
            path: self.path.clone(),
            source,
        })?;
        let mut tmp = NamedTempFile::new_in(dir).map_err(io_err(dir))?;
        tmp.write_all(&body).map_err(io_err(&self.path))?;
        tmp.persist(&self.path)
            .map_err(|e| io_err(&self.path)(e.error))?;
        Ok(())
    }
}

impl ManifestStore for JsonManifestStore {
    fn open(&mut self) -> Result<(), ManifestError> {
        match fs::read(&self.path) {
            Ok(content) => {
                let document =
                    serde_json::from_slice(&content).map_err(|source| ManifestError::Parse {
                        path: self.path.clone(),
                        source,
                    })?;
                self.document = Some(document);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.document = Some(ManifestDocument::default());
                self.persist()?;
                tracing::info!(path = %self.path.display(), "Created page manifest");
                Ok(())
            }
            Err(source) => Err(ManifestError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn paths(&self) -> Vec<String> {
        self.document
            .iter()
            .flat_map(|d| d.compiled_pages.iter().map(|row| row.path.clone()))
            .collect()
    }

    fn insert(&mut self, path: &str) -> Result<bool, ManifestError> {
        let document = self.document_mut()?;
        if document.compiled_pages.iter().any(|row| row.path == path) {
            return Ok(false);
        }
        document.compiled_pages.push(ManifestRow {
            path: path.to_owned(),
        });
        self.persist()?;
        Ok(true)
    }

    fn remove_where(&mut self, predicate: &dyn Fn(&str) -> bool) -> Result<usize, ManifestError> {
        let document = self.document_mut()?;
        let before = document.compiled_pages.len();
        document.compiled_pages.retain(|row| !predicate(&row.path));
        let removed = before - document.compiled_pages.len();
        if removed > 0 {
            self.persist()?;
        }
        Ok(removed)
    }
}

/// Manifest held in memory only.
#[derive(Debug, Default, Clone)]
pub struct MemoryManifestStore {
    paths: Vec<String>,
}

impl MemoryManifestStore {
    /// Store pre-populated with `paths`, as if a previous build wrote them.
    #[must_use]
    pub fn with_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut store = Self::default();
        for path in paths {
            let path = path.into();
            if !store.paths.contains(&path) {
                store.paths.push(path);
            }
        }
        store
    }
}

impl ManifestStore for MemoryManifestStore {
    fn open(&mut self) -> Result<(), ManifestError> {
        Ok(())
    }

    fn paths(&self) -> Vec<String> {
        self.paths.clone()
    }

    fn insert(&mut self, path: &str) -> Result<bool, ManifestError> {
        if self.paths.iter().any(|p| p == path) {
            return Ok(false);
        }
        self.paths.push(path.to_owned());
        Ok(true)
    }

    fn remove_where(&mut self, predicate: &dyn Fn(&str) -> bool) -> Result<usize, ManifestError> {
        let before = self.paths.len();
        self.paths.retain(|p| !predicate(p));
        Ok(before - self.paths.len())
    }
}
