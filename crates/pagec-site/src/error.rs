//! Build error type.

use std::io;
use std::path::PathBuf;

use pagec_cache::CacheError;
use pagec_config::ConfigError;
use pagec_images::ImageError;
use pagec_paths::PathTraversal;

use crate::fetch::FetchError;
use crate::manifest::ManifestError;
use crate::transform::TransformError;

/// Error that ends a build.
///
/// Nothing is retried: the first error aborts the remaining work and is
/// returned to the caller.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// A page, asset or derivative path resolved outside its root.
    #[error(transparent)]
    Traversal(#[from] PathTraversal),
    /// A page path that cannot name a file.
    #[error("Invalid page path '{path}': {reason}")]
    InvalidPage {
        /// The offending logical path.
        path: String,
        /// Why it was rejected.
        reason: &'static str,
    },
    /// Filesystem failure.
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
    /// Derivative cache failure.
    #[error(transparent)]
    Cache(#[from] CacheError),
    /// Image pipeline failure.
    #[error(transparent)]
    Image(#[from] ImageError),
    /// External style or SVG transform failure.
    #[error(transparent)]
    Transform(#[from] TransformError),
    /// Remote resource download failure.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// Manifest could not be read or persisted.
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Web app manifest could not be serialized.
    #[error("Failed to serialize web app manifest: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl BuildError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
