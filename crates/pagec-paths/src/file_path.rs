//! Source path decomposition.

use std::path::Path;

/// A path split into the pieces used to name derived files.
///
/// `src/img/hero.jpg` becomes directory `src/img`, stem `hero`, extension
/// `jpg`. Directory separators are always `/`, whatever the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePath {
    /// Parent directory (empty when the path has none).
    pub directory: String,
    /// File name without its last extension.
    pub stem: String,
    /// Last extension, without the dot. Dot-files have none.
    pub extension: Option<String>,
}

impl FilePath {
    /// Split `path`.
    #[must_use]
    pub fn parse(path: &Path) -> Self {
        let directory = path
            .parent()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_default();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned());

        Self {
            directory,
            stem,
            extension,
        }
    }

    /// File name with extension (`hero.jpg`).
    #[must_use]
    pub fn file_name(&self) -> String {
        match &self.extension {
            Some(ext) => format!("{}.{ext}", self.stem),
            None => self.stem.clone(),
        }
    }
}
