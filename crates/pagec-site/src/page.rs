//! Output pages.

/// A file the build writes below the output root.
///
/// `path` is slash-rooted (`/blog/index.html`) and must be unique within a
/// build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPage {
    /// Logical path under the output root.
    pub path: String,
    /// File contents.
    pub body: Vec<u8>,
}

impl OutputPage {
    /// Create a page.
    #[must_use]
    pub fn new(path: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            body: body.into(),
        }
    }
}

/// Reason `path` cannot name a file below the output root, if any.
pub(crate) fn path_problem(path: &str) -> Option<&'static str> {
    if path.is_empty() {
        return Some("path is empty");
    }
    if !path.starts_with('/') {
        return Some("path must start with '/'");
    }
    if path.ends_with('/') {
        return Some("path names a directory");
    }
    match path.rsplit('/').next() {
        Some("." | "..") => Some("path names a directory"),
        _ => None,
    }
}
