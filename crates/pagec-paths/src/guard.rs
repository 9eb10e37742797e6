//! Root containment checks.

use std::io;
use std::path::{Component, Path, PathBuf};

/// A computed path resolved outside the root it was declared under.
#[derive(Debug, thiserror::Error)]
#[error("Path {} resolves outside of {}", .candidate.display(), .root.display())]
pub struct PathTraversal {
    /// The offending path, as supplied.
    pub candidate: PathBuf,
    /// The root it had to stay inside.
    pub root: PathBuf,
}

/// Validates paths against a fixed root directory.
///
/// The root does not need to exist yet. Every check resolves both sides
/// again, so a root created (or replaced by a symlink) after construction is
/// still handled correctly.
#[derive(Debug, Clone)]
pub struct PathGuard {
    root: PathBuf,
}

impl PathGuard {
    /// Create a guard for `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory, as supplied.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `candidate` and fail with [`PathTraversal`] unless it lies
    /// inside the root. Returns the resolved path.
    pub fn check(&self, candidate: &Path) -> Result<PathBuf, PathTraversal> {
        match (resolve(candidate), resolve(&self.root)) {
            (Ok(resolved), Ok(root)) if resolved.starts_with(&root) => Ok(resolved),
            _ => Err(PathTraversal {
                candidate: candidate.to_path_buf(),
                root: self.root.clone(),
            }),
        }
    }

    /// Join a slash-rooted logical path (`/blog/index.html`) under the root
    /// and check the result.
    ///
    /// Leading slashes are stripped so the logical path never replaces the
    /// root the way [`Path::join`] would with an absolute argument. The
    /// returned path has its parent resolved, so callers write and delete
    /// exactly where the check looked. The final component is kept as named,
    /// which lets a delete remove a symlink rather than its target.
    pub fn join(&self, logical: &str) -> Result<PathBuf, PathTraversal> {
        let candidate = self.root.join(logical.trim_start_matches('/'));
        let resolved = self.check(&candidate)?;
        let Some(name) = candidate.file_name() else {
            return Ok(resolved);
        };
        match candidate.parent().map(|parent| self.check(parent)) {
            Some(Ok(parent)) => Ok(parent.join(name)),
            _ => Ok(resolved),
        }
    }
}

/// Return `true` if `candidate` resolves to `root` or somewhere below it.
///
/// Both paths are made absolute against the current directory and resolved
/// the way the OS would: symlinks along the existing part are followed
/// before any `..` that comes after them is applied. A symlink inside the
/// root that points elsewhere is therefore detected, including when it is
/// only passed through (`link/../file`). The prefix comparison is per
/// component: `/srv/out-old` is not inside `/srv/out`.
///
/// Any I/O failure while resolving (e.g. the current directory is gone) is
/// reported as unsafe.
pub fn is_safe(candidate: &Path, root: &Path) -> bool {
    match (resolve(candidate), resolve(root)) {
        (Ok(candidate), Ok(root)) => candidate.starts_with(&root),
        _ => false,
    }
}

/// Resolve `path` to an absolute form free of symlinks, `.` and `..`.
///
/// Unlike [`Path::canonicalize`], the path does not have to exist. Components
/// are applied one at a time and the path so far is canonicalized after each
/// one, so a missing tail stays lexical while anything that exists is
/// followed. `..` pops the last resolved component, never a symlink name.
/// A symlink that cannot be followed (dangling or looping) is an error.
pub fn resolve(path: &Path) -> io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut resolved = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => resolved.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(part) => {
                resolved.push(part);
                match resolved.canonicalize() {
                    Ok(canonical) => resolved = canonical,
                    Err(e) if resolved.is_symlink() => return Err(e),
                    Err(_) => {}
                }
            }
        }
    }
    Ok(resolved)
}
