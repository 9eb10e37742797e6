//! Output tree reconciliation.
//!
//! Brings the output root in line with the pages produced by a build: writes
//! every page, deletes files a previous build wrote that are no longer
//! produced, and removes directories left empty. The [`ManifestStore`]
//! remembers what was written so the next build knows what to clean up.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use pagec_paths::PathGuard;

use crate::error::BuildError;
use crate::manifest::ManifestStore;
use crate::page::{OutputPage, path_problem};

/// Counts from one [`Reconciler::reconcile`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Pages written.
    pub written: usize,
    /// Stale files deleted.
    pub removed: usize,
    /// Manifest entries dropped because their file had disappeared.
    pub repaired: usize,
    /// Empty directories removed.
    pub pruned_dirs: usize,
    /// Wall time of the run.
    pub elapsed: Duration,
}

/// Writes pages below an output root and cleans up after earlier builds.
pub struct Reconciler {
    guard: PathGuard,
    store: Box<dyn ManifestStore>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("output_root", &self.guard.root())
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Create a reconciler for `output_root` backed by `store`.
    #[must_use]
    pub fn new(output_root: impl Into<PathBuf>, store: Box<dyn ManifestStore>) -> Self {
        Self {
            guard: PathGuard::new(output_root),
            store,
        }
    }

    /// The output root.
    #[must_use]
    pub fn output_root(&self) -> &Path {
        self.guard.root()
    }

    /// The manifest store.
    #[must_use]
    pub fn store(&self) -> &dyn ManifestStore {
        self.store.as_ref()
    }

    /// Make the output root contain exactly `pages` plus whatever files the
    /// manifest never knew about.
    ///
    /// Every page path and every stale manifest path is validated before the
    /// first write, so a traversal attempt leaves the tree untouched. Later
    /// failures abort the run with the manifest describing the work done so
    /// far; rerunning repairs the rest.
    pub fn reconcile(&mut self, pages: &[OutputPage]) -> Result<ReconcileReport, BuildError> {
        let start = Instant::now();
        self.store.open()?;

        let desired = self.resolve_pages(pages)?;
        let desired_paths: HashSet<&str> = pages.iter().map(|p| p.path.as_str()).collect();
        let stale = self.resolve_stale(&desired_paths)?;

        let mut report = ReconcileReport::default();
        for (page, file) in pages.iter().zip(&desired) {
            write_page(file, &page.body)?;
            self.store.insert(&page.path)?;
            report.written += 1;
        }

        for (logical, file) in &stale {
            match fs::remove_file(file) {
                Ok(()) => {
                    tracing::info!(path = %file.display(), "Deleted stale file");
                    report.removed += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(BuildError::io(file, e)),
            }
            self.store.remove_where(&|p| p == logical.as_str())?;
        }

        report.repaired = self.verify()?;

        let root = self.guard.root();
        if root.is_dir() {
            prune_empty_dirs(root, true, &mut report.pruned_dirs)?;
        }

        report.elapsed = start.elapsed();
        tracing::info!(
            written = report.written,
            removed = report.removed,
            pruned = report.pruned_dirs,
            elapsed_ms = report.elapsed.as_millis(),
            "Reconciled output"
        );
        Ok(report)
    }

    fn resolve_pages(&self, pages: &[OutputPage]) -> Result<Vec<PathBuf>, BuildError> {
        let mut seen = HashSet::new();
        pages
            .iter()
            .map(|page| {
                if !seen.insert(page.path.as_str()) {
                    return Err(BuildError::InvalidPage {
                        path: page.path.clone(),
                        reason: "path produced more than once",
                    });
                }
                self.resolve(&page.path)
            })
            .collect()
    }

    fn resolve_stale(
        &self,
        desired: &HashSet<&str>,
    ) -> Result<Vec<(String, PathBuf)>, BuildError> {
        self.store
            .paths()
            .into_iter()
            .filter(|path| !desired.contains(path.as_str()))
            .map(|path| {
                let file = self.resolve(&path)?;
                Ok((path, file))
            })
            .collect()
    }

    fn resolve(&self, logical: &str) -> Result<PathBuf, BuildError> {
        if let Some(reason) = path_problem(logical) {
            return Err(BuildError::InvalidPage {
                path: logical.to_owned(),
                reason,
            });
        }
        Ok(self.guard.join(logical)?)
    }

    /// Drop manifest entries whose file no longer exists.
    fn verify(&mut self) -> Result<usize, BuildError> {
        let mut missing = HashSet::new();
        for logical in self.store.paths() {
            let file = self.resolve(&logical)?;
            if !file.is_file() {
                tracing::warn!(
                    path = %file.display(),
                    "Manifest entry has no file, dropping it"
                );
                missing.insert(logical);
            }
        }
        if missing.is_empty() {
            return Ok(0);
        }
        Ok(self.store.remove_where(&|p| missing.contains(p))?)
    }
}

fn write_page(file: &Path, body: &[u8]) -> Result<(), BuildError> {
    if let Some(parent) = file.parent()
        && !parent.is_dir()
    {
        fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
        tracing::info!(path = %parent.display(), "Created directory");
    }
    fs::write(file, body).map_err(|e| BuildError::io(file, e))?;
    tracing::info!(path = %file.display(), "Wrote file");
    Ok(())
}

/// Remove empty directories below `dir`, deepest first.
///
/// Returns whether `dir` itself ended up empty. The root is never removed.
/// Symlinks count as entries and are never followed.
fn prune_empty_dirs(dir: &Path, is_root: bool, pruned: &mut usize) -> Result<bool, BuildError> {
    let entries = fs::read_dir(dir).map_err(|e| BuildError::io(dir, e))?;
    let mut empty = true;
    for entry in entries {
        let entry = entry.map_err(|e| BuildError::io(dir, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| BuildError::io(&path, e))?;
        if !(file_type.is_dir() && prune_empty_dirs(&path, false, pruned)?) {
            empty = false;
        }
    }

    if empty && !is_root {
        fs::remove_dir(dir).map_err(|e| BuildError::io(dir, e))?;
        tracing::info!(path = %dir.display(), "Pruned empty directory");
        *pruned += 1;
    }
    Ok(empty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{JsonManifestStore, MemoryManifestStore};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn reconciler(root: &Path, existing: &[&str]) -> Reconciler {
        Reconciler::new(
            root,
            Box::new(MemoryManifestStore::with_paths(existing.iter().copied())),
        )
    }

    fn sorted(mut paths: Vec<String>) -> Vec<String> {
        paths.sort();
        paths
    }

    #[test]
    fn test_writes_pages_and_records_them() {
        let tmp = TempDir::new().unwrap();
        let mut reconciler = reconciler(tmp.path(), &[]);

        let report = reconciler
            .reconcile(&[
                OutputPage::new("/index.html", "home"),
                OutputPage::new("/blog/post/index.html", "post"),
            ])
            .unwrap();

        assert_eq!(report.written, 2);
        assert_eq!(report.removed, 0);
        assert_eq!(
            fs::read_to_string(tmp.path().join("blog/post/index.html")).unwrap(),
            "post"
        );
        assert_eq!(
            sorted(reconciler.store().paths()),
            vec!["/blog/post/index.html", "/index.html"]
        );
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let manifest = tmp.path().join("pages.json");
        let root = tmp.path().join("root");
        let pages = [
            OutputPage::new("/index.html", "home"),
            OutputPage::new("/about/index.html", "about"),
        ];

        let mut first = Reconciler::new(&root, Box::new(JsonManifestStore::new(&manifest)));
        first.reconcile(&pages).unwrap();
        let mut second = Reconciler::new(&root, Box::new(JsonManifestStore::new(&manifest)));
        let report = second.reconcile(&pages).unwrap();

        assert_eq!(report.written, 2);
        assert_eq!(report.removed, 0);
        assert_eq!(report.pruned_dirs, 0);
        assert_eq!(
            sorted(second.store().paths()),
            vec!["/about/index.html", "/index.html"]
        );
        assert_eq!(fs::read_to_string(root.join("index.html")).unwrap(), "home");
    }

    #[test]
    fn test_stale_pages_deleted_and_dirs_pruned() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let mut reconciler = reconciler(root, &[]);
        reconciler
            .reconcile(&[
                OutputPage::new("/index.html", "home"),
                OutputPage::new("/blog/2020/old/index.html", "old"),
                OutputPage::new("/blog/keep.html", "keep"),
            ])
            .unwrap();

        let report = reconciler
            .reconcile(&[
                OutputPage::new("/index.html", "home"),
                OutputPage::new("/blog/keep.html", "keep"),
            ])
            .unwrap();

        assert_eq!(report.removed, 1);
        assert_eq!(report.pruned_dirs, 2);
        assert!(!root.join("blog/2020").exists());
        assert!(root.join("blog/keep.html").exists());
        assert_eq!(
            sorted(reconciler.store().paths()),
            vec!["/blog/keep.html", "/index.html"]
        );
    }

    #[test]
    fn test_root_is_never_pruned() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("root");
        let mut reconciler = reconciler(&root, &[]);
        reconciler
            .reconcile(&[OutputPage::new("/index.html", "home")])
            .unwrap();

        let report = reconciler.reconcile(&[]).unwrap();

        assert_eq!(report.removed, 1);
        assert_eq!(report.pruned_dirs, 0);
        assert!(root.is_dir());
    }

    #[test]
    fn test_unmanaged_files_survive() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("res/img")).unwrap();
        fs::write(root.join("res/img/hero-1-320.webp"), "img").unwrap();
        let mut reconciler = reconciler(root, &["/gone.html"]);

        let report = reconciler.reconcile(&[]).unwrap();

        assert_eq!(report.removed, 0);
        assert_eq!(report.pruned_dirs, 0);
        assert!(root.join("res/img/hero-1-320.webp").exists());
        assert!(reconciler.store().paths().is_empty());
    }

    #[test]
    fn test_missing_stale_file_still_dropped_from_manifest() {
        let tmp = TempDir::new().unwrap();
        let mut reconciler = reconciler(tmp.path(), &["/deleted-by-hand.html"]);

        let report = reconciler
            .reconcile(&[OutputPage::new("/index.html", "home")])
            .unwrap();

        assert_eq!(report.removed, 0);
        assert_eq!(reconciler.store().paths(), vec!["/index.html"]);
    }

    #[test]
    fn test_vanished_page_file_is_rewritten() {
        let tmp = TempDir::new().unwrap();
        let mut reconciler = reconciler(tmp.path(), &[]);
        reconciler
            .reconcile(&[OutputPage::new("/index.html", "home")])
            .unwrap();

        fs::remove_file(tmp.path().join("index.html")).unwrap();
        let report = reconciler
            .reconcile(&[OutputPage::new("/index.html", "home")])
            .unwrap();
        assert_eq!(report.repaired, 0);
        assert!(tmp.path().join("index.html").exists());
    }

    #[test]
    fn test_traversal_on_write_touches_nothing() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("root");
        let mut reconciler = reconciler(&root, &[]);

        let err = reconciler
            .reconcile(&[
                OutputPage::new("/index.html", "home"),
                OutputPage::new("/../escape.html", "evil"),
            ])
            .unwrap_err();

        assert!(matches!(err, BuildError::Traversal(_)));
        assert!(!root.join("index.html").exists());
        assert!(!tmp.path().join("escape.html").exists());
        assert!(reconciler.store().paths().is_empty());
    }

    #[test]
    fn test_traversal_on_delete_touches_nothing() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("root");
        fs::create_dir_all(&root).unwrap();
        fs::write(tmp.path().join("precious.txt"), "keep").unwrap();
        let mut reconciler = reconciler(&root, &["/../precious.txt"]);

        let err = reconciler
            .reconcile(&[OutputPage::new("/index.html", "home")])
            .unwrap_err();

        assert!(matches!(err, BuildError::Traversal(_)));
        assert!(tmp.path().join("precious.txt").exists());
        assert!(!root.join("index.html").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_parent_dir_through_symlink_is_traversal() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("root");
        fs::create_dir_all(&root).unwrap();
        fs::create_dir_all(tmp.path().join("outside/deep")).unwrap();
        std::os::unix::fs::symlink(tmp.path().join("outside/deep"), root.join("link")).unwrap();
        let mut reconciler = reconciler(&root, &[]);

        let err = reconciler
            .reconcile(&[OutputPage::new("/link/../escaped.html", "evil")])
            .unwrap_err();

        assert!(matches!(err, BuildError::Traversal(_)));
        assert!(!tmp.path().join("outside/escaped.html").exists());
        assert!(!root.join("escaped.html").exists());
        assert!(reconciler.store().paths().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_stale_symlink_page_removes_the_link() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("root");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("index.html"), "home").unwrap();
        std::os::unix::fs::symlink(root.join("index.html"), root.join("alias.html")).unwrap();
        let mut reconciler = reconciler(&root, &["/alias.html"]);

        let report = reconciler
            .reconcile(&[OutputPage::new("/index.html", "home")])
            .unwrap();

        assert_eq!(report.removed, 1);
        assert!(!root.join("alias.html").is_symlink());
        assert_eq!(fs::read_to_string(root.join("index.html")).unwrap(), "home");
    }

    #[test]
    fn test_rejects_directory_and_duplicate_paths() {
        let tmp = TempDir::new().unwrap();
        let mut reconciler = reconciler(tmp.path(), &[]);

        let err = reconciler
            .reconcile(&[OutputPage::new("/blog/", "x")])
            .unwrap_err();
        assert!(matches!(err, BuildError::InvalidPage { .. }));

        let err = reconciler
            .reconcile(&[
                OutputPage::new("/a.html", "1"),
                OutputPage::new("/a.html", "2"),
            ])
            .unwrap_err();
        assert!(err.to_string().contains("more than once"));
        assert!(!tmp.path().join("a.html").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_prune_does_not_follow_symlinks() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("root");
        let outside = tmp.path().join("outside/empty");
        fs::create_dir_all(&outside).unwrap();
        fs::create_dir_all(&root).unwrap();
        std::os::unix::fs::symlink(tmp.path().join("outside"), root.join("link")).unwrap();
        let mut reconciler = reconciler(&root, &[]);

        let report = reconciler.reconcile(&[]).unwrap();

        assert_eq!(report.pruned_dirs, 0);
        assert!(outside.is_dir());
        assert!(root.join("link").exists());
    }
}
