//! Path handling shared by every pagec component.
//!
//! - [`PathGuard`] / [`is_safe`]: reject paths that resolve outside a root
//!   directory (`../../etc/passwd`, symlinked escapes)
//! - [`FilePath`]: split a source path into directory, stem and extension
//!
//! A [`PathTraversal`] error is never recoverable: it means either a bug in
//! path construction or an attempted escape, so callers abort the build.
//!
//! # Example
//!
//! ```
//! use pagec_paths::PathGuard;
//!
//! let guard = PathGuard::new("root");
//! assert!(guard.join("/blog/index.html").is_ok());
//! assert!(guard.join("/../../etc/passwd").is_err());
//! ```

mod file_path;
mod guard;

pub use file_path::FilePath;
pub use guard::{PathGuard, PathTraversal, is_safe, resolve};
