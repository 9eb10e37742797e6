//! Page compilation for pagec.
//!
//! This crate provides:
//! - [`Compiler`]: runs page producers and reconciles the output root
//! - [`Reconciler`]: writes pages, deletes stale ones, prunes empty directories
//! - [`ManifestStore`]: the persisted list of pages written by the last build
//! - [`PageContext`]: asset inlining with per-page deduplication
//! - [`WebAppManifest`]: `manifest.json` with generated icons
//!
//! # Quick Start
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use pagec_config::Config;
//! use pagec_site::{Compiler, OutputPage, PageContext, PageProducer};
//!
//! let config = Config::load(None, None)?;
//! let mut compiler = Compiler::from_config(&config)?;
//!
//! let home: PageProducer = Box::new(|ctx: &mut PageContext<'_>| {
//!     let css = ctx.inline_style("styles/site.scss")?;
//!     Ok(OutputPage::new("/index.html", format!("<head>{css}</head>")))
//! });
//! let report = compiler.compile(vec![home])?;
//! println!("{} pages in {:?}", report.pages, report.elapsed);
//! # Ok(())
//! # }
//! ```

mod dedupe;
mod driver;
mod error;
mod fetch;
mod fonts;
mod inline;
mod manifest;
mod page;
mod pwa;
mod reconcile;
mod transform;

pub use dedupe::{AssetDedupe, AssetKey, AssetKind};
pub use driver::{BuildReport, Compiler, PageContext, PageProducer, Toolkit};
pub use error::BuildError;
pub use fetch::{DEFAULT_TIMEOUT, FetchError, REMOTE_BUCKET, RemoteFetcher, create_agent};
pub use fonts::{FONT_ORIGIN, FontStyle, google_fonts_url};
pub use inline::SocialImages;
pub use manifest::{JsonManifestStore, ManifestError, ManifestStore, MemoryManifestStore};
pub use page::OutputPage;
pub use pwa::{
    Dir, Display, ICON_SIZES, IconSources, MANIFEST_LINK, MANIFEST_PATH, ManifestImage,
    Orientation, Platform, ProtocolHandler, RelatedApplication, Shortcut, WebAppManifest,
};
pub use reconcile::{ReconcileReport, Reconciler};
pub use transform::{
    CommandTransform, STYLES_BUCKET, SVG_BUCKET, StyleCompiler, SvgOptimizer, TextTransform,
    TransformError,
};
