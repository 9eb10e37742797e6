//! Build orchestration.
//!
//! A [`Compiler`] runs page producers one after another, each with a
//! [`PageContext`] giving it the shared [`Toolkit`] and a fresh
//! [`AssetDedupe`], then hands every produced page to the [`Reconciler`].

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use pagec_cache::DerivativeCache;
use pagec_config::Config;
use pagec_images::{BreakpointLadder, ImageOptions, ImagePipeline, MagickTranscoder};
use pagec_paths::PathGuard;

use crate::dedupe::AssetDedupe;
use crate::error::BuildError;
use crate::fetch::{DEFAULT_TIMEOUT, REMOTE_BUCKET, RemoteFetcher};
use crate::manifest::JsonManifestStore;
use crate::page::OutputPage;
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::transform::{
    CommandTransform, STYLES_BUCKET, SVG_BUCKET, StyleCompiler, SvgOptimizer, TextTransform,
};

/// A boxed page producer, for building heterogeneous producer lists.
pub type PageProducer = Box<dyn FnOnce(&mut PageContext<'_>) -> Result<OutputPage, BuildError>>;

/// Everything a page producer can use to build its page.
#[derive(Debug)]
pub struct Toolkit {
    output_root: PathBuf,
    sources: PathGuard,
    images: ImagePipeline,
    ladder: BreakpointLadder,
    image_defaults: ImageOptions,
    styles: StyleCompiler,
    svg: SvgOptimizer,
    fetcher: RemoteFetcher,
}

impl Toolkit {
    /// Create a toolkit writing below `output_root` and reading sources
    /// from `source_root`. Derivative directories are named relative to
    /// `source_root`.
    ///
    /// Styles and SVG start as pass-through; remote fetches use the default
    /// timeout. All three cache through `cache`.
    #[must_use]
    pub fn new(
        output_root: impl Into<PathBuf>,
        source_root: impl Into<PathBuf>,
        images: ImagePipeline,
        cache: &DerivativeCache,
    ) -> Self {
        let source_root = source_root.into();
        Self {
            output_root: output_root.into(),
            images: images.with_source_root(&source_root),
            sources: PathGuard::new(source_root),
            ladder: BreakpointLadder::default(),
            image_defaults: ImageOptions::default(),
            styles: StyleCompiler::new(Vec::new(), Vec::new(), cache.bucket(STYLES_BUCKET)),
            svg: SvgOptimizer::new(None, cache.bucket(SVG_BUCKET)),
            fetcher: RemoteFetcher::new(DEFAULT_TIMEOUT, cache.bucket(REMOTE_BUCKET)),
        }
    }

    /// Replace the stylesheet compiler.
    #[must_use]
    pub fn with_styles(mut self, styles: StyleCompiler) -> Self {
        self.styles = styles;
        self
    }

    /// Replace the SVG optimizer.
    #[must_use]
    pub fn with_svg(mut self, svg: SvgOptimizer) -> Self {
        self.svg = svg;
        self
    }

    /// Replace the remote fetcher.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: RemoteFetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Replace the breakpoint ladder.
    #[must_use]
    pub fn with_ladder(mut self, ladder: BreakpointLadder) -> Self {
        self.ladder = ladder;
        self
    }

    /// Replace the options used by pictures that do not pass their own.
    #[must_use]
    pub fn with_image_defaults(mut self, options: ImageOptions) -> Self {
        self.image_defaults = options;
        self
    }

    /// Output root.
    #[must_use]
    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Directory source paths are resolved against.
    #[must_use]
    pub fn source_root(&self) -> &Path {
        self.sources.root()
    }

    /// Image pipeline.
    #[must_use]
    pub fn images(&self) -> &ImagePipeline {
        &self.images
    }

    /// Breakpoint ladder.
    #[must_use]
    pub fn ladder(&self) -> &BreakpointLadder {
        &self.ladder
    }

    /// Default picture options.
    #[must_use]
    pub fn image_defaults(&self) -> &ImageOptions {
        &self.image_defaults
    }

    /// Stylesheet compiler.
    #[must_use]
    pub fn styles(&self) -> &StyleCompiler {
        &self.styles
    }

    /// SVG optimizer.
    #[must_use]
    pub fn svg(&self) -> &SvgOptimizer {
        &self.svg
    }

    /// Remote fetcher.
    #[must_use]
    pub fn fetcher(&self) -> &RemoteFetcher {
        &self.fetcher
    }

    /// Resolve a source path against the source root, rejecting escapes.
    ///
    /// The result has symlinks and `.`/`..` resolved, so two spellings of
    /// one file give the same path.
    pub fn source_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, BuildError> {
        let candidate = self.sources.root().join(path);
        Ok(self.sources.check(&candidate)?)
    }
}

/// What a page producer sees while it runs.
#[derive(Debug)]
pub struct PageContext<'a> {
    pub(crate) toolkit: &'a Toolkit,
    pub(crate) dedupe: &'a mut AssetDedupe,
}

impl<'a> PageContext<'a> {
    /// Context over `toolkit` recording inlined assets in `dedupe`.
    pub fn new(toolkit: &'a Toolkit, dedupe: &'a mut AssetDedupe) -> Self {
        Self { toolkit, dedupe }
    }

    /// Shared toolkit.
    #[must_use]
    pub fn toolkit(&self) -> &'a Toolkit {
        self.toolkit
    }

    /// Assets inlined into the current page so far.
    #[must_use]
    pub fn dedupe(&self) -> &AssetDedupe {
        self.dedupe
    }
}

/// Result of a [`Compiler::compile`] run.
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// Pages produced.
    pub pages: usize,
    /// Reconciliation counts.
    pub reconcile: ReconcileReport,
    /// Wall time of the whole build.
    pub elapsed: Duration,
}

/// Runs page producers and reconciles their output.
#[derive(Debug)]
pub struct Compiler {
    toolkit: Toolkit,
    reconciler: Reconciler,
}

impl Compiler {
    /// Create a compiler.
    #[must_use]
    pub fn new(toolkit: Toolkit, reconciler: Reconciler) -> Self {
        Self {
            toolkit,
            reconciler,
        }
    }

    /// Wire a compiler from loaded configuration.
    pub fn from_config(config: &Config) -> Result<Self, BuildError> {
        let build = &config.build_resolved;

        let cache = match (build.cache_enabled, build.memory_cache_bytes) {
            (false, _) => DerivativeCache::disabled(),
            (true, 0) => DerivativeCache::new(&build.cache_dir),
            (true, bytes) => DerivativeCache::new(&build.cache_dir).with_memory_limit(bytes),
        };

        let transcoder = Arc::new(MagickTranscoder::new(config.images.transcoder.clone()));
        let images = ImagePipeline::new(&build.output_dir, transcoder, config.images.concurrency)?;

        let styles = StyleCompiler::from_commands(
            &config.styles.commands,
            config.styles.browsers.clone(),
            cache.bucket(STYLES_BUCKET),
        )?;
        let svg_transform = config
            .svg
            .command
            .as_deref()
            .map(|command| {
                CommandTransform::from_command(command)
                    .map(|t| Box::new(t) as Box<dyn TextTransform>)
            })
            .transpose()?;
        let fetcher = RemoteFetcher::new(
            Duration::from_secs(config.fetch.timeout_secs),
            cache.bucket(REMOTE_BUCKET),
        );
        let image_defaults = ImageOptions {
            quality: config.images.quality,
            extensions: config.images.extensions.clone(),
            ..ImageOptions::default()
        };

        let toolkit = Toolkit::new(&build.output_dir, &build.project_dir, images, &cache)
            .with_styles(styles)
            .with_svg(SvgOptimizer::new(svg_transform, cache.bucket(SVG_BUCKET)))
            .with_fetcher(fetcher)
            .with_image_defaults(image_defaults);
        let reconciler = Reconciler::new(
            &build.output_dir,
            Box::new(JsonManifestStore::new(&build.manifest_path)),
        );
        Ok(Self::new(toolkit, reconciler))
    }

    /// Shared toolkit.
    #[must_use]
    pub fn toolkit(&self) -> &Toolkit {
        &self.toolkit
    }

    /// Reconciler.
    #[must_use]
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Run every producer in order, then reconcile the output root.
    ///
    /// Each producer gets an empty [`AssetDedupe`]. The first failing
    /// producer aborts the build before anything is written.
    pub fn compile<I, F>(&mut self, producers: I) -> Result<BuildReport, BuildError>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce(&mut PageContext<'_>) -> Result<OutputPage, BuildError>,
    {
        let start = Instant::now();
        let root = self.toolkit.output_root();
        if !root.is_dir() {
            fs::create_dir_all(root).map_err(|e| BuildError::io(root, e))?;
            tracing::info!(path = %root.display(), "Created directory");
        }

        let mut dedupe = AssetDedupe::new();
        let mut pages = Vec::new();
        for producer in producers {
            dedupe.reset();
            let mut context = PageContext::new(&self.toolkit, &mut dedupe);
            let page = producer(&mut context)?;
            tracing::debug!(path = %page.path, bytes = page.body.len(), "Produced page");
            pages.push(page);
        }

        let reconcile = self.reconciler.reconcile(&pages)?;
        let report = BuildReport {
            pages: pages.len(),
            reconcile,
            elapsed: start.elapsed(),
        };
        tracing::info!(
            pages = report.pages,
            elapsed_ms = report.elapsed.as_millis(),
            "Finished compilation"
        );
        Ok(report)
    }
}
