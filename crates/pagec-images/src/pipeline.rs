//! Derivative materialization with bounded parallel fan-out.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pagec_paths::{FilePath, PathGuard, resolve};
use rayon::prelude::*;
use md5::{Digest, Md5};

use crate::markup::{DerivativeSet, MaterializeOutcome};
use crate::{BreakpointLadder, ImageError, ImageOptions, ResizeMode, TranscodeJob, Transcoder};

/// Directory under the output root that receives every derivative.
pub const RESOURCE_DIR: &str = "res";

/// One fixed-size rendition, named by a hash of the source path.
///
/// Used for social preview images, which must have exact dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleImage {
    /// Output width in pixels.
    pub width: u32,
    /// Width divided by height.
    pub aspect: f64,
    /// Encoder quality, 1-100.
    pub quality: u8,
    /// Output format.
    pub extension: String,
    /// Appended to the hash to tell renditions of one source apart.
    pub suffix: String,
    /// Subdirectory of `res/` the file is written to.
    pub directory: String,
}

impl SingleImage {
    /// 600 x 600 preview.
    #[must_use]
    pub fn social_square() -> Self {
        Self {
            width: 600,
            aspect: 1.0,
            quality: crate::DEFAULT_QUALITY,
            extension: "jpg".to_owned(),
            suffix: String::new(),
            directory: "seo".to_owned(),
        }
    }

    /// 1200 x 630 preview.
    #[must_use]
    pub fn social_wide() -> Self {
        Self {
            width: 1200,
            aspect: 1.905,
            suffix: "-wide".to_owned(),
            ..Self::social_square()
        }
    }

    /// Output height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        pixels(f64::from(self.width) / self.aspect)
    }
}

/// A square rendition produced by [`ImagePipeline::scale_to_sizes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaledImage {
    /// Edge length in pixels.
    pub size: u32,
    /// File written.
    pub path: PathBuf,
    /// Public URL.
    pub url: String,
}

/// Produces responsive derivatives of source images under `<output_root>/res`.
///
/// Transcoder jobs run on a dedicated thread pool sized at construction, and
/// every call joins all of its jobs before returning.
pub struct ImagePipeline {
    guard: PathGuard,
    source_root: Option<PathBuf>,
    transcoder: Arc<dyn Transcoder>,
    pool: rayon::ThreadPool,
}

impl fmt::Debug for ImagePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePipeline")
            .field("resource_root", &self.guard.root())
            .field("source_root", &self.source_root)
            .field("threads", &self.pool.current_num_threads())
            .finish_non_exhaustive()
    }
}

impl ImagePipeline {
    /// Create a pipeline writing below `output_root`.
    ///
    /// `concurrency` bounds the number of simultaneous transcoder jobs;
    /// `0` uses one thread per available CPU.
    pub fn new(
        output_root: impl AsRef<Path>,
        transcoder: Arc<dyn Transcoder>,
        concurrency: usize,
    ) -> Result<Self, ImageError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(concurrency)
            .thread_name(|i| format!("pagec-image-{i}"))
            .build()
            .map_err(|e| ImageError::Pool(e.to_string()))?;

        Ok(Self {
            guard: PathGuard::new(output_root.as_ref().join(RESOURCE_DIR)),
            source_root: None,
            transcoder,
            pool,
        })
    }

    /// Name output directories relative to `root` for sources below it.
    ///
    /// Without a source root, the source path is mirrored as given.
    #[must_use]
    pub fn with_source_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.source_root = Some(root.into());
        self
    }

    /// Produce every ladder width of `source` in every requested extension.
    ///
    /// Work is skipped when each ladder width already has at least one of
    /// the extensions on disk. Otherwise only the missing files are
    /// transcoded. The first failing job fails the call; files written by
    /// other jobs are left in place.
    pub fn materialize(
        &self,
        source: &Path,
        options: &ImageOptions,
        ladder: &BreakpointLadder,
    ) -> Result<DerivativeSet, ImageError> {
        options.validate()?;
        let aspect = source_aspect(source)?;
        let (width_ratio, height_ratio) = options.resolve_ratios(aspect);

        let file = FilePath::parse(&self.relative_source(source));
        let (output_dir, public_dir) = self.output_location(&file.directory)?;
        let set = DerivativeSet {
            output_dir,
            public_dir,
            stem: file.stem,
            width_ratio,
            extensions: options.extensions.clone(),
            ladder: ladder.clone(),
            outcome: MaterializeOutcome::Cached,
        };

        let fully_cached = ladder.widths().iter().all(|&width| {
            set.extensions
                .iter()
                .any(|ext| set.path(width, ext).exists())
        });
        if fully_cached {
            tracing::debug!(source = %source.display(), "Derivatives up to date");
            return Ok(set);
        }

        ensure_dir(&set.output_dir)?;
        let mode = if options.force_size {
            ResizeMode::Fill
        } else {
            ResizeMode::Bound
        };
        let mut jobs = Vec::new();
        for &width in ladder.widths() {
            let target_width = f64::from(width) * width_ratio;
            let target_height = match mode {
                ResizeMode::Bound => target_width / aspect,
                ResizeMode::Fill => target_width * height_ratio / width_ratio,
            };
            for ext in &set.extensions {
                let output = set.path(width, ext);
                if output.exists() {
                    continue;
                }
                jobs.push(TranscodeJob {
                    source: source.to_path_buf(),
                    output,
                    width: pixels(target_width),
                    height: pixels(target_height),
                    quality: options.quality,
                    mode,
                });
            }
        }

        self.run_jobs(&jobs)?;
        tracing::info!(
            source = %source.display(),
            files = jobs.len(),
            "Materialized image derivatives"
        );
        Ok(DerivativeSet {
            outcome: MaterializeOutcome::Transcoded(jobs.len()),
            ..set
        })
    }

    /// Produce one exact-size rendition named by a hash of `source`.
    ///
    /// Returns the public URL. An existing file is reused.
    pub fn render_single(&self, source: &Path, single: &SingleImage) -> Result<String, ImageError> {
        if !(1..=100).contains(&single.quality) || single.width == 0 || single.aspect <= 0.0 {
            return Err(ImageError::InvalidOptions(format!(
                "cannot render {}px at aspect {} and quality {}",
                single.width, single.aspect, single.quality
            )));
        }
        let (output_dir, public_dir) = self.output_location(&single.directory)?;
        let hash = path_hash(&self.relative_source(source));
        let name = format!("{hash}{}.{}", single.suffix, single.extension);
        let output = output_dir.join(&name);
        let url = format!("{public_dir}/{name}");

        if output.exists() {
            tracing::debug!(path = %output.display(), "Image up to date");
            return Ok(url);
        }

        // Fail on unreadable sources before spawning anything
        source_aspect(source)?;
        ensure_dir(&output_dir)?;
        self.run_jobs(&[TranscodeJob {
            source: source.to_path_buf(),
            output,
            width: single.width,
            height: single.height(),
            quality: single.quality,
            mode: ResizeMode::Fill,
        }])?;
        Ok(url)
    }

    /// Produce square renditions `<stem>-<size>x<size>.<ext>` under
    /// `res/<directory>`, keeping the source format.
    pub fn scale_to_sizes(
        &self,
        source: &Path,
        sizes: &[u32],
        quality: u8,
        directory: &str,
        stem: &str,
    ) -> Result<Vec<ScaledImage>, ImageError> {
        if !(1..=100).contains(&quality) || sizes.contains(&0) {
            return Err(ImageError::InvalidOptions(format!(
                "cannot scale to {sizes:?} at quality {quality}"
            )));
        }
        source_aspect(source)?;
        let extension = FilePath::parse(source)
            .extension
            .unwrap_or_else(|| "png".to_owned());
        let (output_dir, public_dir) = self.output_location(directory)?;
        ensure_dir(&output_dir)?;

        let scaled: Vec<ScaledImage> = sizes
            .iter()
            .map(|&size| {
                let name = format!("{stem}-{size}x{size}.{extension}");
                ScaledImage {
                    size,
                    path: output_dir.join(&name),
                    url: format!("{public_dir}/{name}"),
                }
            })
            .collect();
        let jobs: Vec<TranscodeJob> = scaled
            .iter()
            .filter(|image| !image.path.exists())
            .map(|image| TranscodeJob {
                source: source.to_path_buf(),
                output: image.path.clone(),
                width: image.size,
                height: image.size,
                quality,
                mode: ResizeMode::Fill,
            })
            .collect();

        self.run_jobs(&jobs)?;
        Ok(scaled)
    }

    /// `source` relative to the source root, as given or as resolved.
    ///
    /// A source outside the root is returned unchanged.
    fn relative_source(&self, source: &Path) -> PathBuf {
        let Some(root) = self.source_root.as_deref() else {
            return source.to_path_buf();
        };
        if let Ok(relative) = source.strip_prefix(root) {
            return relative.to_path_buf();
        }
        match (resolve(source), resolve(root)) {
            (Ok(resolved), Ok(root)) if resolved.starts_with(&root) => resolved
                .strip_prefix(&root)
                .map_or_else(|_| source.to_path_buf(), Path::to_path_buf),
            _ => source.to_path_buf(),
        }
    }

    /// Filesystem directory and public URL prefix for a `res/` subdirectory.
    fn output_location(&self, directory: &str) -> Result<(PathBuf, String), ImageError> {
        let directory = directory.trim_matches('/');
        if directory.is_empty() {
            return Ok((self.guard.root().to_path_buf(), format!("/{RESOURCE_DIR}")));
        }
        let output_dir = self.guard.join(directory)?;
        Ok((output_dir, format!("/{RESOURCE_DIR}/{directory}")))
    }

    fn run_jobs(&self, jobs: &[TranscodeJob]) -> Result<(), ImageError> {
        if jobs.is_empty() {
            return Ok(());
        }
        self.pool.install(|| {
            jobs.par_iter().try_for_each(|job| -> Result<(), ImageError> {
                self.transcoder.transcode(job)?;
                tracing::info!(path = %job.output.display(), "Processed image");
                Ok(())
            })
        })
    }
}

fn source_aspect(source: &Path) -> Result<f64, ImageError> {
    let (width, height) = image::image_dimensions(source).map_err(|e| ImageError::Dimensions {
        path: source.to_path_buf(),
        message: e.to_string(),
    })?;
    if width == 0 || height == 0 {
        return Err(ImageError::Dimensions {
            path: source.to_path_buf(),
            message: format!("image is {width}x{height}"),
        });
    }
    Ok(f64::from(width) / f64::from(height))
}

fn ensure_dir(dir: &Path) -> Result<(), ImageError> {
    if dir.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(dir).map_err(|source| ImageError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    tracing::info!(path = %dir.display(), "Created directory");
    Ok(())
}

/// File name prefix for renditions of `source`: the MD5 of its path
/// relative to the source root.
fn path_hash(source: &Path) -> String {
    hex::encode(Md5::digest(source.to_string_lossy().as_bytes()))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn pixels(value: f64) -> u32 {
    value.round().max(1.0) as u32
}
