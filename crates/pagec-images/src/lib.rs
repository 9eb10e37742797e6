//! Responsive image derivatives.
//!
//! Every source image is rendered at each width of a [`BreakpointLadder`]
//! in one or more formats, then referenced from a `<picture>` element whose
//! `<source>` entries offer 1x to 3x pixel densities per breakpoint.
//!
//! Derivatives land under `<output_root>/res/<source directory>/` and are
//! named `<stem>-<width_ratio>-<width>.<ext>`. A set whose every width is
//! already on disk is not transcoded again, so repeated builds only pay for
//! new or deleted files.
//!
//! # Transcoding
//!
//! Pixel work is delegated to a [`Transcoder`]. [`MagickTranscoder`] runs the
//! ImageMagick CLI; tests and embedders can supply their own. Jobs for one
//! source fan out over a bounded thread pool and are joined before
//! [`ImagePipeline::materialize`] returns.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use pagec_images::{
//!     BreakpointLadder, ImageOptions, ImagePipeline, MagickTranscoder, PictureAttrs,
//! };
//!
//! let pipeline = ImagePipeline::new("root", Arc::new(MagickTranscoder::default()), 8)?;
//! let set = pipeline.materialize(
//!     Path::new("img/hero.jpg"),
//!     &ImageOptions::default(),
//!     &BreakpointLadder::default(),
//! )?;
//! let html = set.picture_html("Sunrise over the bay", &PictureAttrs::default());
//! # Ok::<(), pagec_images::ImageError>(())
//! ```

mod error;
mod ladder;
mod markup;
mod options;
mod pipeline;
mod transcoder;

pub use error::{ImageError, TranscodeError};
pub use ladder::{BreakpointLadder, NOMINAL_BREAKPOINTS, PIXEL_DENSITIES, STANDARD_WIDTHS};
pub use markup::{
    CACHE_QUERY, DerivativeSet, MaterializeOutcome, PictureAttrs, escape_attr, mime_type,
};
pub use options::{DEFAULT_QUALITY, ImageOptions, SUPPORTED_EXTENSIONS};
pub use pipeline::{ImagePipeline, RESOURCE_DIR, ScaledImage, SingleImage};
pub use transcoder::{MagickTranscoder, ResizeMode, TranscodeJob, Transcoder};
