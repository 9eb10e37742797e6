//! Derivative sets and the `<picture>` markup that references them.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::ladder::{BreakpointLadder, PIXEL_DENSITIES};

/// Query string appended to every derivative URL.
pub const CACHE_QUERY: &str = "?cache-age=604800";

/// What [`materialize`](crate::ImagePipeline::materialize) had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterializeOutcome {
    /// This many files were transcoded.
    Transcoded(usize),
    /// Every width was already on disk; no transcoder ran.
    Cached,
}

/// Optional attributes of the fallback `<img>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PictureAttrs {
    /// `id` attribute.
    pub id: Option<String>,
    /// `class` attribute entries.
    pub classes: Vec<String>,
}

/// The materialized derivatives of one source image.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivativeSet {
    pub(crate) output_dir: PathBuf,
    pub(crate) public_dir: String,
    pub(crate) stem: String,
    pub(crate) width_ratio: f64,
    pub(crate) extensions: Vec<String>,
    pub(crate) ladder: BreakpointLadder,
    pub(crate) outcome: MaterializeOutcome,
}

impl DerivativeSet {
    /// Directory the files were written to.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Whether the call transcoded anything.
    #[must_use]
    pub fn outcome(&self) -> MaterializeOutcome {
        self.outcome
    }

    /// Extensions in preference order.
    #[must_use]
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// File name of the `width` variant: `<stem>-<width_ratio>-<width>.<ext>`.
    #[must_use]
    pub fn file_name(&self, width: u32, extension: &str) -> String {
        derivative_name(&self.stem, self.width_ratio, width, extension)
    }

    /// Filesystem path of the `width` variant.
    #[must_use]
    pub fn path(&self, width: u32, extension: &str) -> PathBuf {
        self.output_dir.join(self.file_name(width, extension))
    }

    /// Public URL of the `width` variant.
    #[must_use]
    pub fn url(&self, width: u32, extension: &str) -> String {
        format!(
            "{}/{}{CACHE_QUERY}",
            self.public_dir,
            self.file_name(width, extension)
        )
    }

    /// `srcset` value for a nominal breakpoint: the 1x variant with a width
    /// descriptor, then one entry per higher pixel density.
    #[must_use]
    pub fn srcset(&self, breakpoint: u32, extension: &str) -> String {
        let mut srcset = format!("{} {breakpoint}w", self.url(breakpoint, extension));
        for density in &PIXEL_DENSITIES[1..] {
            let width = self.ladder.density_width(breakpoint, *density);
            let _ = write!(srcset, ", {} {density}x", self.url(width, extension));
        }
        srcset
    }

    /// One `<source>` element.
    #[must_use]
    pub fn source_html(&self, breakpoint: u32, extension: &str) -> String {
        format!(
            r#"<source type="{}" media="(max-width: {breakpoint}px)" srcset="{}">"#,
            mime_type(extension),
            escape_attr(&self.srcset(breakpoint, extension))
        )
    }

    /// Complete `<picture>` element.
    ///
    /// One `<source>` per nominal breakpoint and extension, then an `<img>`
    /// fallback at the smallest breakpoint in the last (most compatible)
    /// extension.
    #[must_use]
    pub fn picture_html(&self, alt: &str, attrs: &PictureAttrs) -> String {
        let mut html = String::from("<picture>");
        for &breakpoint in self.ladder.nominal() {
            for extension in &self.extensions {
                html.push_str(&self.source_html(breakpoint, extension));
            }
        }

        let fallback_width = self.ladder.nominal().first().copied().unwrap_or(640);
        let fallback_ext = self.extensions.last().map_or("jpg", String::as_str);
        let _ = write!(
            html,
            r#"<img src="{}" alt="{}""#,
            escape_attr(&self.url(fallback_width, fallback_ext)),
            escape_attr(alt)
        );
        if let Some(id) = &attrs.id {
            let _ = write!(html, r#" id="{}""#, escape_attr(id));
        }
        if !attrs.classes.is_empty() {
            let _ = write!(html, r#" class="{}""#, escape_attr(&attrs.classes.join(" ")));
        }
        html.push_str("></picture>");
        html
    }
}

fn derivative_name(
    stem: &str,
    width_ratio: f64,
    width: u32,
    extension: &str,
) -> String {
    format!("{stem}-{width_ratio}-{width}.{extension}")
}

/// MIME type for an image extension.
#[must_use]
pub fn mime_type(extension: &str) -> String {
    match extension {
        "jpg" | "jpeg" => "image/jpeg".to_owned(),
        "svg" => "image/svg+xml".to_owned(),
        other => format!("image/{other}"),
    }
}

/// Escape a value for use inside a double-quoted HTML attribute.
#[must_use]
pub fn escape_attr(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
