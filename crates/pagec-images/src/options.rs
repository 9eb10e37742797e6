//! Per-source derivative options.

use crate::ImageError;

/// Default encoder quality.
pub const DEFAULT_QUALITY: u8 = 65;

/// Extensions the transcoder is known to produce.
pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["webp", "jpg", "png", "avif"];

/// How a derivative set is rendered.
///
/// The options are part of the set's identity: two calls with different
/// ratios write differently named files, while a change of quality or
/// extensions only takes effect for files not yet on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageOptions {
    /// Horizontal share of the viewport the image occupies (1 = full width).
    pub width_ratio: Option<f64>,
    /// Vertical ratio; derived from the source aspect when unset.
    pub height_ratio: Option<f64>,
    /// Encoder quality, 1-100.
    pub quality: u8,
    /// Output formats, most preferred first.
    pub extensions: Vec<String>,
    /// Crop to exactly `width_ratio:height_ratio` instead of keeping the
    /// source aspect.
    pub force_size: bool,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            width_ratio: None,
            height_ratio: None,
            quality: DEFAULT_QUALITY,
            extensions: vec!["webp".to_owned(), "jpg".to_owned()],
            force_size: false,
        }
    }
}

impl ImageOptions {
    /// Options with the given width ratio and defaults otherwise.
    #[must_use]
    pub fn with_width_ratio(width_ratio: f64) -> Self {
        Self {
            width_ratio: Some(width_ratio),
            ..Self::default()
        }
    }

    /// Check quality, extensions and ratios.
    pub fn validate(&self) -> Result<(), ImageError> {
        if !(1..=100).contains(&self.quality) {
            return Err(ImageError::InvalidOptions(format!(
                "quality must be between 1 and 100, got {}",
                self.quality
            )));
        }
        if self.extensions.is_empty() {
            return Err(ImageError::InvalidOptions(
                "at least one extension is required".to_owned(),
            ));
        }
        if let Some(ext) = self
            .extensions
            .iter()
            .find(|ext| !SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
        {
            return Err(ImageError::InvalidOptions(format!(
                "unsupported extension '{ext}'"
            )));
        }
        for (name, ratio) in [("width", self.width_ratio), ("height", self.height_ratio)] {
            if let Some(ratio) = ratio
                && !(ratio.is_finite() && ratio > 0.0)
            {
                return Err(ImageError::InvalidOptions(format!(
                    "{name} ratio must be a positive number, got {ratio}"
                )));
            }
        }
        Ok(())
    }

    /// Fill in missing ratios from the source aspect (width / height).
    ///
    /// Neither given: both are 1. Only height: width follows the aspect.
    /// Only width: height follows the aspect.
    #[must_use]
    pub fn resolve_ratios(&self, aspect: f64) -> (f64, f64) {
        match (self.width_ratio, self.height_ratio) {
            (None, None) => (1.0, 1.0),
            (None, Some(height)) => (aspect * height, height),
            (Some(width), None) => (width, width / aspect),
            (Some(width), Some(height)) => (width, height),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let options = ImageOptions::default();
        assert_eq!(options.quality, 65);
        assert_eq!(options.extensions, vec!["webp", "jpg"]);
        assert!(options.validate().is_ok());
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn test_resolve_ratios() {
        let aspect = 2.0;
        let mut options = ImageOptions::default();
        assert_eq!(options.resolve_ratios(aspect), (1.0, 1.0));

        options.height_ratio = Some(0.5);
        assert_eq!(options.resolve_ratios(aspect), (1.0, 0.5));

        options.height_ratio = None;
        options.width_ratio = Some(0.5);
        assert_eq!(options.resolve_ratios(aspect), (0.5, 0.25));

        options.height_ratio = Some(0.75);
        assert_eq!(options.resolve_ratios(aspect), (0.5, 0.75));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases = [
            ImageOptions {
                quality: 0,
                ..ImageOptions::default()
            },
            ImageOptions {
                quality: 101,
                ..ImageOptions::default()
            },
            ImageOptions {
                extensions: Vec::new(),
                ..ImageOptions::default()
            },
            ImageOptions {
                extensions: vec!["bmp".to_owned()],
                ..ImageOptions::default()
            },
            ImageOptions::with_width_ratio(0.0),
            ImageOptions::with_width_ratio(f64::NAN),
        ];

        for options in cases {
            assert!(
                matches!(options.validate(), Err(ImageError::InvalidOptions(_))),
                "{options:?} should be rejected"
            );
        }
    }
}
