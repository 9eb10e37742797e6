//! Web app manifest generation.

use std::fs;
use std::path::PathBuf;

use pagec_images::{RESOURCE_DIR, mime_type};
use pagec_paths::{FilePath, PathGuard};
use serde::Serialize;

use crate::driver::PageContext;
use crate::error::BuildError;
use crate::page::OutputPage;

/// Logical path of the generated manifest.
pub const MANIFEST_PATH: &str = "/manifest.json";

/// Head markup linking the manifest.
pub const MANIFEST_LINK: &str = r#"<link rel="manifest" href="/manifest.json">"#;

/// Edge lengths of the raster icons.
pub const ICON_SIZES: [u32; 8] = [72, 96, 128, 144, 152, 192, 384, 512];

/// Encoder quality of the raster icons.
const ICON_QUALITY: u8 = 90;

/// Directory under the resource root receiving the icons.
const ICON_DIR: &str = "pwa";

/// Text direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dir {
    /// Browser decides.
    Auto,
    /// Left to right.
    Ltr,
    /// Right to left.
    Rtl,
}

/// Preferred display mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Display {
    /// Whole screen, no browser UI.
    Fullscreen,
    /// Own window, no browser UI.
    Standalone,
    /// Own window with minimal navigation controls.
    MinimalUi,
    /// Regular browser tab.
    Browser,
}

/// Default screen orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Orientation {
    Any,
    Natural,
    Landscape,
    LandscapePrimary,
    LandscapeSecondary,
    Portrait,
    PortraitPrimary,
    PortraitSecondary,
}

/// Store or platform of a related application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    ChromeWebStore,
    Play,
    Itunes,
    Webapp,
    Windows,
}

/// A URL scheme the app handles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProtocolHandler {
    /// Scheme, e.g. `web+music`.
    pub protocol: String,
    /// Handler URL template containing `%s`.
    pub url: String,
}

/// A native or web application offered instead of (or alongside) this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelatedApplication {
    /// Where the application is published.
    pub platform: Platform,
    /// Listing URL.
    pub url: String,
    /// Platform-specific identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// An image reference in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestImage {
    /// Public URL.
    pub src: String,
    /// `WxH`, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sizes: Option<String>,
    /// MIME type.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// A launcher shortcut.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Shortcut {
    /// Label.
    pub name: String,
    /// Short label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,
    /// Description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Target URL.
    pub url: String,
    /// Shortcut icons.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub icons: Vec<ManifestImage>,
}

/// Source files for the app icon.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IconSources {
    /// Vector icon, copied as is.
    pub svg: Option<PathBuf>,
    /// Raster icon, scaled to every [`ICON_SIZES`] entry.
    pub png: Option<PathBuf>,
}

/// Web app manifest. Unset fields are left out of the JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WebAppManifest {
    /// Application name.
    pub name: String,
    /// Short name for launchers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,
    /// Description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Splash screen background colour.
    #[serde(rename = "background_color", skip_serializing_if = "Option::is_none")]
    pub background_colour: Option<String>,
    /// Browser UI colour.
    #[serde(rename = "theme_color", skip_serializing_if = "Option::is_none")]
    pub theme_colour: Option<String>,
    /// Store categories.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    /// Text direction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<Dir>,
    /// Display mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<Display>,
    /// IARC certification code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iarc_rating_id: Option<String>,
    /// Primary language tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    /// Default orientation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orientation: Option<Orientation>,
    /// Whether related applications should be preferred.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefer_related_applications: Option<bool>,
    /// Handled URL schemes.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub protocol_handlers: Vec<ProtocolHandler>,
    /// Related applications.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub related_applications: Vec<RelatedApplication>,
    /// Navigation scope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Store screenshots.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub screenshots: Vec<ManifestImage>,
    /// Launcher shortcuts.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub shortcuts: Vec<Shortcut>,
    /// Start URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_url: Option<String>,
    /// Icon sources; rendered into `icons`.
    #[serde(skip)]
    pub icon: IconSources,
}

#[derive(Serialize)]
struct RenderedManifest<'a> {
    #[serde(flatten)]
    manifest: &'a WebAppManifest,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    icons: Vec<ManifestImage>,
}

impl WebAppManifest {
    /// Manifest named `name` with everything else unset.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Produce the icons and return the `/manifest.json` page plus the head
    /// markup linking it.
    ///
    /// Icon sources are resolved against the toolkit's source root.
    pub fn render(&self, ctx: &PageContext<'_>) -> Result<(OutputPage, String), BuildError> {
        let toolkit = ctx.toolkit();
        let mut icons = Vec::new();

        if let Some(svg) = &self.icon.svg {
            let source = toolkit.source_path(svg)?;
            let resources = PathGuard::new(toolkit.output_root().join(RESOURCE_DIR));
            let target = resources.join(&format!("{ICON_DIR}/icon.svg"))?;
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
            }
            fs::copy(&source, &target).map_err(|e| BuildError::io(&source, e))?;
            tracing::info!(path = %target.display(), "Copied icon");
            icons.push(ManifestImage {
                src: format!("/{RESOURCE_DIR}/{ICON_DIR}/icon.svg"),
                sizes: None,
                mime_type: Some(mime_type("svg")),
            });
        }

        if let Some(png) = &self.icon.png {
            let source = toolkit.source_path(png)?;
            let extension = FilePath::parse(&source)
                .extension
                .unwrap_or_else(|| "png".to_owned());
            let scaled =
                toolkit
                    .images()
                    .scale_to_sizes(&source, &ICON_SIZES, ICON_QUALITY, ICON_DIR, "icon")?;
            icons.extend(scaled.into_iter().map(|image| ManifestImage {
                src: image.url,
                sizes: Some(format!("{0}x{0}", image.size)),
                mime_type: Some(mime_type(&extension)),
            }));
        }

        let body = serde_json::to_vec(&RenderedManifest {
            manifest: self,
            icons,
        })?;
        Ok((OutputPage::new(MANIFEST_PATH, body), MANIFEST_LINK.to_owned()))
    }
}
