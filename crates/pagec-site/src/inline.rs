//! Asset inlining for page producers.
//!
//! Every inliner returns the markup to splice into the page, or an empty
//! string when the same asset was already inlined into the current page.
//! An asset is recorded only once its markup was produced, so a failed
//! attempt can be retried by a later call.

use std::fs;
use std::path::Path;

use pagec_images::{ImageOptions, PictureAttrs, RESOURCE_DIR, SingleImage, escape_attr};
use pagec_paths::{FilePath, PathGuard};

use crate::dedupe::{AssetKey, AssetKind};
use crate::driver::PageContext;
use crate::error::BuildError;
use crate::fonts::{FONT_ORIGIN, FontStyle, google_fonts_url};

/// Social preview images of one source, as public URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocialImages {
    /// Square rendition.
    pub square: String,
    /// Wide rendition.
    pub wide: String,
}

impl SocialImages {
    /// Open Graph `<meta>` tags for both renditions.
    #[must_use]
    pub fn meta_html(&self) -> String {
        let square = SingleImage::social_square();
        let wide = SingleImage::social_wide();
        let url = escape_attr(&self.square);
        format!(
            concat!(
                r#"<meta name="thumbnail" content="{url}">"#,
                r#"<meta property="og:image" content="{url}">"#,
                r#"<meta property="og:image:width" content="{sw}">"#,
                r#"<meta property="og:image:height" content="{sh}">"#,
                r#"<meta property="og:image" content="{wide_url}">"#,
                r#"<meta property="og:image:width" content="{ww}">"#,
                r#"<meta property="og:image:height" content="{wh}">"#,
            ),
            url = url,
            sw = square.width,
            sh = square.height(),
            wide_url = escape_attr(&self.wide),
            ww = wide.width,
            wh = wide.height(),
        )
    }
}

impl PageContext<'_> {
    /// Run `produce` unless `key` was already inlined into this page.
    fn once<F>(&mut self, key: AssetKey, produce: F) -> Result<String, BuildError>
    where
        F: FnOnce(&Self) -> Result<String, BuildError>,
    {
        if self.dedupe.has(&key) {
            tracing::debug!(asset = %key, "Already inlined");
            return Ok(String::new());
        }
        let html = produce(self)?;
        self.dedupe.mark(key);
        Ok(html)
    }

    /// Resolve a local source, then run `render` over its text unless the
    /// resolved file was already inlined as `kind`.
    fn once_local<F>(
        &mut self,
        kind: AssetKind,
        path: &Path,
        render: F,
    ) -> Result<String, BuildError>
    where
        F: FnOnce(&Self, String) -> Result<String, BuildError>,
    {
        let file = self.toolkit.source_path(path)?;
        self.once(AssetKey::new(kind, file.to_string_lossy()), |ctx| {
            let text = fs::read_to_string(&file).map_err(|e| BuildError::io(&file, e))?;
            render(ctx, text)
        })
    }

    /// Inline a local stylesheet as written.
    pub fn inline_css(&mut self, path: impl AsRef<Path>) -> Result<String, BuildError> {
        self.once_local(AssetKind::Style, path.as_ref(), |_, css| {
            Ok(format!("<style>{css}</style>"))
        })
    }

    /// Inline a local script.
    pub fn inline_js(&mut self, path: impl AsRef<Path>) -> Result<String, BuildError> {
        self.once_local(AssetKind::Script, path.as_ref(), |_, js| {
            Ok(format!("<script>{js}</script>"))
        })
    }

    /// Inline a local stylesheet compiled through the style pipeline.
    pub fn inline_style(&mut self, path: impl AsRef<Path>) -> Result<String, BuildError> {
        self.once_local(AssetKind::Style, path.as_ref(), |ctx, source| {
            let css = ctx.toolkit.styles().compile(&source)?;
            Ok(format!("<style>{css}</style>"))
        })
    }

    /// Inline SVG markup, optimized when an optimizer is configured.
    pub fn inline_svg(&mut self, path: impl AsRef<Path>) -> Result<String, BuildError> {
        self.once_local(AssetKind::Svg, path.as_ref(), |ctx, svg| {
            ctx.toolkit.svg().optimize(&svg)
        })
    }

    /// Inline a remote stylesheet.
    pub fn inline_external_css(&mut self, url: &str) -> Result<String, BuildError> {
        self.once(AssetKey::new(AssetKind::RemoteStyle, url), |ctx| {
            let css = ctx.toolkit.fetcher().fetch(url)?;
            Ok(format!("<style>{css}</style>"))
        })
    }

    /// Inline a remote script.
    pub fn inline_external_js(&mut self, url: &str) -> Result<String, BuildError> {
        self.once(AssetKey::new(AssetKind::RemoteScript, url), |ctx| {
            let js = ctx.toolkit.fetcher().fetch(url)?;
            Ok(format!("<script>{js}</script>"))
        })
    }

    /// Preconnect to the font origin and inline the Google Fonts stylesheet
    /// for `family` in `styles`.
    pub fn import_google_font(
        &mut self,
        family: &str,
        styles: &[FontStyle],
    ) -> Result<String, BuildError> {
        let url = google_fonts_url(family, styles);
        let key = AssetKey::new(AssetKind::Font, url.as_str());
        if self.dedupe.has(&key) {
            return Ok(String::new());
        }
        let stylesheet = self.inline_external_css(&url)?;
        self.dedupe.mark(key);
        Ok(format!(
            r#"<link rel="preconnect" href="{FONT_ORIGIN}">{stylesheet}"#
        ))
    }

    /// Materialize responsive derivatives of `source` and return the
    /// `<picture>` element.
    ///
    /// `options` falls back to the toolkit defaults. Pictures are not
    /// deduplicated.
    pub fn picture(
        &self,
        source: impl AsRef<Path>,
        alt: &str,
        options: Option<&ImageOptions>,
        attrs: &PictureAttrs,
    ) -> Result<String, BuildError> {
        let toolkit = self.toolkit;
        let source = toolkit.source_path(source)?;
        let options = options.unwrap_or_else(|| toolkit.image_defaults());
        let set = toolkit.images().materialize(&source, options, toolkit.ladder())?;
        Ok(set.picture_html(alt, attrs))
    }

    /// Render the square and wide social preview images of `source`.
    pub fn social_images(&self, source: impl AsRef<Path>) -> Result<SocialImages, BuildError> {
        let toolkit = self.toolkit;
        let source = toolkit.source_path(source)?;
        Ok(SocialImages {
            square: toolkit
                .images()
                .render_single(&source, &SingleImage::social_square())?,
            wide: toolkit
                .images()
                .render_single(&source, &SingleImage::social_wide())?,
        })
    }

    /// Copy a raw resource file to `res/<file name>` and return its URL.
    ///
    /// The source is resolved against the source root and the copy must land
    /// inside the `res` directory. Resources are not deduplicated; a repeat
    /// call overwrites the copy with the same bytes.
    pub fn include_resource(&self, path: impl AsRef<Path>) -> Result<String, BuildError> {
        let source = self.toolkit.source_path(path)?;
        let name = FilePath::parse(&source).file_name();
        let resources = PathGuard::new(self.toolkit.output_root().join(RESOURCE_DIR));
        let target = resources.join(&name)?;
        if let Some(parent) = target.parent()
            && !parent.is_dir()
        {
            fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
        }
        fs::copy(&source, &target).map_err(|e| BuildError::io(&source, e))?;
        tracing::info!(path = %target.display(), "Included resource");
        Ok(format!("/{RESOURCE_DIR}/{name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedupe::AssetDedupe;
    use crate::driver::Toolkit;
    use crate::fetch::{REMOTE_BUCKET, RemoteFetcher};
    use crate::transform::{STYLES_BUCKET, StyleCompiler, TextTransform, TransformError};
    use pagec_cache::DerivativeCache;
    use pagec_images::{ImagePipeline, TranscodeError, TranscodeJob, Transcoder};
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    struct TouchTranscoder;

    impl Transcoder for TouchTranscoder {
        fn transcode(&self, job: &TranscodeJob) -> Result<(), TranscodeError> {
            fs::write(&job.output, b"img").map_err(|e| TranscodeError::Other {
                output: job.output.clone(),
                message: e.to_string(),
            })
        }
    }

    struct Minify;

    impl TextTransform for Minify {
        fn name(&self) -> &str {
            "minify"
        }

        fn apply(&self, input: &str) -> Result<String, TransformError> {
            Ok(input.split_whitespace().collect())
        }
    }

    struct Fixture {
        tmp: TempDir,
        cache: DerivativeCache,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            let cache = DerivativeCache::new(tmp.path().join("cache"));
            fs::write(tmp.path().join("site.css"), "a { color: red; }").unwrap();
            fs::write(tmp.path().join("app.js"), "run()").unwrap();
            fs::write(tmp.path().join("logo.svg"), "<svg/>").unwrap();
            Self { tmp, cache }
        }

        fn toolkit(&self) -> Toolkit {
            let output = self.tmp.path().join("root");
            let images = ImagePipeline::new(&output, Arc::new(TouchTranscoder), 1).unwrap();
            Toolkit::new(&output, self.tmp.path(), images, &self.cache)
        }
    }

    #[test]
    fn test_inline_css_once_per_page() {
        let fixture = Fixture::new();
        let toolkit = fixture.toolkit();
        let mut dedupe = AssetDedupe::new();
        let mut ctx = PageContext::new(&toolkit, &mut dedupe);

        assert_eq!(ctx.inline_css("site.css").unwrap(), "<style>a { color: red; }</style>");
        assert_eq!(ctx.inline_css("site.css").unwrap(), "");
        assert_eq!(ctx.inline_js("app.js").unwrap(), "<script>run()</script>");
    }

    #[test]
    fn test_two_spellings_of_one_source_inline_once() {
        let fixture = Fixture::new();
        fs::create_dir_all(fixture.tmp.path().join("styles")).unwrap();
        let toolkit = fixture.toolkit();
        let mut dedupe = AssetDedupe::new();
        let mut ctx = PageContext::new(&toolkit, &mut dedupe);

        let mut body = ctx.inline_css("site.css").unwrap();
        body.push_str(&ctx.inline_css("./site.css").unwrap());
        body.push_str(&ctx.inline_css("styles/../site.css").unwrap());

        assert_eq!(body.matches("<style>").count(), 1);
        assert_eq!(ctx.dedupe().len(), 1);
    }

    #[test]
    fn test_compiled_and_raw_style_share_identity() {
        let fixture = Fixture::new();
        let toolkit = fixture.toolkit();
        let mut dedupe = AssetDedupe::new();
        let mut ctx = PageContext::new(&toolkit, &mut dedupe);

        ctx.inline_style("site.css").unwrap();

        assert_eq!(ctx.inline_css("site.css").unwrap(), "");
    }

    #[test]
    fn test_inline_style_compiles() {
        let fixture = Fixture::new();
        let toolkit = fixture.toolkit().with_styles(StyleCompiler::new(
            vec![Box::new(Minify)],
            vec!["defaults".to_owned()],
            fixture.cache.bucket(STYLES_BUCKET),
        ));
        let mut dedupe = AssetDedupe::new();
        let mut ctx = PageContext::new(&toolkit, &mut dedupe);

        assert_eq!(ctx.inline_style("site.css").unwrap(), "<style>a{color:red;}</style>");
    }

    #[test]
    fn test_inline_svg_passthrough() {
        let fixture = Fixture::new();
        let toolkit = fixture.toolkit();
        let mut dedupe = AssetDedupe::new();
        let mut ctx = PageContext::new(&toolkit, &mut dedupe);

        assert_eq!(ctx.inline_svg("logo.svg").unwrap(), "<svg/>");
        assert_eq!(ctx.inline_svg("logo.svg").unwrap(), "");
    }

    #[test]
    fn test_failed_inline_is_not_marked() {
        let fixture = Fixture::new();
        let toolkit = fixture.toolkit();
        let mut dedupe = AssetDedupe::new();
        let mut ctx = PageContext::new(&toolkit, &mut dedupe);

        assert!(ctx.inline_js("later.js").is_err());
        fs::write(fixture.tmp.path().join("later.js"), "go()").unwrap();

        assert_eq!(ctx.inline_js("later.js").unwrap(), "<script>go()</script>");
    }

    #[test]
    fn test_inline_rejects_source_escape() {
        let fixture = Fixture::new();
        let toolkit = fixture.toolkit();
        let mut dedupe = AssetDedupe::new();
        let mut ctx = PageContext::new(&toolkit, &mut dedupe);

        let err = ctx.inline_css("../../etc/passwd").unwrap_err();

        assert!(matches!(err, BuildError::Traversal(_)));
        assert!(ctx.dedupe().is_empty());
    }

    #[test]
    fn test_external_and_font_served_from_cache() {
        let fixture = Fixture::new();
        let bucket = fixture.cache.bucket(REMOTE_BUCKET);
        let font_url = google_fonts_url("Inter", &[FontStyle::upright(400)]);
        for (url, body) in [
            (font_url.as_str(), "@font-face{}"),
            ("https://cdn.invalid/app.js", "boot()"),
        ] {
            bucket
                .get_or_compute::<BuildError, _>(url.as_bytes(), || Ok(body.as_bytes().to_vec()))
                .unwrap();
        }
        let toolkit = fixture
            .toolkit()
            .with_fetcher(RemoteFetcher::new(Duration::from_millis(50), bucket));
        let mut dedupe = AssetDedupe::new();
        let mut ctx = PageContext::new(&toolkit, &mut dedupe);

        let font = ctx
            .import_google_font("Inter", &[FontStyle::upright(400)])
            .unwrap();
        assert_eq!(
            font,
            r#"<link rel="preconnect" href="https://fonts.gstatic.com"><style>@font-face{}</style>"#
        );
        assert_eq!(
            ctx.import_google_font("Inter", &[FontStyle::upright(400)])
                .unwrap(),
            ""
        );
        assert_eq!(
            ctx.inline_external_js("https://cdn.invalid/app.js").unwrap(),
            "<script>boot()</script>"
        );
        assert_eq!(ctx.inline_external_js("https://cdn.invalid/app.js").unwrap(), "");
    }

    #[test]
    fn test_picture_materializes_under_res() {
        let fixture = Fixture::new();
        let img_dir = fixture.tmp.path().join("img");
        fs::create_dir_all(&img_dir).unwrap();
        image::RgbImage::new(400, 200)
            .save(img_dir.join("hero.png"))
            .unwrap();
        let toolkit = fixture.toolkit();
        let mut dedupe = AssetDedupe::new();
        let ctx = PageContext::new(&toolkit, &mut dedupe);

        let html = ctx
            .picture("img/hero.png", "Hero", None, &PictureAttrs::default())
            .unwrap();

        assert!(html.starts_with("<picture>"));
        assert!(html.contains(r#"src="/res/img/hero-1-640.jpg?cache-age=604800""#));
        assert!(fixture.tmp.path().join("root/res/img/hero-1-3840.webp").exists());
    }

    #[test]
    fn test_social_images() {
        let fixture = Fixture::new();
        image::RgbImage::new(800, 600)
            .save(fixture.tmp.path().join("cover.png"))
            .unwrap();
        let toolkit = fixture.toolkit();
        let mut dedupe = AssetDedupe::new();
        let ctx = PageContext::new(&toolkit, &mut dedupe);

        let images = ctx.social_images("cover.png").unwrap();

        assert!(images.square.starts_with("/res/seo/"));
        assert!(images.wide.ends_with("-wide.jpg"));
        let meta = images.meta_html();
        assert!(meta.contains(r#"content="600""#));
        assert!(meta.contains(r#"content="630""#));
    }

    #[test]
    fn test_include_resource_copies_under_res() {
        let fixture = Fixture::new();
        fs::create_dir_all(fixture.tmp.path().join("files")).unwrap();
        fs::write(fixture.tmp.path().join("files/robots.txt"), "User-agent: *").unwrap();
        let toolkit = fixture.toolkit();
        let mut dedupe = AssetDedupe::new();
        let ctx = PageContext::new(&toolkit, &mut dedupe);

        let url = ctx.include_resource("files/robots.txt").unwrap();
        ctx.include_resource("./files/robots.txt").unwrap();

        assert_eq!(url, "/res/robots.txt");
        assert_eq!(
            fs::read_to_string(fixture.tmp.path().join("root/res/robots.txt")).unwrap(),
            "User-agent: *"
        );
    }

    #[test]
    fn test_include_resource_rejects_source_escape() {
        let fixture = Fixture::new();
        let toolkit = fixture.toolkit();
        let mut dedupe = AssetDedupe::new();
        let ctx = PageContext::new(&toolkit, &mut dedupe);

        let err = ctx.include_resource("../../etc/hostname").unwrap_err();

        assert!(matches!(err, BuildError::Traversal(_)));
        assert!(!fixture.tmp.path().join("root/res").exists());
    }
}
