//! Google Fonts stylesheet URLs.

/// Origin serving the font files referenced by Google Fonts stylesheets.
pub const FONT_ORIGIN: &str = "https://fonts.gstatic.com";

/// One face of a font family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FontStyle {
    /// `false` sorts first, so upright faces precede italics.
    pub italic: bool,
    /// CSS weight, 100 to 900.
    pub weight: u16,
}

impl FontStyle {
    /// Upright face of `weight`.
    #[must_use]
    pub fn upright(weight: u16) -> Self {
        Self {
            italic: false,
            weight,
        }
    }

    /// Italic face of `weight`.
    #[must_use]
    pub fn italic(weight: u16) -> Self {
        Self {
            italic: true,
            weight,
        }
    }
}

/// Stylesheet URL for `family` in `styles`.
///
/// The API rejects axis tuples that are out of order, so faces are sorted
/// upright first and then by weight. Duplicates are dropped.
#[must_use]
pub fn google_fonts_url(family: &str, styles: &[FontStyle]) -> String {
    let mut styles = styles.to_vec();
    styles.sort_unstable();
    styles.dedup();

    let axes = styles
        .iter()
        .map(|style| format!("{},{}", u8::from(style.italic), style.weight))
        .collect::<Vec<_>>()
        .join(";");
    let family = family.trim().replace(' ', "+");
    format!("https://fonts.googleapis.com/css2?family={family}:ital,wght@{axes}&display=swap")
}
