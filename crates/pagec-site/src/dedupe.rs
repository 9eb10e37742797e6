//! Per-page record of inlined assets.

use std::collections::HashSet;
use std::fmt;

/// Category of an inlined asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    /// Local stylesheet, raw or compiled.
    Style,
    /// Local script.
    Script,
    /// Web font stylesheet.
    Font,
    /// Inline SVG markup.
    Svg,
    /// Stylesheet downloaded from a URL.
    RemoteStyle,
    /// Script downloaded from a URL.
    RemoteScript,
}

impl AssetKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Style => "style",
            Self::Script => "script",
            Self::Font => "font",
            Self::Svg => "svg",
            Self::RemoteStyle => "remote-style",
            Self::RemoteScript => "remote-script",
        }
    }
}

/// Identity of an inlined asset: its kind plus a path, URL or font family.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetKey {
    /// Asset category.
    pub kind: AssetKind,
    /// Path, URL or family name.
    pub id: String,
}

impl AssetKey {
    /// Create a key.
    #[must_use]
    pub fn new(kind: AssetKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}

/// Assets already inlined into the page being built.
///
/// Cleared before every page, so each page embeds every asset it needs
/// exactly once.
#[derive(Debug, Default)]
pub struct AssetDedupe {
    seen: HashSet<AssetKey>,
}

impl AssetDedupe {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything; called when a new page starts.
    pub fn reset(&mut self) {
        self.seen.clear();
    }

    /// Whether `key` was already inlined into the current page.
    #[must_use]
    pub fn has(&self, key: &AssetKey) -> bool {
        self.seen.contains(key)
    }

    /// Record `key` as inlined.
    pub fn mark(&mut self, key: AssetKey) {
        self.seen.insert(key);
    }

    /// Number of assets inlined so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether nothing has been inlined yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
