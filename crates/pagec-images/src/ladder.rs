//! Breakpoint ladder.

/// Widths every source is rendered at.
pub const STANDARD_WIDTHS: [u32; 11] = [
    640, 960, 1280, 1440, 1600, 1920, 2400, 2560, 2880, 3200, 3840,
];

/// Breakpoints emitted in `<picture>` markup.
pub const NOMINAL_BREAKPOINTS: [u32; 6] = [640, 960, 1280, 1920, 2560, 3840];

/// Device pixel ratios offered for each nominal breakpoint.
pub const PIXEL_DENSITIES: [f64; 5] = [1.0, 1.5, 2.0, 2.5, 3.0];

/// The set of generated widths and the breakpoints that reference them.
///
/// Every density variant of a nominal breakpoint must be one of the
/// generated widths once clamped to the largest of them:
///
/// ```text
/// 1.0x: [  640,  960, 1280, 1920, 2560, 3840 ]
/// 1.5x: [  960, 1440, 1920, 2880, 3840, 3840 ]
/// 2.0x: [ 1280, 1920, 2560, 3840, 3840, 3840 ]
/// 2.5x: [ 1600, 2400, 3200, 3840, 3840, 3840 ]
/// 3.0x: [ 1920, 2880, 3840, 3840, 3840, 3840 ]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointLadder {
    widths: Vec<u32>,
    nominal: Vec<u32>,
}

impl BreakpointLadder {
    /// Build a ladder from explicit lists.
    ///
    /// Widths are sorted and deduplicated. Returns `None` when either list
    /// is empty or contains a zero width.
    #[must_use]
    pub fn new(mut widths: Vec<u32>, mut nominal: Vec<u32>) -> Option<Self> {
        let has_zero = widths.iter().chain(&nominal).any(|&w| w == 0);
        if widths.is_empty() || nominal.is_empty() || has_zero {
            return None;
        }
        widths.sort_unstable();
        widths.dedup();
        nominal.sort_unstable();
        nominal.dedup();
        Some(Self { widths, nominal })
    }

    /// Generated widths, ascending.
    #[must_use]
    pub fn widths(&self) -> &[u32] {
        &self.widths
    }

    /// Markup breakpoints, ascending.
    #[must_use]
    pub fn nominal(&self) -> &[u32] {
        &self.nominal
    }

    /// Largest generated width.
    #[must_use]
    pub fn max_width(&self) -> u32 {
        self.widths.last().copied().unwrap_or_default()
    }

    /// Width served for `breakpoint` at `density`, clamped to [`max_width`](Self::max_width).
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn density_width(&self, breakpoint: u32, density: f64) -> u32 {
        let scaled = (f64::from(breakpoint) * density).round();
        scaled.min(f64::from(self.max_width())) as u32
    }
}

impl Default for BreakpointLadder {
    fn default() -> Self {
        Self {
            widths: STANDARD_WIDTHS.to_vec(),
            nominal: NOMINAL_BREAKPOINTS.to_vec(),
        }
    }
}
