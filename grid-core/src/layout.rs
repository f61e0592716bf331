use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{LayoutMetrics, Selectors};
use crate::host::Host;

/// Items per row, always inside the configured bounds (3..=12 by default).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ColumnCount(u32);

impl ColumnCount {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ColumnCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `clamp(round((width - margin) / (item_width + gap)))`.
///
/// Never fails: negative or NaN widths count as zero and land on the lower
/// bound, infinite widths land on the upper one.
pub fn compute_columns(width: f64, metrics: &LayoutMetrics) -> ColumnCount {
    let (min, max) = metrics.bounds();
    let width = if width.is_nan() { 0.0 } else { width.max(0.0) };
    let pitch = (metrics.item_width + metrics.gap).max(1.0);
    let raw = ((width - metrics.margin) / pitch).round();
    if raw.is_nan() {
        return ColumnCount(min);
    }
    ColumnCount(raw.clamp(min as f64, max as f64) as u32)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidthSource {
    ContentContainer,
    FallbackContainer,
    Viewport,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub width: f64,
    pub source: WidthSource,
}

/// First usable width: content container, then fallback container, then the
/// viewport. Container widths of zero (detached or hidden) are skipped.
pub fn measure_width<H: Host + ?Sized>(host: &H, selectors: &Selectors) -> Measurement {
    let candidates = [
        (&selectors.content_container, WidthSource::ContentContainer),
        (&selectors.fallback_container, WidthSource::FallbackContainer),
    ];
    for (selector, source) in candidates {
        if let Some(width) = host.element_width(selector).filter(|w| w.is_finite() && *w > 0.0) {
            return Measurement { width, source };
        }
    }
    Measurement {
        width: host.viewport_width(),
        source: WidthSource::Viewport,
    }
}
