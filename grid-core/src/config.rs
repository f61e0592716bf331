use serde::{Deserialize, Serialize};

use crate::error::GridError;

/// Query parameter that turns on verbose console logging.
pub const DEBUG_QUERY_PARAM: &str = "dynamic-grid-debug";

/// Page global holding an optional JSON config override.
pub const CONFIG_GLOBAL: &str = "DYNAMIC_GRID_CONFIG";

/// Item geometry the column formula works from (pixels).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutMetrics {
    pub item_width: f64,
    pub gap: f64,
    pub margin: f64,
    pub min_columns: u32,
    pub max_columns: u32,
}

impl Default for LayoutMetrics {
    fn default() -> Self {
        Self {
            item_width: 340.0,
            gap: 16.0,
            margin: 32.0,
            min_columns: 3,
            max_columns: 12,
        }
    }
}

impl LayoutMetrics {
    /// Column bounds with `1 <= min <= max`.
    pub fn bounds(&self) -> (u32, u32) {
        let min = self.min_columns.max(1);
        (min, self.max_columns.max(min))
    }
}

/// One polling phase: tick period, stability threshold and wall-clock ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPhaseConfig {
    pub period_ms: u32,
    pub stable_ticks: u32,
    pub ceiling_ms: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    pub debounce_ms: u32,
    pub resize_debounce_ms: u32,
    pub retry_interval_ms: u32,
    pub retry_attempts: u32,
    pub observer_retry_ms: u32,
    pub fast_poll: PollPhaseConfig,
    pub slow_poll: PollPhaseConfig,
    /// Delays of the forced updates scheduled after each navigation.
    pub post_navigation_ms: Vec<u32>,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            debounce_ms: 50,
            resize_debounce_ms: 100,
            retry_interval_ms: 500,
            retry_attempts: 5,
            observer_retry_ms: 500,
            fast_poll: PollPhaseConfig {
                period_ms: 200,
                stable_ticks: 5,
                ceiling_ms: 5_000,
            },
            slow_poll: PollPhaseConfig {
                period_ms: 1_000,
                stable_ticks: 5,
                ceiling_ms: 25_000,
            },
            post_navigation_ms: vec![1_000, 5_000, 10_000],
        }
    }
}

/// Host page selectors. Defaults target YouTube's rich grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Selectors {
    pub grid_root: String,
    pub content_container: String,
    pub fallback_container: String,
    /// Mutation watcher targets, tried in order before the document root.
    pub observer_candidates: Vec<String>,
    pub nonce_meta: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            grid_root: "ytd-rich-grid-renderer".into(),
            content_container: "ytd-rich-grid-renderer #contents".into(),
            fallback_container: "#primary".into(),
            observer_candidates: vec![
                "#primary".into(),
                "ytd-page-manager".into(),
                "#content".into(),
            ],
            nonce_meta: "meta[property=\"csp-nonce\"]".into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub layout: LayoutMetrics,
    pub timings: Timings,
    pub selectors: Selectors,
    pub debug: bool,
}

impl GridConfig {
    /// Parse a (possibly partial) JSON override; missing fields keep defaults.
    pub fn from_json(json: &str) -> Result<Self, GridError> {
        let config: GridConfig = serde_json::from_str(json)?;
        Ok(config.normalized())
    }

    /// Defaults, then the JSON override if any, then the debug query flag.
    pub fn from_sources(json: Option<&str>, query: &str) -> Result<Self, GridError> {
        let base = match json.map(str::trim).filter(|s| !s.is_empty()) {
            Some(json) => Self::from_json(json)?,
            None => Self::default(),
        };
        Ok(base.with_query(query))
    }

    /// Apply the debug flag from a `location.search` string.
    pub fn with_query(mut self, query: &str) -> Self {
        if let Some(debug) = debug_flag(query) {
            self.debug = debug;
        }
        self
    }

    /// Clamp values that would stall or break the loops.
    pub fn normalized(mut self) -> Self {
        let (min, max) = self.layout.bounds();
        self.layout.min_columns = min;
        self.layout.max_columns = max;
        if !self.layout.item_width.is_finite() || self.layout.item_width <= 0.0 {
            self.layout.item_width = LayoutMetrics::default().item_width;
        }
        if !self.layout.gap.is_finite() || self.layout.gap < 0.0 {
            self.layout.gap = 0.0;
        }
        if !self.layout.margin.is_finite() {
            self.layout.margin = 0.0;
        }
        let t = &mut self.timings;
        for phase in [&mut t.fast_poll, &mut t.slow_poll] {
            phase.period_ms = phase.period_ms.max(1);
            phase.stable_ticks = phase.stable_ticks.max(1);
        }
        t.retry_interval_ms = t.retry_interval_ms.max(1);
        t.observer_retry_ms = t.observer_retry_ms.max(1);
        self
    }
}

/// Value of [`DEBUG_QUERY_PARAM`] in `query`, if present.
///
/// A bare key or `1`/`true`/`on`/`yes` enables; anything else disables.
pub fn debug_flag(query: &str) -> Option<bool> {
    query
        .trim_start_matches('?')
        .split('&')
        .filter(|pair| !pair.is_empty())
        .find_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (key == DEBUG_QUERY_PARAM).then(|| {
                matches!(
                    value.to_ascii_lowercase().as_str(),
                    "" | "1" | "true" | "on" | "yes"
                )
            })
        })
}
