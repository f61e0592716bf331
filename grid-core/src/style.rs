use tracing::debug;

use crate::config::GridConfig;
use crate::error::GridError;
use crate::host::Host;
use crate::layout::ColumnCount;

pub const STYLE_ELEMENT_ID: &str = "dynamic-grid-style";
pub const ITEMS_PER_ROW_VAR: &str = "--ytd-rich-grid-items-per-row";
pub const POSTS_PER_ROW_VAR: &str = "--ytd-rich-grid-posts-per-row";
/// Attribute on the grid root mirrored from [`ITEMS_PER_ROW_VAR`].
pub const MIRRORED_ATTRIBUTE: &str = "items-per-row";

/// Selector for the injected `<style>` elements. Other elements that happen
/// to carry the same id never count.
pub fn style_selector(id: &str) -> String {
    format!("style#{id}")
}

/// Override stylesheet for `columns`. Same input, byte-identical output.
pub fn render_css(columns: ColumnCount, config: &GridConfig) -> String {
    let grid = &config.selectors.grid_root;
    let gap = config.layout.gap;
    let half_gap = gap / 2.0;
    format!(
        "{grid} {{\n\
         \x20 {ITEMS_PER_ROW_VAR}: {columns} !important;\n\
         \x20 {POSTS_PER_ROW_VAR}: {columns} !important;\n\
         \x20 --ytd-rich-grid-item-margin: {gap}px !important;\n\
         }}\n\
         {grid} ytd-rich-grid-row,\n\
         {grid} #contents.ytd-rich-grid-row {{\n\
         \x20 margin-left: 0 !important;\n\
         \x20 margin-right: 0 !important;\n\
         }}\n\
         {grid} ytd-rich-item-renderer {{\n\
         \x20 margin-left: {half_gap}px !important;\n\
         \x20 margin-right: {half_gap}px !important;\n\
         }}\n"
    )
}

/// What the page currently shows, read in one place so every caller uses the
/// same "is anything out of date" rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridSnapshot {
    pub style_present: bool,
    /// Computed value of [`ITEMS_PER_ROW_VAR`] on the grid root.
    pub computed: Option<u32>,
    /// Value of [`MIRRORED_ATTRIBUTE`] on the grid root.
    pub mirrored: Option<u32>,
}

impl GridSnapshot {
    pub fn read<H: Host + ?Sized>(host: &H, config: &GridConfig) -> Self {
        let grid = &config.selectors.grid_root;
        Self {
            style_present: host.has_style(STYLE_ELEMENT_ID),
            computed: host
                .computed_property(grid, ITEMS_PER_ROW_VAR)
                .and_then(|v| parse_count(&v)),
            mirrored: host
                .attribute(grid, MIRRORED_ATTRIBUTE)
                .and_then(|v| parse_count(&v)),
        }
    }

    /// Synced only when the style exists and both readings agree with `desired`.
    pub fn is_synced(&self, desired: ColumnCount) -> bool {
        self.style_present
            && self.computed == Some(desired.get())
            && self.mirrored == Some(desired.get())
    }
}

fn parse_count(raw: &str) -> Option<u32> {
    raw.trim().parse().ok()
}

/// Owner of the single injected style element.
#[derive(Debug, Default)]
pub struct StyleApplier {
    applied: Option<ColumnCount>,
}

impl StyleApplier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last column count written, if the style element is live.
    pub fn applied(&self) -> Option<ColumnCount> {
        self.applied
    }

    /// Rewrite the stylesheet and mirror the attribute on the grid root when
    /// it is present and differs.
    pub fn apply<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        config: &GridConfig,
        columns: ColumnCount,
    ) -> Result<(), GridError> {
        let nonce = if host.has_style(STYLE_ELEMENT_ID) {
            None
        } else {
            let nonce = host
                .attribute(&config.selectors.nonce_meta, "content")
                .filter(|n| !n.is_empty());
            debug!(has_nonce = nonce.is_some(), "creating grid style element");
            nonce
        };
        let css = render_css(columns, config);
        host.upsert_style(STYLE_ELEMENT_ID, &css, nonce.as_deref())?;
        self.applied = Some(columns);

        let grid = &config.selectors.grid_root;
        if host.exists(grid) {
            let value = columns.to_string();
            if host.attribute(grid, MIRRORED_ATTRIBUTE).as_deref() != Some(value.as_str()) {
                host.set_attribute(grid, MIRRORED_ATTRIBUTE, &value)?;
            }
        }
        Ok(())
    }

    /// Remove the style element; the next [`apply`](Self::apply) recreates it.
    pub fn release<H: Host + ?Sized>(&mut self, host: &mut H) {
        host.remove_style(STYLE_ELEMENT_ID);
        self.applied = None;
    }
}
