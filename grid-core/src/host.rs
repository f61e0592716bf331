//! Capability set the engine runs against.
//!
//! The controller never owns closures or browser handles. It asks the host to
//! schedule a [`Task`] or observe a target and gets back an opaque id; the host
//! reports expiry and mutation batches by calling back into
//! [`GridController`](crate::GridController) with that id.

use crate::error::HostError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// Work a timer carries back to the controller when it expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// Trailing edge of the update debounce window.
    Debounce,
    /// Trailing edge of the viewport resize debounce.
    Resize,
    /// Immediate-retry helper; `remaining` reschedules are left.
    Retry { remaining: u32 },
    /// Mutation watcher found no container and is trying again.
    ObserverRetry,
    /// Fast or slow poll tick (interval).
    Poll,
    /// Forced update scheduled after a navigation.
    PostNavigation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObserveTarget {
    Selector(String),
    DocumentRoot,
}

/// Mirrors `MutationObserverInit` for the fields the watchers use.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObserveOptions {
    pub child_list: bool,
    pub subtree: bool,
    /// Empty means attribute changes are not observed.
    pub attribute_filter: Vec<String>,
}

impl ObserveOptions {
    pub fn observes_attributes(&self) -> bool {
        !self.attribute_filter.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    ChildList,
    Attributes,
}

/// One mutation record, reduced to what relevance checks need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub kind: MutationKind,
    pub attribute_name: Option<String>,
    pub added_nodes: u32,
    /// The record's target is, contains, or is contained by the grid root.
    pub touches_grid: bool,
}

impl MutationRecord {
    pub fn child_list(added_nodes: u32, touches_grid: bool) -> Self {
        Self {
            kind: MutationKind::ChildList,
            attribute_name: None,
            added_nodes,
            touches_grid,
        }
    }

    pub fn attribute(name: &str, touches_grid: bool) -> Self {
        Self {
            kind: MutationKind::Attributes,
            attribute_name: Some(name.to_string()),
            added_nodes: 0,
            touches_grid,
        }
    }
}

/// Page lifecycle events the controller subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageEvent {
    Resize,
    Load,
    PopState,
    /// YouTube's own "client-side navigation finished" event.
    NavigateFinish,
    PageHide,
    /// Fires on every show, including a restore from the back/forward cache.
    PageShow,
}

impl PageEvent {
    pub const ALL: [PageEvent; 6] = [
        PageEvent::Resize,
        PageEvent::Load,
        PageEvent::PopState,
        PageEvent::NavigateFinish,
        PageEvent::PageHide,
        PageEvent::PageShow,
    ];

    pub fn dom_name(self) -> &'static str {
        match self {
            PageEvent::Resize => "resize",
            PageEvent::Load => "load",
            PageEvent::PopState => "popstate",
            PageEvent::NavigateFinish => "yt-navigate-finish",
            PageEvent::PageHide => "pagehide",
            PageEvent::PageShow => "pageshow",
        }
    }
}

/// Browser primitives the engine needs, implemented over `web-sys` in the
/// frontend crate and in memory by the test-only `FakeHost`.
///
/// Cancel/disconnect/unlisten must tolerate ids that are already gone.
pub trait Host {
    // ---------- clock & location -----------------------------------------
    /// Monotonic milliseconds.
    fn now_ms(&self) -> f64;
    fn location(&self) -> String;

    // ---------- geometry & attributes ------------------------------------
    fn viewport_width(&self) -> f64;
    /// Bounding-box width of the first element matching `selector`.
    fn element_width(&self, selector: &str) -> Option<f64>;
    fn exists(&self, selector: &str) -> bool;
    /// Present, not `hidden`, and laid out with a non-zero width.
    fn is_visible(&self, selector: &str) -> bool;
    fn attribute(&self, selector: &str, name: &str) -> Option<String>;
    fn set_attribute(&mut self, selector: &str, name: &str, value: &str) -> Result<(), HostError>;
    fn computed_property(&self, selector: &str, property: &str) -> Option<String>;

    // ---------- injected style -------------------------------------------
    fn has_style(&self, id: &str) -> bool;
    /// Write `css` into the style element `id`, creating it (with `nonce`) if
    /// missing. Duplicate elements with the same id are collapsed to one.
    fn upsert_style(&mut self, id: &str, css: &str, nonce: Option<&str>) -> Result<(), HostError>;
    fn remove_style(&mut self, id: &str);

    // ---------- timers ----------------------------------------------------
    fn set_timeout(&mut self, delay_ms: u32, task: Task) -> TimerId;
    fn set_interval(&mut self, period_ms: u32, task: Task) -> TimerId;
    fn clear_timer(&mut self, id: TimerId);

    // ---------- observation & events ---------------------------------------
    /// Returns `None` when the target does not exist yet.
    fn observe(&mut self, target: &ObserveTarget, options: &ObserveOptions) -> Option<SubscriptionId>;
    fn disconnect(&mut self, id: SubscriptionId);
    fn listen(&mut self, event: PageEvent) -> Option<ListenerId>;
    fn unlisten(&mut self, id: ListenerId);
}
