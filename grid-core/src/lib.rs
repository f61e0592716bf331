//! Responsive column override for YouTube's rich video grid.
//!
//! The browser is reached only through the [`Host`] trait; `grid-frontend`
//! implements it over `web-sys`, tests use an in-memory `FakeHost`.

pub mod config;
pub mod controller;
pub mod debounce;
pub mod error;
pub mod host;
pub mod layout;
pub mod mutation;
pub mod navigation;
pub mod poll;
pub mod style;

#[cfg(test)]
mod fake;

pub use config::{GridConfig, LayoutMetrics, PollPhaseConfig, Selectors, Timings};
pub use controller::{GridController, Lifecycle, UpdateOutcome, UpdateStats};
pub use error::{GridError, HostError};
pub use host::{
    Host, ListenerId, MutationKind, MutationRecord, ObserveOptions, ObserveTarget, PageEvent,
    SubscriptionId, Task, TimerId,
};
pub use layout::{compute_columns, measure_width, ColumnCount, Measurement, WidthSource};
pub use poll::{Observation, PollState, PollTransition};
pub use style::{render_css, GridSnapshot, StyleApplier, MIRRORED_ATTRIBUTE, STYLE_ELEMENT_ID};
