//! The update loop: one controller value owns every timer, subscription and
//! listener handle for a page view.

use tracing::{debug, info, warn};

use crate::config::GridConfig;
use crate::debounce::TimerSlot;
use crate::error::GridError;
use crate::host::{Host, ListenerId, MutationRecord, PageEvent, SubscriptionId, Task, TimerId};
use crate::layout::{compute_columns, measure_width, ColumnCount};
use crate::mutation::{batch_is_relevant, MutationWatcher};
use crate::navigation::NavigationWatcher;
use crate::poll::{Observation, PollState, PollTransition};
use crate::style::{GridSnapshot, StyleApplier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Idle,
    Running,
    TornDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// No visible grid root.
    Skipped,
    Unchanged(ColumnCount),
    Applied(ColumnCount),
    /// Writing failed; logged and swallowed.
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateStats {
    pub applied: u64,
    pub unchanged: u64,
    pub skipped: u64,
    pub failed: u64,
    pub resets: u64,
}

impl UpdateStats {
    fn record(&mut self, outcome: UpdateOutcome) {
        match outcome {
            UpdateOutcome::Skipped => self.skipped += 1,
            UpdateOutcome::Unchanged(_) => self.unchanged += 1,
            UpdateOutcome::Applied(_) => self.applied += 1,
            UpdateOutcome::Failed => self.failed += 1,
        }
    }
}

pub struct GridController {
    config: GridConfig,
    lifecycle: Lifecycle,
    style: StyleApplier,
    grid_watcher: MutationWatcher,
    navigation: NavigationWatcher,
    poll: PollState,
    poll_timer: Option<TimerId>,
    debounce: TimerSlot,
    resize: TimerSlot,
    retry: TimerSlot,
    post_navigation: Vec<TimerId>,
    listeners: Vec<ListenerId>,
    stats: UpdateStats,
}

impl GridController {
    pub fn new(config: GridConfig) -> Self {
        Self {
            config: config.normalized(),
            lifecycle: Lifecycle::Idle,
            style: StyleApplier::new(),
            grid_watcher: MutationWatcher::new(),
            navigation: NavigationWatcher::new(),
            poll: PollState::Idle,
            poll_timer: None,
            debounce: TimerSlot::new(),
            resize: TimerSlot::new(),
            retry: TimerSlot::new(),
            post_navigation: Vec::new(),
            listeners: Vec::new(),
            stats: UpdateStats::default(),
        }
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn poll_state(&self) -> PollState {
        self.poll
    }

    /// Column count currently written to the style element.
    pub fn columns(&self) -> Option<ColumnCount> {
        self.style.applied()
    }

    pub fn stats(&self) -> UpdateStats {
        self.stats
    }

    pub fn grid_subscription(&self) -> Option<SubscriptionId> {
        self.grid_watcher.subscription()
    }

    fn running(&self) -> bool {
        self.lifecycle == Lifecycle::Running
    }

    // ---------- lifecycle ------------------------------------------------

    /// Inject the style, start every watcher and subscribe to page events.
    /// Calling it again is a no-op.
    pub fn start<H: Host + ?Sized>(&mut self, host: &mut H) {
        if self.lifecycle != Lifecycle::Idle {
            debug!(lifecycle = ?self.lifecycle, "start ignored");
            return;
        }
        self.lifecycle = Lifecycle::Running;
        info!(location = %host.location(), "dynamic grid starting");

        self.inject_style(host);
        self.start_retry(host);
        self.grid_watcher
            .start(host, &self.config.selectors, self.config.timings.observer_retry_ms);
        self.navigation.start(host);
        self.start_polling(host);
        for event in PageEvent::ALL {
            match host.listen(event) {
                Some(id) => self.listeners.push(id),
                None => debug!(event = event.dom_name(), "could not subscribe"),
            }
        }
    }

    /// Release everything. Idempotent; nothing fires afterwards.
    pub fn teardown<H: Host + ?Sized>(&mut self, host: &mut H) {
        if self.lifecycle == Lifecycle::TornDown {
            return;
        }
        self.grid_watcher.stop(host);
        self.navigation.stop(host);
        self.stop_polling(host);
        self.debounce.cancel(host);
        self.resize.cancel(host);
        self.retry.cancel(host);
        self.cancel_post_navigation(host);
        for id in self.listeners.drain(..) {
            host.unlisten(id);
        }
        self.style.release(host);
        self.lifecycle = Lifecycle::TornDown;
        info!("dynamic grid stopped");
    }

    /// Full reset after a client-side navigation: style, retry helper, grid
    /// watcher and polling start over, plus delayed forced updates.
    pub fn navigation_reset<H: Host + ?Sized>(&mut self, host: &mut H) {
        if !self.running() {
            return;
        }
        self.stats.resets += 1;
        info!(location = %self.navigation.last_location(), "navigation reset");
        self.style.release(host);
        self.inject_style(host);
        self.start_retry(host);
        self.grid_watcher
            .start(host, &self.config.selectors, self.config.timings.observer_retry_ms);
        self.start_polling(host);
        self.schedule_post_navigation(host);
    }

    // ---------- host callbacks -------------------------------------------

    pub fn on_timer<H: Host + ?Sized>(&mut self, host: &mut H, id: TimerId, task: Task) {
        if !self.running() {
            debug!(?task, "timer ignored, controller not running");
            return;
        }
        match task {
            Task::Debounce => {
                if self.debounce.fire(id) {
                    self.run_update(host, false);
                }
            }
            Task::Resize => {
                if self.resize.fire(id) {
                    self.run_update(host, false);
                }
            }
            Task::Retry { remaining } => {
                if self.retry.fire(id) {
                    self.retry_attempt(host, remaining);
                }
            }
            Task::ObserverRetry => {
                if self.grid_watcher.owns_retry(id) {
                    self.grid_watcher.start(
                        host,
                        &self.config.selectors,
                        self.config.timings.observer_retry_ms,
                    );
                }
            }
            Task::Poll => {
                if self.poll_timer == Some(id) {
                    self.poll_tick(host);
                }
            }
            Task::PostNavigation => {
                if let Some(pos) = self.post_navigation.iter().position(|t| *t == id) {
                    self.post_navigation.swap_remove(pos);
                    self.run_update(host, true);
                }
            }
        }
    }

    pub fn on_mutations<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        subscription: SubscriptionId,
        records: &[MutationRecord],
    ) {
        if !self.running() {
            return;
        }
        if self.navigation.owns(subscription) {
            if let Some(change) = self.navigation.check(host) {
                info!(from = %change.from, to = %change.to, "client-side navigation detected");
                self.navigation_reset(host);
            }
        } else if self.grid_watcher.owns(subscription) && batch_is_relevant(records) {
            self.request_update(host);
        }
    }

    /// `persisted` is `PageTransitionEvent.persisted` for `pagehide` and
    /// `pageshow`, false for everything else.
    pub fn on_event<H: Host + ?Sized>(&mut self, host: &mut H, event: PageEvent, persisted: bool) {
        if !self.running() {
            return;
        }
        debug!(event = event.dom_name(), persisted, "page event");
        match event {
            PageEvent::Resize => {
                self.resize
                    .replace(host, self.config.timings.resize_debounce_ms, Task::Resize);
            }
            PageEvent::Load | PageEvent::PopState | PageEvent::NavigateFinish => {
                self.navigation.check(host);
                self.navigation_reset(host);
            }
            // Entering the back/forward cache: the page may come back as is.
            PageEvent::PageHide if persisted => {}
            PageEvent::PageHide => self.teardown(host),
            PageEvent::PageShow if persisted => {
                info!("restored from back/forward cache");
                self.navigation.check(host);
                self.navigation_reset(host);
            }
            PageEvent::PageShow => {}
        }
    }

    // ---------- update path ----------------------------------------------

    /// Debounced update: only the last request inside the window runs.
    pub fn request_update<H: Host + ?Sized>(&mut self, host: &mut H) {
        if self.running() {
            self.debounce
                .replace(host, self.config.timings.debounce_ms, Task::Debounce);
        }
    }

    /// Measure and apply now if anything is out of date.
    pub fn update_now<H: Host + ?Sized>(&mut self, host: &mut H) -> UpdateOutcome {
        if !self.running() {
            return UpdateOutcome::Skipped;
        }
        self.run_update(host, false)
    }

    /// Measure and apply now, bypassing the change check.
    pub fn force_update<H: Host + ?Sized>(&mut self, host: &mut H) -> UpdateOutcome {
        if !self.running() {
            return UpdateOutcome::Skipped;
        }
        self.run_update(host, true)
    }

    fn run_update<H: Host + ?Sized>(&mut self, host: &mut H, force: bool) -> UpdateOutcome {
        let outcome = match self.try_update(host, force) {
            Ok(outcome) => outcome,
            Err(GridError::GridUnavailable) => {
                debug!("grid root not visible, update skipped");
                UpdateOutcome::Skipped
            }
            Err(err) => {
                warn!(%err, "grid update failed");
                UpdateOutcome::Failed
            }
        };
        self.stats.record(outcome);
        outcome
    }

    fn try_update<H: Host + ?Sized>(&mut self, host: &mut H, force: bool) -> Result<UpdateOutcome, GridError> {
        if !host.is_visible(&self.config.selectors.grid_root) {
            return Err(GridError::GridUnavailable);
        }
        let measurement = measure_width(host, &self.config.selectors);
        let columns = compute_columns(measurement.width, &self.config.layout);
        if !force && GridSnapshot::read(host, &self.config).is_synced(columns) {
            return Ok(UpdateOutcome::Unchanged(columns));
        }
        self.style.apply(host, &self.config, columns)?;
        debug!(
            columns = columns.get(),
            width = measurement.width,
            source = ?measurement.source,
            force,
            "grid columns applied"
        );
        Ok(UpdateOutcome::Applied(columns))
    }

    /// Style injection does not need the grid; the rules wait for it.
    fn inject_style<H: Host + ?Sized>(&mut self, host: &mut H) {
        let measurement = measure_width(host, &self.config.selectors);
        let columns = compute_columns(measurement.width, &self.config.layout);
        if let Err(err) = self.style.apply(host, &self.config, columns) {
            warn!(%err, "style injection failed");
            self.stats.failed += 1;
        }
    }

    // ---------- retry & polling ------------------------------------------

    fn start_retry<H: Host + ?Sized>(&mut self, host: &mut H) {
        self.retry.cancel(host);
        self.retry_attempt(host, self.config.timings.retry_attempts);
    }

    fn retry_attempt<H: Host + ?Sized>(&mut self, host: &mut H, remaining: u32) {
        if self.run_update(host, false) != UpdateOutcome::Skipped {
            return;
        }
        if remaining == 0 {
            debug!("grid never appeared, retry helper giving up");
            return;
        }
        self.retry.replace(
            host,
            self.config.timings.retry_interval_ms,
            Task::Retry {
                remaining: remaining - 1,
            },
        );
    }

    fn start_polling<H: Host + ?Sized>(&mut self, host: &mut H) {
        self.stop_polling(host);
        self.poll = PollState::start(host.now_ms());
        self.arm_poll_timer(host);
    }

    fn arm_poll_timer<H: Host + ?Sized>(&mut self, host: &mut H) {
        if let Some(id) = self.poll_timer.take() {
            host.clear_timer(id);
        }
        if let Some(phase) = self.poll.phase(&self.config.timings) {
            self.poll_timer = Some(host.set_interval(phase.period_ms, Task::Poll));
        }
    }

    fn stop_polling<H: Host + ?Sized>(&mut self, host: &mut H) {
        if let Some(id) = self.poll_timer.take() {
            host.clear_timer(id);
        }
        if self.poll.is_active() {
            self.poll = PollState::Stopped;
        }
    }

    fn poll_tick<H: Host + ?Sized>(&mut self, host: &mut H) {
        let observation = match self.run_update(host, false) {
            UpdateOutcome::Skipped => Observation::GridMissing,
            UpdateOutcome::Unchanged(_) => Observation::Unchanged,
            UpdateOutcome::Applied(_) | UpdateOutcome::Failed => Observation::Changed,
        };
        let (next, transition) = self.poll.step(host.now_ms(), observation, &self.config.timings);
        self.poll = next;
        match transition {
            PollTransition::Stay => {}
            PollTransition::EnterSlow => {
                debug!("grid poll entering slow phase");
                self.arm_poll_timer(host);
            }
            PollTransition::Finish => {
                if let Some(id) = self.poll_timer.take() {
                    host.clear_timer(id);
                }
                debug!("grid poll finished");
                self.run_update(host, true);
            }
        }
    }

    fn schedule_post_navigation<H: Host + ?Sized>(&mut self, host: &mut H) {
        self.cancel_post_navigation(host);
        for &delay in &self.config.timings.post_navigation_ms {
            self.post_navigation
                .push(host.set_timeout(delay, Task::PostNavigation));
        }
    }

    fn cancel_post_navigation<H: Host + ?Sized>(&mut self, host: &mut H) {
        for id in self.post_navigation.drain(..) {
            host.clear_timer(id);
        }
    }
}
