use tracing::debug;

use crate::config::Selectors;
use crate::debounce::TimerSlot;
use crate::host::{Host, MutationKind, MutationRecord, ObserveOptions, ObserveTarget, SubscriptionId, Task, TimerId};
use crate::style::MIRRORED_ATTRIBUTE;

pub const WATCHED_ATTRIBUTES: [&str; 4] = ["style", "class", "hidden", MIRRORED_ATTRIBUTE];

pub fn grid_observe_options() -> ObserveOptions {
    ObserveOptions {
        child_list: true,
        subtree: true,
        attribute_filter: WATCHED_ATTRIBUTES.iter().map(|a| a.to_string()).collect(),
    }
}

pub fn is_relevant(record: &MutationRecord) -> bool {
    if record.touches_grid || record.added_nodes > 0 {
        return true;
    }
    record.kind == MutationKind::Attributes
        && record
            .attribute_name
            .as_deref()
            .is_some_and(|name| WATCHED_ATTRIBUTES.contains(&name))
}

/// Stops at the first relevant record.
pub fn batch_is_relevant(records: &[MutationRecord]) -> bool {
    records.iter().any(is_relevant)
}

/// Where the grid subscription ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    Observing(ObserveTarget),
    Retrying,
}

/// Holds at most one grid subscription.
#[derive(Debug, Default)]
pub struct MutationWatcher {
    subscription: Option<SubscriptionId>,
    retry: TimerSlot,
}

impl MutationWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscription(&self) -> Option<SubscriptionId> {
        self.subscription
    }

    pub fn owns(&self, id: SubscriptionId) -> bool {
        self.subscription == Some(id)
    }

    pub fn owns_retry(&mut self, id: TimerId) -> bool {
        self.retry.fire(id)
    }

    /// Release any previous subscription, then observe the first available
    /// candidate container, falling back to the document root.
    pub fn start<H: Host + ?Sized>(&mut self, host: &mut H, selectors: &Selectors, retry_ms: u32) -> WatchOutcome {
        self.stop(host);
        let options = grid_observe_options();
        let targets = selectors
            .observer_candidates
            .iter()
            .map(|s| ObserveTarget::Selector(s.clone()))
            .chain(std::iter::once(ObserveTarget::DocumentRoot));
        for target in targets {
            if let Some(id) = host.observe(&target, &options) {
                debug!(?target, "grid mutation watcher attached");
                self.subscription = Some(id);
                return WatchOutcome::Observing(target);
            }
        }
        debug!(retry_ms, "no container to observe yet");
        self.retry.replace(host, retry_ms, Task::ObserverRetry);
        WatchOutcome::Retrying
    }

    pub fn stop<H: Host + ?Sized>(&mut self, host: &mut H) {
        self.retry.cancel(host);
        if let Some(id) = self.subscription.take() {
            host.disconnect(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeHost;

    #[test]
    fn relevance_rules() {
        assert!(is_relevant(&MutationRecord::child_list(0, true)));
        assert!(is_relevant(&MutationRecord::child_list(2, false)));
        assert!(!is_relevant(&MutationRecord::child_list(0, false)));
        assert!(is_relevant(&MutationRecord::attribute("hidden", false)));
        assert!(is_relevant(&MutationRecord::attribute(MIRRORED_ATTRIBUTE, false)));
        assert!(!is_relevant(&MutationRecord::attribute("aria-label", false)));
        assert!(is_relevant(&MutationRecord::attribute("aria-label", true)));
    }

    #[test]
    fn batch_relevance() {
        let quiet = vec![MutationRecord::child_list(0, false); 3];
        assert!(!batch_is_relevant(&quiet));
        let mut noisy = quiet.clone();
        noisy.push(MutationRecord::attribute("class", false));
        assert!(batch_is_relevant(&noisy));
    }

    #[test]
    fn falls_back_through_candidates() {
        let selectors = Selectors::default();
        let mut host = FakeHost::new();
        let mut watcher = MutationWatcher::new();
        assert_eq!(
            watcher.start(&mut host, &selectors, 500),
            WatchOutcome::Observing(ObserveTarget::DocumentRoot)
        );

        host.insert_element("ytd-page-manager", 1000.0);
        assert_eq!(
            watcher.start(&mut host, &selectors, 500),
            WatchOutcome::Observing(ObserveTarget::Selector("ytd-page-manager".into()))
        );
        assert_eq!(host.active_subscriptions(), 1);
    }

    #[test]
    fn retries_without_any_target() {
        let selectors = Selectors::default();
        let mut host = FakeHost::new();
        host.document_ready = false;
        let mut watcher = MutationWatcher::new();
        assert_eq!(watcher.start(&mut host, &selectors, 500), WatchOutcome::Retrying);
        assert_eq!(host.pending_timers(), 1);
        watcher.stop(&mut host);
        assert_eq!(host.pending_timers(), 0);
        assert!(watcher.subscription().is_none());
    }
}
