use tracing::debug;

use crate::host::{Host, ObserveOptions, ObserveTarget, SubscriptionId};

/// Location change seen by [`NavigationWatcher::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationChange {
    pub from: String,
    pub to: String,
}

/// Detects client-side navigation by comparing the location on every
/// structural mutation of the document.
#[derive(Debug, Default)]
pub struct NavigationWatcher {
    last_location: String,
    subscription: Option<SubscriptionId>,
}

impl NavigationWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_location(&self) -> &str {
        &self.last_location
    }

    pub fn owns(&self, id: SubscriptionId) -> bool {
        self.subscription == Some(id)
    }

    pub fn start<H: Host + ?Sized>(&mut self, host: &mut H) {
        self.stop(host);
        self.last_location = host.location();
        let options = ObserveOptions {
            child_list: true,
            subtree: true,
            attribute_filter: Vec::new(),
        };
        self.subscription = host.observe(&ObserveTarget::DocumentRoot, &options);
        if self.subscription.is_none() {
            debug!("document root unavailable; relying on history events");
        }
    }

    /// Record the current location, returning the change if it moved.
    pub fn check<H: Host + ?Sized>(&mut self, host: &H) -> Option<NavigationChange> {
        let current = host.location();
        if current == self.last_location {
            return None;
        }
        let from = std::mem::replace(&mut self.last_location, current.clone());
        Some(NavigationChange { from, to: current })
    }

    pub fn stop<H: Host + ?Sized>(&mut self, host: &mut H) {
        if let Some(id) = self.subscription.take() {
            host.disconnect(id);
        }
    }
}
