//! In-memory [`Host`] with a virtual clock, for driving the controller in
//! tests without a browser.

use std::collections::{BTreeMap, HashMap};

use crate::controller::GridController;
use crate::error::HostError;
use crate::host::{
    Host, ListenerId, MutationKind, MutationRecord, ObserveOptions, ObserveTarget, PageEvent,
    SubscriptionId, Task, TimerId,
};

#[derive(Debug, Clone, Default)]
pub struct FakeElement {
    pub width: f64,
    pub hidden: bool,
    pub attributes: BTreeMap<String, String>,
}

impl FakeElement {
    pub fn new(width: f64) -> Self {
        Self {
            width,
            ..Self::default()
        }
    }

    pub fn hidden(width: f64) -> Self {
        Self {
            width,
            hidden: true,
            ..Self::default()
        }
    }

    fn is_visible(&self) -> bool {
        !self.hidden && self.width > 0.0
    }
}

#[derive(Debug, Clone)]
pub struct FakeStyle {
    pub css: String,
    pub nonce: Option<String>,
}

#[derive(Debug, Clone, Copy)]
struct FakeTimer {
    due: f64,
    period: Option<u32>,
    task: Task,
}

pub struct FakeHost {
    now: f64,
    pub location: String,
    pub viewport_width: f64,
    /// When false the document root cannot be observed.
    pub document_ready: bool,
    pub fail_attribute_writes: bool,
    /// Every match per selector, in document order.
    elements: HashMap<String, Vec<FakeElement>>,
    styles: BTreeMap<String, FakeStyle>,
    next_id: u64,
    timers: BTreeMap<TimerId, FakeTimer>,
    subscriptions: BTreeMap<SubscriptionId, (ObserveTarget, ObserveOptions)>,
    listeners: BTreeMap<ListenerId, PageEvent>,
    observe_calls: u32,
    style_creations: u32,
    attribute_writes: u32,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            now: 0.0,
            location: "https://www.youtube.com/".into(),
            viewport_width: 1280.0,
            document_ready: true,
            fail_attribute_writes: false,
            elements: HashMap::new(),
            styles: BTreeMap::new(),
            next_id: 1,
            timers: BTreeMap::new(),
            subscriptions: BTreeMap::new(),
            listeners: BTreeMap::new(),
            observe_calls: 0,
            style_creations: 0,
            attribute_writes: 0,
        }
    }

    /// Page with the default grid root and content container at `width`.
    pub fn with_grid(width: f64) -> Self {
        let mut host = Self::new();
        host.viewport_width = width;
        host.insert_element("ytd-rich-grid-renderer", width);
        host.insert_element("ytd-rich-grid-renderer #contents", width);
        host
    }

    // ---------- page setup -----------------------------------------------

    /// Make `selector` match exactly one element.
    pub fn insert_element(&mut self, selector: &str, width: f64) {
        self.elements
            .insert(selector.to_string(), vec![FakeElement::new(width)]);
    }

    /// Add another match after the existing ones.
    pub fn append_element(&mut self, selector: &str, element: FakeElement) {
        self.elements
            .entry(selector.to_string())
            .or_default()
            .push(element);
    }

    pub fn remove_element(&mut self, selector: &str) {
        self.elements.remove(selector);
    }

    /// The match the host resolves: first visible, else first.
    pub fn element(&self, selector: &str) -> Option<&FakeElement> {
        let matches = self.elements.get(selector)?;
        matches
            .iter()
            .find(|el| el.is_visible())
            .or_else(|| matches.first())
    }

    pub fn element_at(&self, selector: &str, index: usize) -> Option<&FakeElement> {
        self.elements.get(selector)?.get(index)
    }

    fn element_mut(&mut self, selector: &str) -> Option<&mut FakeElement> {
        let matches = self.elements.get_mut(selector)?;
        let index = matches.iter().position(|el| el.is_visible()).unwrap_or(0);
        matches.get_mut(index)
    }

    pub fn set_width(&mut self, selector: &str, width: f64) {
        if let Some(el) = self.element_mut(selector) {
            el.width = width;
        }
    }

    pub fn set_hidden(&mut self, selector: &str, hidden: bool) {
        if let Some(el) = self.element_mut(selector) {
            el.hidden = hidden;
        }
    }

    /// Write an attribute as the page would (not counted, never fails).
    pub fn set_attr(&mut self, selector: &str, name: &str, value: &str) {
        if let Some(el) = self.element_mut(selector) {
            el.attributes.insert(name.to_string(), value.to_string());
        }
    }

    pub fn attr(&self, selector: &str, name: &str) -> Option<String> {
        self.element(selector)
            .and_then(|el| el.attributes.get(name).cloned())
    }

    // ---------- inspection -----------------------------------------------

    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn style(&self, id: &str) -> Option<&FakeStyle> {
        self.styles.get(id)
    }

    pub fn style_creations(&self) -> u32 {
        self.style_creations
    }

    pub fn attribute_writes(&self) -> u32 {
        self.attribute_writes
    }

    pub fn observe_calls(&self) -> u32 {
        self.observe_calls
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn pending_tasks(&self) -> Vec<Task> {
        self.timers.values().map(|t| t.task).collect()
    }

    pub fn active_subscriptions(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.subscriptions.contains_key(&id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    // ---------- driving the controller -----------------------------------

    /// Move the virtual clock forward, firing due timers in order.
    pub fn advance(&mut self, ms: f64, controller: &mut GridController) {
        let target = self.now + ms;
        loop {
            let next = self
                .timers
                .iter()
                .filter(|(_, t)| t.due <= target)
                .min_by(|a, b| a.1.due.total_cmp(&b.1.due).then(a.0.cmp(b.0)))
                .map(|(id, t)| (*id, *t));
            let Some((id, timer)) = next else { break };
            self.now = timer.due;
            match timer.period {
                Some(period) => {
                    if let Some(t) = self.timers.get_mut(&id) {
                        t.due += period as f64;
                    }
                }
                None => {
                    self.timers.remove(&id);
                }
            }
            controller.on_timer(self, id, timer.task);
        }
        self.now = target;
    }

    /// Deliver one batch to every live subscription interested in it.
    pub fn mutate(&mut self, records: Vec<MutationRecord>, controller: &mut GridController) {
        let targets: Vec<SubscriptionId> = self
            .subscriptions
            .iter()
            .filter(|(_, (_, options))| records.iter().any(|r| wants(options, r)))
            .map(|(id, _)| *id)
            .collect();
        for id in targets {
            let Some((_, options)) = self.subscriptions.get(&id) else {
                continue;
            };
            let batch: Vec<MutationRecord> =
                records.iter().filter(|r| wants(options, r)).cloned().collect();
            controller.on_mutations(self, id, &batch);
        }
    }

    pub fn fire_event(&mut self, event: PageEvent, controller: &mut GridController) {
        self.dispatch_event(event, false, controller);
    }

    /// `pagehide`/`pageshow` with `persisted` set, as around the back/forward cache.
    pub fn fire_cached_event(&mut self, event: PageEvent, controller: &mut GridController) {
        self.dispatch_event(event, true, controller);
    }

    fn dispatch_event(&mut self, event: PageEvent, persisted: bool, controller: &mut GridController) {
        if self.listeners.values().any(|e| *e == event) {
            controller.on_event(self, event, persisted);
        }
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

fn wants(options: &ObserveOptions, record: &MutationRecord) -> bool {
    match record.kind {
        MutationKind::ChildList => options.child_list,
        MutationKind::Attributes => record
            .attribute_name
            .as_ref()
            .is_some_and(|name| options.attribute_filter.contains(name)),
    }
}

/// Reads `property: N` out of the injected stylesheets, which is all the
/// computed-style lookup needs to model.
fn css_value(css: &str, property: &str) -> Option<String> {
    let needle = format!("{property}:");
    let start = css.find(&needle)? + needle.len();
    let value: String = css[start..]
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    (!value.is_empty()).then_some(value)
}

impl Host for FakeHost {
    fn now_ms(&self) -> f64 {
        self.now
    }

    fn location(&self) -> String {
        self.location.clone()
    }

    fn viewport_width(&self) -> f64 {
        self.viewport_width
    }

    fn element_width(&self, selector: &str) -> Option<f64> {
        self.element(selector).map(|el| el.width)
    }

    fn exists(&self, selector: &str) -> bool {
        self.elements.contains_key(selector)
    }

    fn is_visible(&self, selector: &str) -> bool {
        self.element(selector).is_some_and(FakeElement::is_visible)
    }

    fn attribute(&self, selector: &str, name: &str) -> Option<String> {
        self.attr(selector, name)
    }

    fn set_attribute(&mut self, selector: &str, name: &str, value: &str) -> Result<(), HostError> {
        if self.fail_attribute_writes {
            return Err(HostError::Dom("attribute write rejected".into()));
        }
        let el = self
            .element_mut(selector)
            .ok_or_else(|| HostError::MissingElement(selector.to_string()))?;
        el.attributes.insert(name.to_string(), value.to_string());
        self.attribute_writes += 1;
        Ok(())
    }

    fn computed_property(&self, selector: &str, property: &str) -> Option<String> {
        if !self.elements.contains_key(selector) {
            return None;
        }
        self.styles
            .values()
            .find_map(|style| css_value(&style.css, property))
    }

    fn has_style(&self, id: &str) -> bool {
        self.styles.contains_key(id)
    }

    fn upsert_style(&mut self, id: &str, css: &str, nonce: Option<&str>) -> Result<(), HostError> {
        match self.styles.get_mut(id) {
            Some(style) => style.css = css.to_string(),
            None => {
                self.style_creations += 1;
                self.styles.insert(
                    id.to_string(),
                    FakeStyle {
                        css: css.to_string(),
                        nonce: nonce.map(str::to_string),
                    },
                );
            }
        }
        Ok(())
    }

    fn remove_style(&mut self, id: &str) {
        self.styles.remove(id);
    }

    fn set_timeout(&mut self, delay_ms: u32, task: Task) -> TimerId {
        let id = TimerId(self.alloc_id());
        self.timers.insert(
            id,
            FakeTimer {
                due: self.now + delay_ms as f64,
                period: None,
                task,
            },
        );
        id
    }

    fn set_interval(&mut self, period_ms: u32, task: Task) -> TimerId {
        let id = TimerId(self.alloc_id());
        self.timers.insert(
            id,
            FakeTimer {
                due: self.now + period_ms as f64,
                period: Some(period_ms.max(1)),
                task,
            },
        );
        id
    }

    fn clear_timer(&mut self, id: TimerId) {
        self.timers.remove(&id);
    }

    fn observe(&mut self, target: &ObserveTarget, options: &ObserveOptions) -> Option<SubscriptionId> {
        let available = match target {
            ObserveTarget::DocumentRoot => self.document_ready,
            ObserveTarget::Selector(sel) => self.elements.contains_key(sel),
        };
        if !available {
            return None;
        }
        self.observe_calls += 1;
        let id = SubscriptionId(self.alloc_id());
        self.subscriptions
            .insert(id, (target.clone(), options.clone()));
        Some(id)
    }

    fn disconnect(&mut self, id: SubscriptionId) {
        self.subscriptions.remove(&id);
    }

    fn listen(&mut self, event: PageEvent) -> Option<ListenerId> {
        let id = ListenerId(self.alloc_id());
        self.listeners.insert(id, event);
        Some(id)
    }

    fn unlisten(&mut self, id: ListenerId) {
        self.listeners.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn css_value_reads_custom_property() {
        let css = "x {\n  --ytd-rich-grid-items-per-row: 7 !important;\n}";
        assert_eq!(
            css_value(css, "--ytd-rich-grid-items-per-row").as_deref(),
            Some("7")
        );
        assert_eq!(css_value(css, "--other"), None);
    }
}
