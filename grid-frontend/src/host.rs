use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use gloo_timers::callback::{Interval, Timeout};
use grid_core::style::style_selector;
use grid_core::{
    GridController, Host, HostError, ListenerId, MutationKind, MutationRecord, ObserveOptions,
    ObserveTarget, PageEvent, SubscriptionId, Task, TimerId,
};
use js_sys::Array;
use tracing::warn;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    Document, Element, Event, EventTarget, MutationObserver, MutationObserverInit, Node, NodeList,
    PageTransitionEvent, Window,
};

/// Controller plus the host it drives, shared by every browser callback.
pub(crate) struct Runtime {
    pub host: WebHost,
    pub controller: GridController,
}

pub(crate) type SharedRuntime = Rc<RefCell<Runtime>>;

/// Enter the runtime from a browser callback. Callbacks never nest, so the
/// borrow only fails if the page calls back synchronously from inside one.
fn dispatch(runtime: &Weak<RefCell<Runtime>>, f: impl FnOnce(&mut WebHost, &mut GridController)) {
    let Some(runtime) = runtime.upgrade() else {
        return;
    };
    let Ok(mut guard) = runtime.try_borrow_mut() else {
        warn!("re-entrant callback dropped");
        return;
    };
    let Runtime { host, controller } = &mut *guard;
    host.sweep();
    f(host, controller);
}

fn js_error(err: JsValue) -> HostError {
    HostError::Dom(format!("{err:?}"))
}

fn is_rendered(el: &Element) -> bool {
    !el.has_attribute("hidden") && el.get_bounding_client_rect().width() > 0.0
}

struct Observer {
    observer: MutationObserver,
    _callback: Closure<dyn FnMut(Array, MutationObserver)>,
}

struct Listener {
    target: EventTarget,
    event: PageEvent,
    callback: Closure<dyn FnMut(Event)>,
}

/// Released callbacks that may still be on the stack; dropped on the next
/// entry into the runtime.
enum Retired {
    Timer(Closure<dyn FnMut()>),
    Observer(Observer),
    Listener(Closure<dyn FnMut(Event)>),
}

pub(crate) struct WebHost {
    window: Window,
    document: Document,
    grid_selector: String,
    runtime: Weak<RefCell<Runtime>>,
    next_id: u64,
    timeouts: HashMap<TimerId, Timeout>,
    intervals: HashMap<TimerId, Interval>,
    observers: HashMap<SubscriptionId, Observer>,
    listeners: HashMap<ListenerId, Listener>,
    retired: Vec<Retired>,
}

impl WebHost {
    pub fn new(
        window: Window,
        document: Document,
        grid_selector: String,
        runtime: Weak<RefCell<Runtime>>,
    ) -> Self {
        Self {
            window,
            document,
            grid_selector,
            runtime,
            next_id: 1,
            timeouts: HashMap::new(),
            intervals: HashMap::new(),
            observers: HashMap::new(),
            listeners: HashMap::new(),
            retired: Vec::new(),
        }
    }

    pub fn sweep(&mut self) {
        self.retired.clear();
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// First rendered match. YouTube keeps the grids of earlier pages in
    /// the DOM under hidden `ytd-browse` elements, ahead of the live one.
    fn query_visible(&self, selector: &str) -> Option<Element> {
        let matches = self.document.query_selector_all(selector).ok()?;
        (0..matches.length())
            .filter_map(|i| matches.item(i))
            .filter_map(|node| node.dyn_into::<Element>().ok())
            .find(is_rendered)
    }

    /// The rendered match when there is one, else the first in document order.
    fn query(&self, selector: &str) -> Option<Element> {
        self.query_visible(selector)
            .or_else(|| self.document.query_selector(selector).ok().flatten())
    }

    fn style_elements(&self, id: &str) -> Result<NodeList, HostError> {
        self.document
            .query_selector_all(&style_selector(id))
            .map_err(js_error)
    }

    /// A timeout fired; its closure is the one currently running.
    fn expire_timeout(&mut self, id: TimerId) {
        if let Some(timeout) = self.timeouts.remove(&id) {
            self.retired.push(Retired::Timer(timeout.cancel()));
        }
    }

    fn convert_records(&self, records: &Array) -> Vec<MutationRecord> {
        let grid: Option<Node> = self.query(&self.grid_selector).map(Node::from);
        records
            .iter()
            .filter_map(|value| value.dyn_into::<web_sys::MutationRecord>().ok())
            .map(|record| {
                let kind = if record.type_() == "attributes" {
                    MutationKind::Attributes
                } else {
                    MutationKind::ChildList
                };
                let touches_grid = match (&grid, record.target()) {
                    (Some(grid), Some(target)) => {
                        grid.is_same_node(Some(&target))
                            || grid.contains(Some(&target))
                            || target.contains(Some(grid))
                    }
                    _ => false,
                };
                MutationRecord {
                    kind,
                    attribute_name: record.attribute_name(),
                    added_nodes: record.added_nodes().length(),
                    touches_grid,
                }
            })
            .collect()
    }
}

impl Host for WebHost {
    fn now_ms(&self) -> f64 {
        self.window
            .performance()
            .map(|p| p.now())
            .unwrap_or_else(js_sys::Date::now)
    }

    fn location(&self) -> String {
        self.window.location().href().unwrap_or_default()
    }

    fn viewport_width(&self) -> f64 {
        self.window
            .inner_width()
            .ok()
            .and_then(|w| w.as_f64())
            .unwrap_or(0.0)
    }

    fn element_width(&self, selector: &str) -> Option<f64> {
        self.query(selector)
            .map(|el| el.get_bounding_client_rect().width())
    }

    fn exists(&self, selector: &str) -> bool {
        self.query(selector).is_some()
    }

    fn is_visible(&self, selector: &str) -> bool {
        self.query_visible(selector).is_some()
    }

    fn attribute(&self, selector: &str, name: &str) -> Option<String> {
        self.query(selector)?.get_attribute(name)
    }

    fn set_attribute(&mut self, selector: &str, name: &str, value: &str) -> Result<(), HostError> {
        let el = self
            .query(selector)
            .ok_or_else(|| HostError::MissingElement(selector.to_string()))?;
        el.set_attribute(name, value).map_err(js_error)
    }

    fn computed_property(&self, selector: &str, property: &str) -> Option<String> {
        let el = self.query(selector)?;
        let style = self.window.get_computed_style(&el).ok().flatten()?;
        let value = style.get_property_value(property).ok()?;
        let value = value.trim();
        (!value.is_empty()).then(|| value.to_string())
    }

    fn has_style(&self, id: &str) -> bool {
        self.style_elements(id).is_ok_and(|found| found.length() > 0)
    }

    fn upsert_style(&mut self, id: &str, css: &str, nonce: Option<&str>) -> Result<(), HostError> {
        let existing = self.style_elements(id)?;
        if let Some(first) = existing.item(0) {
            for i in 1..existing.length() {
                if let Some(extra) = existing.item(i) {
                    if let Some(parent) = extra.parent_node() {
                        parent.remove_child(&extra).map_err(js_error)?;
                    }
                }
            }
            first.set_text_content(Some(css));
            return Ok(());
        }

        let style = self.document.create_element("style").map_err(js_error)?;
        style.set_id(id);
        if let Some(nonce) = nonce {
            style.set_attribute("nonce", nonce).map_err(js_error)?;
        }
        style.set_text_content(Some(css));
        let parent: Node = match self.document.head() {
            Some(head) => head.into(),
            None => self
                .document
                .document_element()
                .ok_or_else(|| HostError::MissingElement("documentElement".into()))?
                .into(),
        };
        parent.append_child(&style).map_err(js_error)?;
        Ok(())
    }

    fn remove_style(&mut self, id: &str) {
        let found = match self.style_elements(id) {
            Ok(found) => found,
            Err(err) => {
                warn!(%err, "style lookup failed");
                return;
            }
        };
        for node in (0..found.length()).filter_map(|i| found.item(i)) {
            if let Some(parent) = node.parent_node() {
                if let Err(err) = parent.remove_child(&node) {
                    warn!(error = ?err, "style removal failed");
                }
            }
        }
    }

    fn set_timeout(&mut self, delay_ms: u32, task: Task) -> TimerId {
        let id = TimerId(self.alloc_id());
        let runtime = self.runtime.clone();
        let timeout = Timeout::new(delay_ms, move || {
            dispatch(&runtime, |host, controller| {
                host.expire_timeout(id);
                controller.on_timer(host, id, task);
            });
        });
        self.timeouts.insert(id, timeout);
        id
    }

    fn set_interval(&mut self, period_ms: u32, task: Task) -> TimerId {
        let id = TimerId(self.alloc_id());
        let runtime = self.runtime.clone();
        let interval = Interval::new(period_ms, move || {
            dispatch(&runtime, |host, controller| controller.on_timer(host, id, task));
        });
        self.intervals.insert(id, interval);
        id
    }

    fn clear_timer(&mut self, id: TimerId) {
        if let Some(timeout) = self.timeouts.remove(&id) {
            self.retired.push(Retired::Timer(timeout.cancel()));
        } else if let Some(interval) = self.intervals.remove(&id) {
            self.retired.push(Retired::Timer(interval.cancel()));
        }
    }

    fn observe(&mut self, target: &ObserveTarget, options: &ObserveOptions) -> Option<SubscriptionId> {
        let node: Node = match target {
            ObserveTarget::DocumentRoot => self.document.document_element()?.into(),
            ObserveTarget::Selector(selector) => self.query(selector)?.into(),
        };
        let id = SubscriptionId(self.alloc_id());
        let runtime = self.runtime.clone();
        let callback = Closure::<dyn FnMut(Array, MutationObserver)>::wrap(Box::new(
            move |records: Array, _observer: MutationObserver| {
                dispatch(&runtime, |host, controller| {
                    let batch = host.convert_records(&records);
                    controller.on_mutations(host, id, &batch);
                });
            },
        ));
        let observer = match MutationObserver::new(callback.as_ref().unchecked_ref()) {
            Ok(observer) => observer,
            Err(err) => {
                warn!(error = ?err, "MutationObserver unavailable");
                return None;
            }
        };

        let init = MutationObserverInit::new();
        init.set_child_list(options.child_list);
        init.set_subtree(options.subtree);
        if options.observes_attributes() {
            init.set_attributes(true);
            let filter: Array = options
                .attribute_filter
                .iter()
                .map(|name| JsValue::from_str(name))
                .collect();
            init.set_attribute_filter(&filter);
        }
        if let Err(err) = observer.observe_with_options(&node, &init) {
            warn!(error = ?err, ?target, "observe failed");
            return None;
        }
        self.observers.insert(
            id,
            Observer {
                observer,
                _callback: callback,
            },
        );
        Some(id)
    }

    fn disconnect(&mut self, id: SubscriptionId) {
        if let Some(entry) = self.observers.remove(&id) {
            entry.observer.disconnect();
            self.retired.push(Retired::Observer(entry));
        }
    }

    fn listen(&mut self, event: PageEvent) -> Option<ListenerId> {
        // YouTube dispatches its navigation events on the document.
        let target: EventTarget = match event {
            PageEvent::NavigateFinish => self.document.clone().into(),
            _ => self.window.clone().into(),
        };
        let id = ListenerId(self.alloc_id());
        let runtime = self.runtime.clone();
        let callback = Closure::<dyn FnMut(Event)>::wrap(Box::new(move |dom_event: Event| {
            let persisted = dom_event
                .dyn_ref::<PageTransitionEvent>()
                .is_some_and(PageTransitionEvent::persisted);
            dispatch(&runtime, |host, controller| {
                controller.on_event(host, event, persisted)
            });
        }));
        if let Err(err) = target
            .add_event_listener_with_callback(event.dom_name(), callback.as_ref().unchecked_ref())
        {
            warn!(error = ?err, event = event.dom_name(), "addEventListener failed");
            return None;
        }
        self.listeners.insert(
            id,
            Listener {
                target,
                event,
                callback,
            },
        );
        Some(id)
    }

    fn unlisten(&mut self, id: ListenerId) {
        if let Some(listener) = self.listeners.remove(&id) {
            if let Err(err) = listener.target.remove_event_listener_with_callback(
                listener.event.dom_name(),
                listener.callback.as_ref().unchecked_ref(),
            ) {
                warn!(error = ?err, event = listener.event.dom_name(), "removeEventListener failed");
            }
            self.retired.push(Retired::Listener(listener.callback));
        }
    }
}
