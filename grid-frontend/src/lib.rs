//! Browser entry point: builds a [`grid_core::GridController`] over the live
//! DOM when the module loads and exposes a small `DynamicGrid` handle to
//! page scripts.

#[cfg(target_arch = "wasm32")]
mod host;
#[cfg(target_arch = "wasm32")]
mod logging;

#[cfg(target_arch = "wasm32")]
use std::cell::RefCell;
#[cfg(target_arch = "wasm32")]
use std::rc::Rc;

#[cfg(target_arch = "wasm32")]
use grid_core::config::CONFIG_GLOBAL;
#[cfg(target_arch = "wasm32")]
use grid_core::{GridConfig, GridController, UpdateOutcome};
#[cfg(target_arch = "wasm32")]
use js_sys::Reflect;
#[cfg(target_arch = "wasm32")]
use tracing::{info, warn};
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
use crate::host::{Runtime, SharedRuntime, WebHost};

#[cfg(target_arch = "wasm32")]
thread_local! {
    static ACTIVE: RefCell<Option<SharedRuntime>> = const { RefCell::new(None) };
}

/// Reads a page global as JSON text. Objects are stringified so a plain
/// `window.DYNAMIC_GRID_CONFIG = {...}` works as well as a string.
#[cfg(target_arch = "wasm32")]
fn read_global(key: &str) -> Option<String> {
    let value = Reflect::get(&js_sys::global(), &JsValue::from_str(key)).ok()?;
    if value.is_undefined() || value.is_null() {
        return None;
    }
    value.as_string().or_else(|| {
        js_sys::JSON::stringify(&value)
            .ok()
            .map(String::from)
    })
}

#[cfg(target_arch = "wasm32")]
fn location_search() -> String {
    web_sys::window()
        .and_then(|w| w.location().search().ok())
        .unwrap_or_default()
}

#[cfg(target_arch = "wasm32")]
fn launch(config: GridConfig) -> Result<SharedRuntime, JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
    let document = window
        .document()
        .ok_or_else(|| JsValue::from_str("no document"))?;
    let grid_selector = config.selectors.grid_root.clone();

    let runtime = Rc::new_cyclic(|weak| {
        RefCell::new(Runtime {
            host: WebHost::new(window, document, grid_selector, weak.clone()),
            controller: GridController::new(config),
        })
    });
    {
        let mut guard = runtime.borrow_mut();
        let Runtime { host, controller } = &mut *guard;
        controller.start(host);
        info!(columns = ?controller.columns().map(|c| c.get()), "dynamic grid running");
    }
    Ok(runtime)
}

#[cfg(target_arch = "wasm32")]
fn stop_runtime(runtime: &SharedRuntime) {
    match runtime.try_borrow_mut() {
        Ok(mut guard) => {
            let Runtime { host, controller } = &mut *guard;
            host.sweep();
            controller.teardown(host);
        }
        Err(_) => warn!("stop requested while the grid is busy"),
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn boot() {
    console_error_panic_hook::set_once();

    let query = location_search();
    let (config, config_error) =
        match GridConfig::from_sources(read_global(CONFIG_GLOBAL).as_deref(), &query) {
            Ok(config) => (config, None),
            Err(err) => (GridConfig::default().with_query(&query), Some(err)),
        };
    logging::init_logging(config.debug);
    if let Some(err) = config_error {
        warn!(%err, "ignoring {}", CONFIG_GLOBAL);
    }

    match launch(config) {
        Ok(runtime) => {
            let previous = ACTIVE.with(|slot| slot.replace(Some(runtime)));
            if let Some(previous) = previous {
                stop_runtime(&previous);
            }
        }
        Err(err) => {
            web_sys::console::error_1(&err);
            warn!(error = ?err, "dynamic grid failed to start");
        }
    }
}

/// Handle on the running grid for page scripts and the devtools console.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub struct DynamicGrid {
    runtime: SharedRuntime,
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
impl DynamicGrid {
    /// The instance started at load, if any.
    pub fn current() -> Option<DynamicGrid> {
        ACTIVE
            .with(|slot| slot.borrow().clone())
            .map(|runtime| DynamicGrid { runtime })
    }

    pub fn columns(&self) -> Option<u32> {
        let guard = self.runtime.try_borrow().ok()?;
        guard.controller.columns().map(|c| c.get())
    }

    #[wasm_bindgen(js_name = isRunning)]
    pub fn is_running(&self) -> bool {
        self.runtime
            .try_borrow()
            .map(|guard| guard.controller.lifecycle() == grid_core::Lifecycle::Running)
            .unwrap_or(false)
    }

    /// Recompute and rewrite the override now, ignoring the debounce.
    pub fn refresh(&self) -> Option<u32> {
        let mut guard = self.runtime.try_borrow_mut().ok()?;
        let Runtime { host, controller } = &mut *guard;
        host.sweep();
        match controller.force_update(host) {
            UpdateOutcome::Applied(columns) | UpdateOutcome::Unchanged(columns) => {
                Some(columns.get())
            }
            UpdateOutcome::Skipped | UpdateOutcome::Failed => None,
        }
    }

    /// Tear everything down and remove the injected style.
    pub fn stop(&self) {
        stop_runtime(&self.runtime);
        ACTIVE.with(|slot| {
            let mut slot = slot.borrow_mut();
            if slot
                .as_ref()
                .is_some_and(|active| Rc::ptr_eq(active, &self.runtime))
            {
                *slot = None;
            }
        });
    }
}
