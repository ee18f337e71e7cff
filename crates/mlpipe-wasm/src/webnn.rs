//! WebNN context management through `navigator.ml` or a polyfill.

use std::cell::RefCell;
use std::rc::Rc;

use js_sys::{Function, Promise, Reflect};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{JsFuture, future_to_promise};

use mlpipe_core::{AccelerationProvider, ContextState, MlContextManager};

use crate::to_js;

/// Call `ml.createContext()` and await the returned promise.
async fn create_ml_context(ml: &JsValue) -> Result<JsValue, String> {
    let create = Reflect::get(ml, &JsValue::from_str("createContext"))
        .map_err(describe)?
        .dyn_into::<Function>()
        .map_err(|_| "createContext is not a function".to_string())?;
    let promise = create
        .call0(ml)
        .map_err(describe)?
        .dyn_into::<Promise>()
        .map_err(|_| "createContext did not return a promise".to_string())?;
    JsFuture::from(promise).await.map_err(describe)
}

fn describe(value: JsValue) -> String {
    if let Some(err) = value.dyn_ref::<js_sys::Error>() {
        return String::from(err.message());
    }
    value
        .as_string()
        .unwrap_or_else(|| "unknown JavaScript error".to_string())
}

/// `navigator.ml` from the global scope (window or worker).
#[derive(Debug, Default)]
pub struct NavigatorMl;

impl NavigatorMl {
    fn entry_point() -> Option<JsValue> {
        let navigator = Reflect::get(&js_sys::global(), &JsValue::from_str("navigator")).ok()?;
        if navigator.is_undefined() {
            return None;
        }
        let ml = Reflect::get(&navigator, &JsValue::from_str("ml")).ok()?;
        (!ml.is_undefined() && !ml.is_null()).then_some(ml)
    }
}

impl AccelerationProvider for NavigatorMl {
    type Context = JsValue;

    fn name(&self) -> &str {
        "navigator.ml"
    }

    fn is_available(&self) -> bool {
        Self::entry_point().is_some()
    }

    async fn create_context(&self) -> Result<JsValue, String> {
        let ml = Self::entry_point().ok_or_else(|| "WebNN not available".to_string())?;
        create_ml_context(&ml).await
    }
}

/// A polyfill's `ml` object handed in from JavaScript.
#[derive(Debug)]
pub struct PolyfillMl {
    ml: JsValue,
}

impl PolyfillMl {
    pub fn new(ml: JsValue) -> Self {
        Self { ml }
    }
}

impl AccelerationProvider for PolyfillMl {
    type Context = JsValue;

    fn name(&self) -> &str {
        "webnn-polyfill"
    }

    fn is_available(&self) -> bool {
        !self.ml.is_undefined() && !self.ml.is_null()
    }

    async fn create_context(&self) -> Result<JsValue, String> {
        if !self.is_available() {
            return Err("WebNN not available".to_string());
        }
        create_ml_context(&self.ml).await
    }
}

type Manager = MlContextManager<NavigatorMl, PolyfillMl>;

/// Browser-facing WebNN demo: probe, load a polyfill, create a context,
/// run a no-op computation.
#[wasm_bindgen]
pub struct WebNnDemo {
    manager: Rc<RefCell<Manager>>,
}

#[wasm_bindgen]
impl WebNnDemo {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self {
            manager: Rc::new(RefCell::new(Manager::new(NavigatorMl))),
        }
    }

    /// Check for native WebNN. Returns true if `navigator.ml` exists.
    #[wasm_bindgen]
    pub fn probe(&self) -> Result<bool, JsValue> {
        let mut manager = self.borrow_mut()?;
        let supported = *manager.probe() == ContextState::Supported;
        log_status(&manager);
        Ok(supported)
    }

    /// Register a polyfill's `ml` object as the fallback layer.
    #[wasm_bindgen]
    pub fn load_polyfill(&self, ml: JsValue) -> Result<(), JsValue> {
        let mut manager = self.borrow_mut()?;
        manager.load_fallback(PolyfillMl::new(ml));
        log_status(&manager);
        Ok(())
    }

    /// Create the context. Resolves to the `MLContext` object.
    #[wasm_bindgen]
    #[allow(clippy::await_holding_refcell_ref)]
    pub fn create_context(&self) -> Promise {
        let manager = Rc::clone(&self.manager);
        future_to_promise(async move {
            // A second call while this one is pending is rejected here
            // instead of waiting on the first.
            let mut manager = manager
                .try_borrow_mut()
                .map_err(|_| JsValue::from_str("context creation already in progress"))?;
            let created = manager.create_context().await.map(Clone::clone);
            log_status(&manager);
            created.map_err(to_js)
        })
    }

    /// Confirm the context is ready. Performs no computation.
    #[wasm_bindgen]
    pub fn run(&self) -> Result<String, JsValue> {
        let manager = self.borrow()?;
        manager.run_noop().map_err(to_js)?;
        let message = "WebML computation completed successfully".to_string();
        web_sys::console::log_1(&JsValue::from_str(&message));
        Ok(message)
    }

    /// Current state, e.g. `unsupported` or `context ready`.
    #[wasm_bindgen]
    pub fn state(&self) -> Result<String, JsValue> {
        Ok(self.borrow()?.state().to_string())
    }

    /// Human-readable status line.
    #[wasm_bindgen]
    pub fn status(&self) -> Result<String, JsValue> {
        Ok(self.borrow()?.status())
    }

    fn borrow(&self) -> Result<std::cell::Ref<'_, Manager>, JsValue> {
        self.manager
            .try_borrow()
            .map_err(|_| JsValue::from_str("context creation in progress"))
    }

    fn borrow_mut(&self) -> Result<std::cell::RefMut<'_, Manager>, JsValue> {
        self.manager
            .try_borrow_mut()
            .map_err(|_| JsValue::from_str("context creation in progress"))
    }
}

fn log_status(manager: &Manager) {
    web_sys::console::log_1(&JsValue::from_str(&manager.status()));
}

impl Default for WebNnDemo {
    fn default() -> Self {
        Self::new()
    }
}
