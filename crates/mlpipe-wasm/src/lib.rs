//! WASM bindings for mlpipe.
//!
//! Exposes the image classifier and the WebNN context manager to browsers.

mod webnn;

use wasm_bindgen::prelude::*;

use mlpipe_core::{ClassificationPipeline, MlpipeConfig, RuntimeContext};

pub use webnn::{NavigatorMl, PolyfillMl, WebNnDemo};

/// Initialize panic hook for better error messages in console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Version information.
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Compute backends compiled into this module.
#[wasm_bindgen]
pub fn available_backends() -> Vec<String> {
    mlpipe_core::backend::available()
        .into_iter()
        .map(String::from)
        .collect()
}

/// Run the dense network demo once and describe the prediction.
#[wasm_bindgen]
pub fn run_demo(seed: u32) -> Result<String, JsValue> {
    let mut ctx = RuntimeContext::new();
    mlpipe_core::BackendSelector::from_names(&mlpipe_core::backend::available())
        .initialize(&mut ctx)
        .map_err(to_js)?;
    let outcome = mlpipe_core::run_dense_demo(&mut ctx, u64::from(seed)).map_err(to_js)?;
    Ok(outcome.to_string())
}

/// Image classifier for browser use.
#[wasm_bindgen]
pub struct Classifier {
    pipeline: ClassificationPipeline,
}

#[wasm_bindgen]
impl Classifier {
    /// Create a classifier. `config` is an optional configuration object
    /// with the same layout as the JSON config file.
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<Classifier, JsValue> {
        let config: MlpipeConfig = if config.is_undefined() || config.is_null() {
            MlpipeConfig::default()
        } else {
            serde_wasm_bindgen::from_value(config)?
        };
        let pipeline = ClassificationPipeline::new(config).map_err(to_js)?;
        Ok(Self { pipeline })
    }

    /// Build the model. Calling it again is a no-op.
    #[wasm_bindgen]
    pub fn load_model(&mut self) -> Result<(), JsValue> {
        self.pipeline.load_model().map_err(to_js)
    }

    #[wasm_bindgen(getter)]
    pub fn loaded(&self) -> bool {
        self.pipeline.is_loaded()
    }

    /// Classify an encoded image (PNG, JPEG, ...).
    ///
    /// Resolves to `{ label, index, confidence }`.
    #[wasm_bindgen]
    pub fn classify(&mut self, bytes: &[u8]) -> Result<JsValue, JsValue> {
        let result = self.pipeline.classify_bytes(bytes).map_err(to_js)?;
        Ok(serde_wasm_bindgen::to_value(&result)?)
    }

    /// Classify and return the display string, e.g. `Dog (70.00% confidence)`.
    #[wasm_bindgen]
    pub fn describe(&mut self, bytes: &[u8]) -> Result<String, JsValue> {
        let result = self.pipeline.classify_bytes(bytes).map_err(to_js)?;
        Ok(result.to_string())
    }

    /// Name of the active compute backend.
    #[wasm_bindgen(getter)]
    pub fn backend(&self) -> String {
        self.pipeline.backend().name.clone()
    }

    /// Number of live tensors, for leak checks from JS.
    #[wasm_bindgen(getter)]
    pub fn live_tensors(&self) -> usize {
        self.pipeline.stats().live
    }

    /// Release the model's parameters.
    #[wasm_bindgen]
    pub fn unload(&mut self) -> Result<(), JsValue> {
        self.pipeline.unload_model().map_err(to_js)
    }
}

pub(crate) fn to_js(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}
