//! Error types for the mlpipe-core library.

use thiserror::Error;

use mlpipe_runtime::RuntimeError;

/// Main error type for the classification pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The payload could not be decoded into a pixel grid.
    #[error("unsupported image format: {0}")]
    UnsupportedImageFormat(String),

    /// The input tensor does not match the model's declared input shape.
    #[error("shape mismatch: model expects {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// A lower-level failure during the forward pass or result readback.
    #[error("inference failed: {0}")]
    Inference(#[source] RuntimeError),

    /// Classification was requested before a model was loaded.
    #[error("model not loaded")]
    ModelNotLoaded,

    /// ML context creation failed.
    #[error("context creation failed: {0}")]
    ContextFailed(String),

    /// The ML context manager was asked for a transition its state forbids.
    #[error("invalid context state: cannot {action} while {state}")]
    InvalidContextState { action: String, state: String },

    /// Runtime error outside of a forward pass (backend init, tensor lifecycle).
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for the mlpipe-core library.
pub type Result<T> = std::result::Result<T, PipelineError>;
