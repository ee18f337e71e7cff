//! Image classification pipeline built on the mlpipe runtime.
//!
//! This crate provides:
//! - Image preprocessing into normalized `[1, H, W, C]` tensors
//! - Sequential models with seeded random parameters
//! - Single-pass inference with label decoding
//! - A classification pipeline tying the stages together
//! - An acceleration context manager with native-or-fallback creation

pub mod demo;
pub mod error;
pub mod mlcontext;
pub mod model;
pub mod models;
pub mod pipeline;
pub mod preprocessing;
pub mod runner;

pub use demo::{DemoOutcome, run_dense_demo};
pub use error::{PipelineError, Result};
pub use mlcontext::{
    AccelerationProvider, ContextSource, ContextState, HostAcceleration, HostContext,
    HostContextManager, MlContextManager, SoftwareEmulation,
};
pub use model::{Activation, LayerSpec, Model, ModelSpec};
pub use models::{
    ClassificationResult, LabelConfig, LabelMode, LabelTable, MlpipeConfig, PreprocessingConfig,
    RuntimeConfig,
};
pub use pipeline::ClassificationPipeline;
pub use preprocessing::ImagePreprocessor;
pub use runner::{InferenceRunner, decode};

/// Re-export runtime types.
pub use mlpipe_runtime::backend;
pub use mlpipe_runtime::{
    ActiveBackend, BackendSelector, ComputeBackend, PoolStats, RuntimeContext, RuntimeError,
    Tensor,
};
