//! Data models: configuration, labels and classification results.

pub mod config;
pub mod labels;
pub mod result;

pub use config::{LabelConfig, MlpipeConfig, PreprocessingConfig, RuntimeConfig};
pub use labels::{DEMO_CLASSES, LabelMode, LabelTable};
pub use result::ClassificationResult;
