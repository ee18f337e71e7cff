//! Configuration structures for the classification pipeline.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{PipelineError, Result};
use crate::model::ModelSpec;
use crate::models::labels::{DEMO_CLASSES, LabelMode, LabelTable};

/// Main configuration for mlpipe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MlpipeConfig {
    /// Backend selection.
    pub runtime: RuntimeConfig,

    /// Image preprocessing.
    pub preprocessing: PreprocessingConfig,

    /// Network description.
    pub model: ModelSpec,

    /// Class names.
    pub labels: LabelConfig,
}

/// Backend selection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Backends to try, most preferred first.
    pub backends: Vec<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            backends: mlpipe_runtime::backend::available()
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Target tensor shape produced by preprocessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingConfig {
    pub height: usize,
    pub width: usize,

    /// 1 (luma), 3 (RGB) or 4 (RGBA).
    pub channels: usize,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            height: 224,
            width: 224,
            channels: 3,
        }
    }
}

impl PreprocessingConfig {
    /// Shape `[H, W, C]` without the batch axis.
    pub fn target_shape(&self) -> [usize; 3] {
        [self.height, self.width, self.channels]
    }
}

/// Label table configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    /// Class names in output order.
    pub names: Vec<String>,

    /// How indices past the end of `names` are named.
    pub mode: LabelMode,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            names: DEMO_CLASSES.iter().map(|s| s.to_string()).collect(),
            mode: LabelMode::Approximate,
        }
    }
}

impl LabelConfig {
    /// Build the lookup table.
    pub fn table(&self) -> LabelTable {
        LabelTable::new(self.names.iter().cloned(), self.mode)
    }
}

impl MlpipeConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check the parts of the configuration that serde cannot.
    pub fn validate(&self) -> Result<()> {
        if self.runtime.backends.is_empty() {
            return Err(PipelineError::Config(
                "runtime.backends must name at least one backend".to_string(),
            ));
        }

        let p = &self.preprocessing;
        if p.height == 0 || p.width == 0 {
            return Err(PipelineError::Config(format!(
                "preprocessing target must be positive, got {}x{}",
                p.height, p.width
            )));
        }
        if !matches!(p.channels, 1 | 3 | 4) {
            return Err(PipelineError::Config(format!(
                "preprocessing.channels must be 1, 3 or 4, got {}",
                p.channels
            )));
        }

        self.model.layer_shapes()?;
        if self.model.input_shape != p.target_shape() {
            return Err(PipelineError::Config(format!(
                "model.input_shape {:?} does not match preprocessing target {:?}",
                self.model.input_shape,
                p.target_shape()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_is_valid() {
        let config = MlpipeConfig::default();
        config.validate().unwrap();
        assert_eq!(config.runtime.backends.last().map(String::as_str), Some("cpu"));
        assert_eq!(config.labels.names.len(), 10);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: MlpipeConfig =
            serde_json::from_str(r#"{"preprocessing": {"height": 64}}"#).unwrap();
        assert_eq!(config.preprocessing.height, 64);
        assert_eq!(config.preprocessing.width, 224);
        assert_eq!(config.model, ModelSpec::image_classifier());
    }

    #[test]
    fn test_validate_rejects_mismatched_target() {
        let mut config = MlpipeConfig::default();
        config.preprocessing.height = 32;
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_channels() {
        let mut config = MlpipeConfig::default();
        config.preprocessing.channels = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = MlpipeConfig::default();
        config.runtime.backends = vec!["cpu".to_string()];
        config.labels.mode = LabelMode::Exact;
        config.save(&path).unwrap();

        let loaded = MlpipeConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_from_file_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            MlpipeConfig::from_file(&path),
            Err(PipelineError::Config(_))
        ));
    }
}
