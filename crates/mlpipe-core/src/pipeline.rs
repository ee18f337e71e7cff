//! End-to-end classification: bytes in, ranked label out.

use image::DynamicImage;
use mlpipe_runtime::{ActiveBackend, BackendSelector, PoolStats, RuntimeContext};
use tracing::{error, info};

use crate::error::{PipelineError, Result};
use crate::model::Model;
use crate::models::{ClassificationResult, MlpipeConfig};
use crate::preprocessing::ImagePreprocessor;
use crate::runner::InferenceRunner;

/// Owns the runtime context, the model and the stages around it.
#[derive(Debug)]
pub struct ClassificationPipeline {
    ctx: RuntimeContext,
    backend: ActiveBackend,
    model: Option<Model>,
    preprocessor: ImagePreprocessor,
    runner: InferenceRunner,
    config: MlpipeConfig,
}

impl ClassificationPipeline {
    /// Validate `config` and initialize a backend from its preferred order.
    ///
    /// The model is not built until [`load_model`](Self::load_model).
    pub fn new(config: MlpipeConfig) -> Result<Self> {
        config.validate()?;

        let mut ctx = RuntimeContext::new();
        let backend = BackendSelector::from_names(&config.runtime.backends).initialize(&mut ctx)?;

        Ok(Self {
            ctx,
            backend,
            model: None,
            preprocessor: ImagePreprocessor::from_config(&config.preprocessing)?,
            runner: InferenceRunner::new(config.labels.table()),
            config,
        })
    }

    /// Build the model. Does nothing if one is already loaded.
    pub fn load_model(&mut self) -> Result<()> {
        if self.model.is_some() {
            return Ok(());
        }
        info!("Loading model on '{}'", self.backend.name);
        self.model = Some(Model::build(&mut self.ctx, &self.config.model)?);
        Ok(())
    }

    /// Dispose of the model, releasing its parameters.
    pub fn unload_model(&mut self) -> Result<()> {
        match self.model.take() {
            Some(model) => model.dispose(&mut self.ctx),
            None => Ok(()),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    pub fn model(&self) -> Option<&Model> {
        self.model.as_ref()
    }

    /// Decode and classify an encoded image.
    pub fn classify_bytes(&mut self, bytes: &[u8]) -> Result<ClassificationResult> {
        let model = self.model.as_ref().ok_or(PipelineError::ModelNotLoaded)?;
        let input = self.preprocessor.preprocess_bytes(&mut self.ctx, bytes)?;
        self.runner.run(&mut self.ctx, model, input)
    }

    /// Classify an already decoded image.
    pub fn classify_image(&mut self, image: &DynamicImage) -> Result<ClassificationResult> {
        let model = self.model.as_ref().ok_or(PipelineError::ModelNotLoaded)?;
        let input = self.preprocessor.preprocess(&mut self.ctx, image)?;
        self.runner.run(&mut self.ctx, model, input)
    }

    /// Backend selected at construction, with the candidates that failed.
    pub fn backend(&self) -> &ActiveBackend {
        &self.backend
    }

    /// Tensor pool counters.
    pub fn stats(&self) -> PoolStats {
        self.ctx.stats()
    }

    pub fn config(&self) -> &MlpipeConfig {
        &self.config
    }
}

impl Drop for ClassificationPipeline {
    fn drop(&mut self) {
        if let Err(e) = self.unload_model() {
            error!("Failed to dispose model: {}", e);
        }
    }
}
