//! Sequential models built from a [`ModelSpec`].
//!
//! A [`Model`] owns its parameter tensors outside of any scope. They stay
//! live until [`Model::dispose`] releases them.

pub mod layers;
pub mod spec;

pub use layers::Layer;
pub use spec::{Activation, LayerSpec, ModelSpec};

use mlpipe_runtime::{RuntimeContext, Tensor, TensorScope};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, error, info};

use crate::error::Result;

/// A built network with randomly initialized parameters.
#[derive(Debug)]
pub struct Model {
    spec: ModelSpec,
    layers: Vec<Layer>,
    num_classes: usize,
}

impl Model {
    /// Build a model on the context's active backend.
    ///
    /// Parameters are drawn from a generator seeded with `spec.seed`, so the
    /// same spec always yields the same weights. If building fails part-way
    /// every parameter created so far is released.
    pub fn build(ctx: &mut RuntimeContext, spec: &ModelSpec) -> Result<Self> {
        let shapes = spec.layer_shapes()?;
        let mut rng = StdRng::seed_from_u64(spec.seed);
        let mut scope = ctx.scope();

        let mut layers = Vec::with_capacity(spec.layers.len());
        let mut fan_in = spec.input_shape.last().copied().unwrap_or(0);
        for (layer_spec, shape) in spec.layers.iter().zip(&shapes) {
            let layer = match layer_spec {
                LayerSpec::Dense { units, activation } => {
                    Layer::dense(&mut scope, &mut rng, fan_in, *units, *activation)?
                }
                LayerSpec::Flatten => Layer::Flatten,
                LayerSpec::GlobalAveragePool => Layer::GlobalAveragePool,
            };
            debug!("Built {} layer, output {:?}", layer.kind(), shape);
            fan_in = shape.last().copied().unwrap_or(0);
            layers.push(layer);
        }

        for layer in &layers {
            for param in layer.parameters() {
                scope.keep(param.clone());
            }
        }

        let model = Self {
            spec: spec.clone(),
            layers,
            num_classes: fan_in,
        };
        info!(
            "Model built: {} layers, {} parameters, {} classes",
            model.layers.len(),
            model.parameter_count(),
            model.num_classes
        );
        Ok(model)
    }

    /// Wrap layers whose parameters are already resident in the pool.
    #[cfg(test)]
    pub(crate) fn from_layers(spec: ModelSpec, layers: Vec<Layer>) -> Result<Self> {
        let num_classes = spec.num_classes()?;
        Ok(Self {
            spec,
            layers,
            num_classes,
        })
    }

    /// Declared input shape, including the batch axis.
    pub fn input_shape(&self) -> Vec<usize> {
        self.spec.batched_input_shape()
    }

    /// Width of the output vector.
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// The spec this model was built from.
    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Total number of scalar parameters.
    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(Layer::parameter_count).sum()
    }

    /// Run every layer in order. Intermediates are released as soon as the
    /// next layer has consumed them; the output is tracked by `scope`.
    pub fn forward(&self, scope: &mut TensorScope<'_>, input: &Tensor) -> Result<Tensor> {
        let mut current: Option<Tensor> = None;
        for layer in &self.layers {
            let x = current.as_ref().unwrap_or(input);
            let y = layer.forward(scope, x)?;
            if let Some(previous) = current.replace(y) {
                scope.release(previous)?;
            }
        }
        // An empty layer list is rejected when building, so there is always
        // an output.
        match current {
            Some(output) => Ok(output),
            None => Ok(scope.reshape(input, input.shape())?),
        }
    }

    /// Release every parameter tensor.
    ///
    /// All parameters are attempted; the first failure is returned.
    pub fn dispose(self, ctx: &mut RuntimeContext) -> Result<()> {
        let mut first_error = None;
        for layer in self.layers {
            if let Layer::Dense { weights, bias, .. } = layer {
                for param in [weights, bias] {
                    if let Err(e) = ctx.release(param) {
                        error!("Failed to release model parameter: {}", e);
                        first_error.get_or_insert(e);
                    }
                }
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => {
                debug!("Model disposed");
                Ok(())
            }
        }
    }
}
