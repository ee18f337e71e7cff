//! Built layers and their forward passes.

use mlpipe_runtime::{Tensor, TensorScope};
use rand::Rng;
use rand::distributions::Uniform;

use super::spec::Activation;
use crate::error::Result;

/// A layer with its parameter tensors resident in the pool.
#[derive(Debug, Clone)]
pub enum Layer {
    Dense {
        /// `[in, units]`.
        weights: Tensor,
        /// `[units]`.
        bias: Tensor,
        activation: Activation,
    },
    Flatten,
    GlobalAveragePool,
}

impl Layer {
    /// Build a dense layer with Glorot-uniform weights and zero bias.
    ///
    /// The parameters are tracked by `scope`; the caller keeps them once
    /// the whole model has been built.
    pub(crate) fn dense<R: Rng>(
        scope: &mut TensorScope<'_>,
        rng: &mut R,
        fan_in: usize,
        units: usize,
        activation: Activation,
    ) -> Result<Self> {
        let limit = (6.0 / (fan_in + units) as f32).sqrt();
        let dist = Uniform::new_inclusive(-limit, limit);
        let values: Vec<f32> = (0..fan_in * units).map(|_| rng.sample(dist)).collect();

        let weights = scope.from_f32(values, &[fan_in, units])?;
        let bias = scope.from_f32(vec![0.0; units], &[units])?;
        Ok(Self::Dense {
            weights,
            bias,
            activation,
        })
    }

    /// Parameter tensors owned by this layer.
    pub fn parameters(&self) -> Vec<&Tensor> {
        match self {
            Self::Dense { weights, bias, .. } => vec![weights, bias],
            Self::Flatten | Self::GlobalAveragePool => Vec::new(),
        }
    }

    /// Number of scalar parameters.
    pub fn parameter_count(&self) -> usize {
        self.parameters().iter().map(|t| t.numel()).sum()
    }

    /// Apply the layer. The output is tracked by `scope`; `x` is left alone.
    pub fn forward(&self, scope: &mut TensorScope<'_>, x: &Tensor) -> Result<Tensor> {
        match self {
            Self::Dense {
                weights,
                bias,
                activation,
            } => dense_forward(scope, x, weights, bias, *activation),
            Self::Flatten => {
                let rest: usize = x.shape()[1..].iter().product();
                Ok(scope.reshape(x, &[x.shape()[0], rest])?)
            }
            Self::GlobalAveragePool => Ok(scope.spatial_mean(x)?),
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Dense { .. } => "dense",
            Self::Flatten => "flatten",
            Self::GlobalAveragePool => "global_average_pool",
        }
    }
}

/// Dense over the last axis of an input of any rank.
fn dense_forward(
    scope: &mut TensorScope<'_>,
    x: &Tensor,
    weights: &Tensor,
    bias: &Tensor,
    activation: Activation,
) -> Result<Tensor> {
    let in_features = x.shape().last().copied().unwrap_or(0);
    let units = weights.shape()[1];
    let rows = x.numel() / in_features.max(1);

    let mut out_shape = x.shape().to_vec();
    if let Some(last) = out_shape.last_mut() {
        *last = units;
    }

    let flat = scope.reshape(x, &[rows, in_features])?;
    let product = scope.matmul(&flat, weights)?;
    scope.release(flat)?;
    let mut y = scope.add_bias(&product, bias)?;
    scope.release(product)?;

    let activated = match activation {
        Activation::Linear => None,
        Activation::Relu => Some(scope.relu(&y)?),
        Activation::Softmax => Some(scope.softmax(&y)?),
    };
    if let Some(activated) = activated {
        scope.release(y)?;
        y = activated;
    }

    if out_shape.len() == 2 {
        return Ok(y);
    }
    let restored = scope.reshape(&y, &out_shape)?;
    scope.release(y)?;
    Ok(restored)
}
