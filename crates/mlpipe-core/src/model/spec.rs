//! Declarative description of a sequential network.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Activation applied after a dense layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[default]
    Linear,
    Relu,
    Softmax,
}

/// One layer of a [`ModelSpec`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerSpec {
    /// Fully connected layer over the last axis.
    Dense {
        units: usize,
        #[serde(default)]
        activation: Activation,
    },
    /// Collapse every axis after the batch axis.
    Flatten,
    /// Average over the two spatial axes of `[N, H, W, C]`.
    GlobalAveragePool,
}

/// Sequential network description.
///
/// `input_shape` excludes the batch axis; built models always take a batch
/// of one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSpec {
    /// Input shape without the batch axis.
    pub input_shape: Vec<usize>,

    /// Layers in execution order.
    pub layers: Vec<LayerSpec>,

    /// Seed for parameter initialization.
    pub seed: u64,
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self::image_classifier()
    }
}

impl ModelSpec {
    /// Stand-in image classifier over `[224, 224, 3]` inputs with 1000
    /// softmax outputs.
    pub fn image_classifier() -> Self {
        Self {
            input_shape: vec![224, 224, 3],
            layers: vec![
                LayerSpec::Dense {
                    units: 32,
                    activation: Activation::Relu,
                },
                LayerSpec::GlobalAveragePool,
                LayerSpec::Dense {
                    units: 64,
                    activation: Activation::Relu,
                },
                LayerSpec::Dense {
                    units: 1000,
                    activation: Activation::Softmax,
                },
            ],
            seed: 42,
        }
    }

    /// Small `[10] -> 32 -> 16 -> 3` network used by the dense demo.
    pub fn dense_demo() -> Self {
        Self {
            input_shape: vec![10],
            layers: vec![
                LayerSpec::Dense {
                    units: 32,
                    activation: Activation::Relu,
                },
                LayerSpec::Dense {
                    units: 16,
                    activation: Activation::Relu,
                },
                LayerSpec::Dense {
                    units: 3,
                    activation: Activation::Softmax,
                },
            ],
            seed: 7,
        }
    }

    /// Input shape including the batch axis.
    pub fn batched_input_shape(&self) -> Vec<usize> {
        let mut shape = Vec::with_capacity(self.input_shape.len() + 1);
        shape.push(1);
        shape.extend_from_slice(&self.input_shape);
        shape
    }

    /// Walk the layers and return the shape after each one.
    ///
    /// # Errors
    /// Fails if a layer cannot accept the shape produced by its
    /// predecessor, or if the network does not end in `[1, classes]`.
    pub fn layer_shapes(&self) -> Result<Vec<Vec<usize>>> {
        if self.input_shape.is_empty() || self.input_shape.contains(&0) {
            return Err(PipelineError::Config(format!(
                "input shape must be non-empty and positive, got {:?}",
                self.input_shape
            )));
        }
        if self.layers.is_empty() {
            return Err(PipelineError::Config("model has no layers".to_string()));
        }

        let mut shape = self.batched_input_shape();
        let mut shapes = Vec::with_capacity(self.layers.len());

        for (i, layer) in self.layers.iter().enumerate() {
            shape = match layer {
                LayerSpec::Dense { units, activation } => {
                    if *units == 0 {
                        return Err(PipelineError::Config(format!("layer {}: zero units", i)));
                    }
                    if *activation == Activation::Softmax && shape.len() != 2 {
                        return Err(PipelineError::Config(format!(
                            "layer {}: softmax needs a rank-2 input, got {:?}",
                            i, shape
                        )));
                    }
                    let mut next = shape.clone();
                    if let Some(last) = next.last_mut() {
                        *last = *units;
                    }
                    next
                }
                LayerSpec::Flatten => vec![1, shape[1..].iter().product()],
                LayerSpec::GlobalAveragePool => {
                    if shape.len() != 4 {
                        return Err(PipelineError::Config(format!(
                            "layer {}: pooling needs a rank-4 input, got {:?}",
                            i, shape
                        )));
                    }
                    vec![shape[0], shape[3]]
                }
            };
            shapes.push(shape.clone());
        }

        if shape.len() != 2 {
            return Err(PipelineError::Config(format!(
                "model must end in [1, classes], ends in {:?}",
                shape
            )));
        }

        Ok(shapes)
    }

    /// Number of output classes.
    pub fn num_classes(&self) -> Result<usize> {
        let shapes = self.layer_shapes()?;
        Ok(shapes.last().map(|s| s[1]).unwrap_or(0))
    }
}
