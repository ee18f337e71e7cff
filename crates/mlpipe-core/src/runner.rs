//! Single forward pass and output decoding.

use mlpipe_runtime::{RuntimeContext, Tensor};
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::model::Model;
use crate::models::{ClassificationResult, LabelTable};

/// Runs a model over one preprocessed input and decodes the top class.
#[derive(Debug, Clone, Default)]
pub struct InferenceRunner {
    labels: LabelTable,
}

impl InferenceRunner {
    pub fn new(labels: LabelTable) -> Self {
        Self { labels }
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    /// Classify `input`, consuming it.
    ///
    /// The input and every tensor produced by the forward pass are released
    /// before this returns, whether it succeeds or not. An input whose shape
    /// differs from the model's declared input shape is rejected before any
    /// computation runs.
    pub fn run(
        &self,
        ctx: &mut RuntimeContext,
        model: &Model,
        input: Tensor,
    ) -> Result<ClassificationResult> {
        let mut scope = ctx.scope();
        let input = scope.track(input).map_err(PipelineError::Inference)?;

        let expected = model.input_shape();
        if input.shape() != expected.as_slice() {
            return Err(PipelineError::ShapeMismatch {
                expected,
                actual: input.shape().to_vec(),
            });
        }

        let output = model.forward(&mut scope, &input).map_err(into_inference)?;
        scope.release(input).map_err(PipelineError::Inference)?;

        let n = model.num_classes();
        if output.shape() != [1, n] {
            return Err(PipelineError::ShapeMismatch {
                expected: vec![1, n],
                actual: output.shape().to_vec(),
            });
        }

        let values = scope.read_f32(&output).map_err(PipelineError::Inference)?;
        let result = decode(&values, &self.labels).ok_or_else(|| {
            PipelineError::ShapeMismatch {
                expected: vec![1, n],
                actual: output.shape().to_vec(),
            }
        })?;
        debug!("Top class {} at index {}", result.label, result.index);
        Ok(result)
    }
}

/// Pick the largest value and name it.
///
/// Ties go to the lowest index. The value itself is reported as the
/// confidence; no normalization is applied. Returns `None` for an empty
/// vector.
pub fn decode(values: &[f32], labels: &LabelTable) -> Option<ClassificationResult> {
    let (first, rest) = values.split_first()?;
    let (mut index, mut confidence) = (0, *first);
    for (i, v) in rest.iter().enumerate() {
        if *v > confidence {
            index = i + 1;
            confidence = *v;
        }
    }
    Some(ClassificationResult {
        label: labels.label(index),
        index,
        confidence,
    })
}

fn into_inference(err: PipelineError) -> PipelineError {
    match err {
        PipelineError::Runtime(e) => PipelineError::Inference(e),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Activation, Layer, LayerSpec, ModelSpec};
    use crate::models::LabelMode;
    use approx::assert_relative_eq;
    use mlpipe_runtime::CpuBackend;
    use pretty_assertions::assert_eq;

    fn ctx() -> RuntimeContext {
        RuntimeContext::with_backend(Box::new(CpuBackend)).unwrap()
    }

    #[test]
    fn test_decode_picks_max() {
        let labels = LabelTable::new(["x", "y", "z"], LabelMode::Exact);
        let result = decode(&[0.2, 0.7, 0.1], &labels).unwrap();
        assert_eq!(result.label, "y");
        assert_eq!(result.index, 1);
        assert_relative_eq!(result.confidence, 0.7);
    }

    /// `[3] -> dense(3, linear)` with identity weights, so a zero input
    /// yields exactly `bias`.
    fn bias_model(ctx: &mut RuntimeContext, bias: Vec<f32>) -> Model {
        let spec = ModelSpec {
            input_shape: vec![3],
            layers: vec![LayerSpec::Dense {
                units: 3,
                activation: Activation::Linear,
            }],
            seed: 0,
        };
        let mut scope = ctx.scope();
        let weights = scope
            .from_f32(vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0], &[3, 3])
            .unwrap();
        let bias = scope.from_f32(bias, &[3]).unwrap();
        let layer = Layer::Dense {
            weights: scope.keep(weights),
            bias: scope.keep(bias),
            activation: Activation::Linear,
        };
        drop(scope);
        Model::from_layers(spec, vec![layer]).unwrap()
    }

    fn zeros(ctx: &mut RuntimeContext, shape: &[usize]) -> Tensor {
        let mut scope = ctx.scope();
        let t = scope
            .from_f32(vec![0.0; shape.iter().product()], shape)
            .unwrap();
        scope.keep(t)
    }

    #[test]
    fn test_run_names_largest_output() {
        let mut ctx = ctx();
        let model = bias_model(&mut ctx, vec![0.2, 0.7, 0.1]);
        let runner = InferenceRunner::new(LabelTable::new(["x", "y", "z"], LabelMode::Exact));
        let live_before = ctx.stats().live;

        let input = zeros(&mut ctx, &[1, 3]);
        let result = runner.run(&mut ctx, &model, input).unwrap();

        assert_eq!(result.label, "y");
        assert_eq!(result.index, 1);
        assert_relative_eq!(result.confidence, 0.7, epsilon = 1e-6);
        assert_eq!(ctx.stats().live, live_before);

        model.dispose(&mut ctx).unwrap();
    }

    #[test]
    fn test_input_from_other_context_is_rejected() {
        let mut ours = ctx();
        let mut theirs = ctx();
        let model = bias_model(&mut ours, vec![0.2, 0.7, 0.1]);
        let foreign = zeros(&mut theirs, &[1, 3]);
        let live_before = ours.stats().live;

        let err = InferenceRunner::default()
            .run(&mut ours, &model, foreign.clone())
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Inference(mlpipe_runtime::RuntimeError::UnknownTensor(_))
        ));
        assert_eq!(ours.stats().live, live_before);
        assert!(theirs.is_live(&foreign));

        model.dispose(&mut ours).unwrap();
        theirs.release(foreign).unwrap();
    }

    #[test]
    fn test_decode_ties_go_to_lowest_index() {
        let labels = LabelTable::unnamed();
        let result = decode(&[0.4, 0.1, 0.4, 0.4], &labels).unwrap();
        assert_eq!(result.index, 0);
        assert_eq!(result.label, "class 0");
    }

    #[test]
    fn test_decode_empty() {
        assert!(decode(&[], &LabelTable::demo()).is_none());
    }

    #[test]
    fn test_run_leaves_no_new_tensors() {
        let mut ctx = ctx();
        let model = Model::build(&mut ctx, &ModelSpec::dense_demo()).unwrap();
        let runner = InferenceRunner::new(LabelTable::unnamed());
        let live_before = ctx.stats().live;

        let input = {
            let mut scope = ctx.scope();
            let t = scope.from_f32(vec![0.1; 10], &[1, 10]).unwrap();
            scope.keep(t)
        };

        let result = runner.run(&mut ctx, &model, input).unwrap();
        assert!(result.index < 3);
        assert!(result.label.starts_with("class "));
        assert_eq!(ctx.stats().live, live_before);

        model.dispose(&mut ctx).unwrap();
    }

    #[test]
    fn test_shape_mismatch_runs_nothing() {
        let mut ctx = ctx();
        let model = Model::build(&mut ctx, &ModelSpec::image_classifier()).unwrap();
        let runner = InferenceRunner::default();

        let input = {
            let mut scope = ctx.scope();
            let t = scope.from_f32(vec![0.0; 300], &[1, 10, 10, 3]).unwrap();
            scope.keep(t)
        };
        let allocated_before = ctx.stats().allocated;
        let live_before = ctx.stats().live;

        let err = runner.run(&mut ctx, &model, input).unwrap_err();
        match err {
            PipelineError::ShapeMismatch { expected, actual } => {
                assert_eq!(expected, vec![1, 224, 224, 3]);
                assert_eq!(actual, vec![1, 10, 10, 3]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(ctx.stats().allocated, allocated_before);
        assert_eq!(ctx.stats().live, live_before - 1);

        model.dispose(&mut ctx).unwrap();
    }

    #[test]
    fn test_released_input_is_inference_error() {
        let mut ctx = ctx();
        let model = Model::build(&mut ctx, &ModelSpec::dense_demo()).unwrap();
        let input = {
            let mut scope = ctx.scope();
            let t = scope.from_f32(vec![0.0; 10], &[1, 10]).unwrap();
            scope.keep(t)
        };
        ctx.release(input.clone()).unwrap();

        let err = InferenceRunner::default()
            .run(&mut ctx, &model, input)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Inference(_)));

        model.dispose(&mut ctx).unwrap();
    }
}
