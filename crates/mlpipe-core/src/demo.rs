//! Dense network smoke test: build, predict once, dispose.

use std::fmt;

use mlpipe_runtime::RuntimeContext;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::Serialize;
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::model::{Model, ModelSpec};
use crate::models::LabelTable;
use crate::runner::decode;

/// Result of one demo prediction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemoOutcome {
    /// Winning class.
    pub class: usize,
    /// Output value at `class`.
    pub confidence: f32,
    /// The full softmax output.
    pub probabilities: Vec<f32>,
}

impl fmt::Display for DemoOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Class {} with {:.2}% confidence",
            self.class,
            self.confidence * 100.0
        )
    }
}

/// Build the `[10] -> 32 -> 16 -> 3` network, feed it one standard-normal
/// sample drawn from `seed`, and dispose of everything again.
pub fn run_dense_demo(ctx: &mut RuntimeContext, seed: u64) -> Result<DemoOutcome> {
    let spec = ModelSpec::dense_demo();
    let model = Model::build(ctx, &spec)?;

    let outcome = predict(ctx, &model, seed);
    // Dispose even if the prediction failed; report the prediction error first.
    let disposed = model.dispose(ctx);
    let outcome = outcome?;
    disposed?;

    debug!("Demo prediction: {}", outcome);
    Ok(outcome)
}

fn predict(ctx: &mut RuntimeContext, model: &Model, seed: u64) -> Result<DemoOutcome> {
    let mut rng = StdRng::seed_from_u64(seed);
    let shape = model.input_shape();
    let sample: Vec<f32> = (0..shape.iter().product::<usize>())
        .map(|_| rng.sample(StandardNormal))
        .collect();

    let mut scope = ctx.scope();
    let input = scope.from_f32(sample, &shape)?;
    let output = model.forward(&mut scope, &input)?;
    let probabilities = scope.read_f32(&output)?;

    let labels = LabelTable::unnamed();
    let top = decode(&probabilities, &labels).ok_or_else(|| {
        PipelineError::ShapeMismatch {
            expected: vec![1, model.num_classes()],
            actual: output.shape().to_vec(),
        }
    })?;

    Ok(DemoOutcome {
        class: top.index,
        confidence: top.confidence,
        probabilities,
    })
}
