//! Compute backend implementations.

pub mod cpu;

#[cfg(feature = "parallel")]
pub mod parallel;

use std::fmt::Debug;

use ndarray::{Array2, Array3, ArrayD, ArrayView1, ArrayView2, ArrayView3, ArrayView4, ArrayViewD};

use crate::error::RuntimeError;
use crate::Result;

/// Trait for pluggable compute backends.
///
/// A backend goes through two lifecycle calls before it may run operations:
/// [`activate`](ComputeBackend::activate) claims the execution target and
/// [`ready`](ComputeBackend::ready) confirms it can accept work. Operations
/// take borrowed views and return owned arrays; buffer bookkeeping is done by
/// the caller.
pub trait ComputeBackend: Send + Sync + Debug {
    /// Returns the name of this backend (e.g., "cpu", "parallel").
    fn name(&self) -> &str;

    /// Claim the execution target.
    fn activate(&mut self) -> Result<()>;

    /// Confirm the backend is ready to execute operations.
    fn ready(&self) -> Result<()>;

    /// Matrix multiplication: `[m, k] @ [k, n] -> [m, n]`.
    fn matmul(&self, a: ArrayView2<f32>, b: ArrayView2<f32>) -> Result<Array2<f32>>;

    /// Add `bias` to every row of `x`.
    fn add_bias(&self, x: ArrayView2<f32>, bias: ArrayView1<f32>) -> Result<Array2<f32>>;

    /// Element-wise `max(x, 0)`.
    fn relu(&self, x: ArrayViewD<f32>) -> Result<ArrayD<f32>>;

    /// Row-wise softmax.
    fn softmax(&self, x: ArrayView2<f32>) -> Result<Array2<f32>>;

    /// Element-wise `x * s`.
    fn scale(&self, x: ArrayViewD<f32>, s: f32) -> Result<ArrayD<f32>>;

    /// Bilinear resampling of an `[H, W, C]` image to `[height, width, C]`.
    ///
    /// Corners are not aligned and pixel centers are not offset: output
    /// coordinate `d` samples input coordinate `d * in / out`.
    fn resize_bilinear(&self, x: ArrayView3<f32>, height: usize, width: usize)
    -> Result<Array3<f32>>;

    /// Mean over the spatial axes of an `[N, H, W, C]` tensor, giving `[N, C]`.
    fn spatial_mean(&self, x: ArrayView4<f32>) -> Result<Array2<f32>>;
}

/// Names of the backends compiled into this build, most preferred first.
pub fn available() -> Vec<&'static str> {
    let mut names = Vec::new();
    #[cfg(feature = "parallel")]
    names.push(parallel::ParallelBackend::NAME);
    names.push(cpu::CpuBackend::NAME);
    names
}

/// Construct a backend by name.
pub fn create(name: &str) -> Result<Box<dyn ComputeBackend>> {
    match name {
        cpu::CpuBackend::NAME => Ok(Box::new(cpu::CpuBackend::new())),
        #[cfg(feature = "parallel")]
        parallel::ParallelBackend::NAME => Ok(Box::new(parallel::ParallelBackend::new())),
        other => Err(RuntimeError::UnknownBackend(other.to_string())),
    }
}

pub(crate) fn check_matmul(a: &ArrayView2<f32>, b: &ArrayView2<f32>) -> Result<()> {
    if a.ncols() != b.nrows() {
        return Err(RuntimeError::ShapeMismatch {
            expected: vec![a.ncols(), b.ncols()],
            actual: b.shape().to_vec(),
        });
    }
    Ok(())
}

pub(crate) fn check_bias(x: &ArrayView2<f32>, bias: &ArrayView1<f32>) -> Result<()> {
    if x.ncols() != bias.len() {
        return Err(RuntimeError::ShapeMismatch {
            expected: vec![x.ncols()],
            actual: vec![bias.len()],
        });
    }
    Ok(())
}

/// Source index pair and interpolation weight for one output coordinate.
pub(crate) fn sample_coord(out: usize, in_len: usize, out_len: usize) -> (usize, usize, f32) {
    let scale = in_len as f32 / out_len as f32;
    let src = out as f32 * scale;
    let lo = (src.floor() as usize).min(in_len - 1);
    let hi = (lo + 1).min(in_len - 1);
    (lo, hi, src - lo as f32)
}

pub(crate) fn check_resize(x: &ArrayView3<f32>, height: usize, width: usize) -> Result<()> {
    let (h, w, _) = x.dim();
    if h == 0 || w == 0 || height == 0 || width == 0 {
        return Err(RuntimeError::ShapeMismatch {
            expected: vec![height, width],
            actual: x.shape().to_vec(),
        });
    }
    Ok(())
}
