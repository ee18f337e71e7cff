//! Multi-threaded backend built on rayon.

use ndarray::parallel::prelude::*;
use ndarray::{
    Array2, Array3, ArrayD, ArrayView1, ArrayView2, ArrayView3, ArrayView4, ArrayViewD, Axis, Zip,
};
use tracing::debug;

use super::cpu::CpuBackend;
use super::{check_matmul, check_resize, sample_coord, ComputeBackend};
use crate::error::RuntimeError;
use crate::Result;

/// Accelerated backend splitting each operation across rayon workers.
///
/// Activation fails when the thread pool has fewer than `min_threads`
/// workers, since there is nothing to accelerate on such a host. Cheap
/// reductions are delegated to the single-threaded kernels.
#[derive(Debug, Clone)]
pub struct ParallelBackend {
    fallback: CpuBackend,
    min_threads: usize,
    active: bool,
}

impl ParallelBackend {
    /// Registry name of this backend.
    pub const NAME: &'static str = "parallel";

    pub fn new() -> Self {
        Self {
            fallback: CpuBackend::new(),
            min_threads: 2,
            active: false,
        }
    }

    /// Require at least `threads` rayon workers for activation to succeed.
    pub fn with_min_threads(mut self, threads: usize) -> Self {
        self.min_threads = threads;
        self
    }
}

impl Default for ParallelBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeBackend for ParallelBackend {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn activate(&mut self) -> Result<()> {
        let threads = rayon::current_num_threads();
        if threads < self.min_threads {
            return Err(RuntimeError::backend(
                Self::NAME,
                format!(
                    "{} worker thread(s) available, need at least {}",
                    threads, self.min_threads
                ),
            ));
        }
        debug!("Parallel backend activated with {} threads", threads);
        self.active = true;
        Ok(())
    }

    fn ready(&self) -> Result<()> {
        if self.active {
            Ok(())
        } else {
            Err(RuntimeError::backend(Self::NAME, "not activated"))
        }
    }

    fn matmul(&self, a: ArrayView2<f32>, b: ArrayView2<f32>) -> Result<Array2<f32>> {
        check_matmul(&a, &b)?;
        let mut out = Array2::<f32>::zeros((a.nrows(), b.ncols()));
        Zip::from(out.rows_mut())
            .and(a.rows())
            .par_for_each(|mut out_row, a_row| out_row.assign(&a_row.dot(&b)));
        Ok(out)
    }

    fn add_bias(&self, x: ArrayView2<f32>, bias: ArrayView1<f32>) -> Result<Array2<f32>> {
        self.fallback.add_bias(x, bias)
    }

    fn relu(&self, x: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
        let mut out = x.to_owned();
        out.par_mapv_inplace(|v| v.max(0.0));
        Ok(out)
    }

    fn softmax(&self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        let mut out = x.to_owned();
        Zip::from(out.rows_mut()).par_for_each(|mut row| {
            let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
            row.mapv_inplace(|v| (v - max).exp());
            let sum = row.sum();
            row.mapv_inplace(|v| v / sum);
        });
        Ok(out)
    }

    fn scale(&self, x: ArrayViewD<f32>, s: f32) -> Result<ArrayD<f32>> {
        let mut out = x.to_owned();
        out.par_mapv_inplace(|v| v * s);
        Ok(out)
    }

    fn resize_bilinear(
        &self,
        x: ArrayView3<f32>,
        height: usize,
        width: usize,
    ) -> Result<Array3<f32>> {
        check_resize(&x, height, width)?;
        let (in_h, in_w, channels) = x.dim();
        let mut out = Array3::<f32>::zeros((height, width, channels));

        out.axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(oy, mut row)| {
                let (y0, y1, fy) = sample_coord(oy, in_h, height);
                for ox in 0..width {
                    let (x0, x1, fx) = sample_coord(ox, in_w, width);
                    for c in 0..channels {
                        let top = x[[y0, x0, c]] + (x[[y0, x1, c]] - x[[y0, x0, c]]) * fx;
                        let bottom = x[[y1, x0, c]] + (x[[y1, x1, c]] - x[[y1, x0, c]]) * fx;
                        row[[ox, c]] = top + (bottom - top) * fy;
                    }
                }
            });

        Ok(out)
    }

    fn spatial_mean(&self, x: ArrayView4<f32>) -> Result<Array2<f32>> {
        self.fallback.spatial_mean(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array;

    fn active_backend() -> ParallelBackend {
        let mut backend = ParallelBackend::new().with_min_threads(1);
        backend.activate().unwrap();
        backend
    }

    #[test]
    fn test_ready_requires_activation() {
        let backend = ParallelBackend::new();
        assert!(backend.ready().is_err());
        assert!(active_backend().ready().is_ok());
    }

    #[test]
    fn test_activation_fails_without_enough_threads() {
        let mut backend = ParallelBackend::new().with_min_threads(usize::MAX);
        let err = backend.activate().unwrap_err();
        assert!(err.to_string().contains("parallel"));
        assert!(backend.ready().is_err());
    }

    #[test]
    fn test_matches_cpu_kernels() {
        let parallel = active_backend();
        let cpu = CpuBackend::new();

        let a = Array::from_shape_fn((5, 7), |(i, j)| (i as f32 - j as f32) * 0.25);
        let b = Array::from_shape_fn((7, 3), |(i, j)| (i * j) as f32 * 0.1);
        let expected = cpu.matmul(a.view(), b.view()).unwrap();
        let actual = parallel.matmul(a.view(), b.view()).unwrap();
        for (e, a) in expected.iter().zip(actual.iter()) {
            assert_relative_eq!(e, a, epsilon = 1e-5);
        }

        let img = Array::from_shape_fn((6, 5, 3), |(y, x, c)| (y * 15 + x * 3 + c) as f32);
        let expected = cpu.resize_bilinear(img.view(), 4, 9).unwrap();
        let actual = parallel.resize_bilinear(img.view(), 4, 9).unwrap();
        assert_eq!(expected, actual);

        let logits = Array::from_shape_fn((2, 4), |(i, j)| (i + j) as f32);
        let expected = cpu.softmax(logits.view()).unwrap();
        let actual = parallel.softmax(logits.view()).unwrap();
        for (e, a) in expected.iter().zip(actual.iter()) {
            assert_relative_eq!(e, a, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_relu_and_scale() {
        let backend = active_backend();
        let x = Array::from_vec(vec![-2.0f32, 0.5, 255.0]).into_dyn();
        let y = backend.relu(x.view()).unwrap();
        assert_eq!(y.as_slice().unwrap(), &[0.0, 0.5, 255.0]);
        let z = backend.scale(y.view(), 1.0 / 255.0).unwrap();
        assert_relative_eq!(z[[2]], 1.0, epsilon = 1e-6);
    }
}
