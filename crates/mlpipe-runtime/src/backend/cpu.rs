//! Single-threaded software backend.

use ndarray::{
    Array2, Array3, ArrayD, ArrayView1, ArrayView2, ArrayView3, ArrayView4, ArrayViewD, Axis,
};

use super::{check_bias, check_matmul, check_resize, sample_coord, ComputeBackend};
use crate::Result;

/// Pure-Rust CPU compute backend.
///
/// Implements all operations with straightforward loops over `ndarray`
/// views. Always activates, so it is the last entry of every fallback chain.
#[derive(Debug, Clone, Default)]
pub struct CpuBackend;

impl CpuBackend {
    /// Registry name of this backend.
    pub const NAME: &'static str = "cpu";

    pub fn new() -> Self {
        CpuBackend
    }
}

impl ComputeBackend for CpuBackend {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn activate(&mut self) -> Result<()> {
        Ok(())
    }

    fn ready(&self) -> Result<()> {
        Ok(())
    }

    fn matmul(&self, a: ArrayView2<f32>, b: ArrayView2<f32>) -> Result<Array2<f32>> {
        check_matmul(&a, &b)?;
        Ok(a.dot(&b))
    }

    fn add_bias(&self, x: ArrayView2<f32>, bias: ArrayView1<f32>) -> Result<Array2<f32>> {
        check_bias(&x, &bias)?;
        Ok(&x + &bias)
    }

    fn relu(&self, x: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
        Ok(x.mapv(|v| v.max(0.0)))
    }

    fn softmax(&self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        let mut out = x.to_owned();
        for mut row in out.rows_mut() {
            let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
            row.mapv_inplace(|v| (v - max).exp());
            let sum = row.sum();
            row.mapv_inplace(|v| v / sum);
        }
        Ok(out)
    }

    fn scale(&self, x: ArrayViewD<f32>, s: f32) -> Result<ArrayD<f32>> {
        Ok(x.mapv(|v| v * s))
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

        for oy in 0..height {
            let (y0, y1, fy) = sample_coord(oy, in_h, height);
            for ox in 0..width {
                let (x0, x1, fx) = sample_coord(ox, in_w, width);
                for c in 0..channels {
                    let top = x[[y0, x0, c]] + (x[[y0, x1, c]] - x[[y0, x0, c]]) * fx;
                    let bottom = x[[y1, x0, c]] + (x[[y1, x1, c]] - x[[y1, x0, c]]) * fx;
                    out[[oy, ox, c]] = top + (bottom - top) * fy;
                }
            }
        }

        Ok(out)
    }

    fn spatial_mean(&self, x: ArrayView4<f32>) -> Result<Array2<f32>> {
        let (_, h, w, _) = x.dim();
        let count = (h * w).max(1) as f32;
        Ok(x.sum_axis(Axis(1)).sum_axis(Axis(1)) / count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, Array4};

    #[test]
    fn test_matmul() {
        let backend = CpuBackend::new();
        let a = array![[1.0f32, 2.0], [3.0, 4.0]];
        let b = array![[5.0f32, 6.0], [7.0, 8.0]];
        let c = backend.matmul(a.view(), b.view()).unwrap();
        assert_eq!(c, array![[19.0f32, 22.0], [43.0, 50.0]]);
    }

    #[test]
    fn test_matmul_dimension_mismatch() {
        let backend = CpuBackend::new();
        let a = array![[1.0f32, 2.0, 3.0]];
        let b = array![[1.0f32, 2.0], [3.0, 4.0]];
        assert!(backend.matmul(a.view(), b.view()).is_err());
    }

    #[test]
    fn test_add_bias() {
        let backend = CpuBackend::new();
        let x = array![[1.0f32, 2.0], [3.0, 4.0]];
        let bias = array![10.0f32, 20.0];
        let y = backend.add_bias(x.view(), bias.view()).unwrap();
        assert_eq!(y, array![[11.0f32, 22.0], [13.0, 24.0]]);
    }

    #[test]
    fn test_relu() {
        let backend = CpuBackend::new();
        let x = array![-1.0f32, 0.0, 2.5].into_dyn();
        let y = backend.relu(x.view()).unwrap();
        assert_eq!(y.as_slice().unwrap(), &[0.0, 0.0, 2.5]);
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let backend = CpuBackend::new();
        let x = array![[1.0f32, 2.0, 3.0], [1000.0, 1000.0, 1000.0]];
        let y = backend.softmax(x.view()).unwrap();
        for row in y.rows() {
            assert_relative_eq!(row.sum(), 1.0, epsilon = 1e-5);
        }
        assert!(y[[0, 2]] > y[[0, 1]]);
        assert_relative_eq!(y[[1, 0]], 1.0 / 3.0, epsilon = 1e-6);
    }

    #[test]
    fn test_resize_identity() {
        let backend = CpuBackend::new();
        let x = Array3::from_shape_fn((3, 4, 2), |(y, x, c)| (y * 8 + x * 2 + c) as f32);
        let y = backend.resize_bilinear(x.view(), 3, 4).unwrap();
        assert_eq!(y, x);
    }

    #[test]
    fn test_resize_upscale_interpolates() {
        let backend = CpuBackend::new();
        let x = Array3::from_shape_vec((1, 2, 1), vec![0.0f32, 10.0]).unwrap();
        let y = backend.resize_bilinear(x.view(), 1, 4).unwrap();
        // samples at 0, 0.5, 1.0, 1.5 (clamped to the last pixel)
        assert_eq!(y.as_slice().unwrap(), &[0.0, 5.0, 10.0, 10.0]);
    }

    #[test]
    fn test_resize_rejects_empty() {
        let backend = CpuBackend::new();
        let x = Array3::<f32>::zeros((0, 4, 3));
        assert!(backend.resize_bilinear(x.view(), 2, 2).is_err());
    }

    #[test]
    fn test_spatial_mean() {
        let backend = CpuBackend::new();
        let x = Array4::from_shape_fn((1, 2, 2, 2), |(_, y, x, c)| {
            if c == 0 { (y * 2 + x) as f32 } else { 1.0 }
        });
        let m = backend.spatial_mean(x.view()).unwrap();
        assert_eq!(m, array![[1.5f32, 1.0]]);
    }
}
