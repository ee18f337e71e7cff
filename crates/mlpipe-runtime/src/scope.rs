//! Scoped acquisition of tensors.
//!
//! A [`TensorScope`] is the only way to create or compute tensors. Every
//! tensor it produces is tracked, and whatever is still tracked when the
//! scope is dropped gets released: on normal exit, on `?` early return and
//! during unwinding alike. Results that must outlive the scope are handed
//! out with [`TensorScope::keep`].

use ndarray::{ArrayD, ArrayView, Axis, Dimension, Ix2, Ix3, Ix4, IxDyn, ShapeError};

use crate::backend::ComputeBackend;
use crate::context::RuntimeContext;
use crate::error::RuntimeError;
use crate::pool::release_tracked;
use crate::tensor::{Tensor, TensorData, TensorId};
use crate::Result;

/// Guard over a [`RuntimeContext`] that releases tracked tensors on drop.
pub struct TensorScope<'ctx> {
    ctx: &'ctx mut RuntimeContext,
    tracked: Vec<TensorId>,
}

impl<'ctx> TensorScope<'ctx> {
    pub(crate) fn new(ctx: &'ctx mut RuntimeContext) -> Self {
        Self {
            ctx,
            tracked: Vec::new(),
        }
    }

    /// Name of the backend operations run on.
    pub fn active_backend(&self) -> Option<&str> {
        self.ctx.active_backend()
    }

    /// Number of tensors this scope will release on drop.
    pub fn tracked(&self) -> usize {
        self.tracked.len()
    }

    /// Create a float32 tensor from row-major host data.
    pub fn from_f32(&mut self, data: Vec<f32>, shape: &[usize]) -> Result<Tensor> {
        self.alloc(TensorData::from_f32(data, shape)?)
    }

    /// Create a uint8 tensor from row-major host data.
    pub fn from_u8(&mut self, data: Vec<u8>, shape: &[usize]) -> Result<Tensor> {
        self.alloc(TensorData::from_u8(data, shape)?)
    }

    /// Adopt a tensor created elsewhere so that this scope releases it.
    pub fn track(&mut self, tensor: Tensor) -> Result<Tensor> {
        self.ctx.pool().entry(tensor.id())?;
        if !self.tracked.contains(&tensor.id()) {
            self.tracked.push(tensor.id());
        }
        Ok(tensor)
    }

    /// Stop tracking `tensor` and hand it to the caller, who becomes
    /// responsible for releasing it.
    pub fn keep(&mut self, tensor: Tensor) -> Tensor {
        self.tracked.retain(|id| *id != tensor.id());
        tensor
    }

    /// Release `tensor` now instead of at scope end.
    pub fn release(&mut self, tensor: Tensor) -> Result<()> {
        self.tracked.retain(|id| *id != tensor.id());
        self.ctx.pool_mut().release(tensor)
    }

    /// Read a float32 tensor back into host memory.
    pub fn read_f32(&self, tensor: &Tensor) -> Result<Vec<f32>> {
        let arr = self.input(tensor)?.as_f32()?;
        Ok(arr.iter().copied().collect())
    }

    /// Convert to float32.
    pub fn cast_f32(&mut self, tensor: &Tensor) -> Result<Tensor> {
        self.compute(tensor, |_, data| {
            Ok(TensorData::Float32(match data {
                TensorData::Float32(arr) => arr.clone(),
                TensorData::Uint8(arr) => arr.mapv(f32::from),
            }))
        })
    }

    /// Multiply every element by `factor`.
    pub fn scale(&mut self, tensor: &Tensor, factor: f32) -> Result<Tensor> {
        self.compute(tensor, |backend, data| {
            Ok(TensorData::Float32(backend.scale(data.as_f32()?.view(), factor)?))
        })
    }

    /// Bilinear resize of an `[H, W, C]` tensor to `[height, width, C]`.
    ///
    /// Integer inputs are resampled in floating point, so the output is
    /// always float32.
    pub fn resize_bilinear(
        &mut self,
        tensor: &Tensor,
        height: usize,
        width: usize,
    ) -> Result<Tensor> {
        expect_rank(tensor, 3)?;
        self.compute(tensor, |backend, data| {
            let widened;
            let arr = match data {
                TensorData::Float32(arr) => arr,
                TensorData::Uint8(arr) => {
                    widened = arr.mapv(f32::from);
                    &widened
                }
            };
            let out = backend.resize_bilinear(fixed::<Ix3>(arr)?, height, width)?;
            Ok(TensorData::Float32(out.into_dyn()))
        })
    }

    /// Insert an axis of length 1 at `axis`.
    pub fn expand_dims(&mut self, tensor: &Tensor, axis: usize) -> Result<Tensor> {
        if axis > tensor.ndim() {
            return Err(RuntimeError::backend(
                "host",
                format!("cannot insert axis {} into rank-{} tensor", axis, tensor.ndim()),
            ));
        }
        self.compute(tensor, |_, data| {
            Ok(match data {
                TensorData::Float32(arr) => {
                    TensorData::Float32(arr.clone().insert_axis(Axis(axis)))
                }
                TensorData::Uint8(arr) => TensorData::Uint8(arr.clone().insert_axis(Axis(axis))),
            })
        })
    }

    /// Same elements, new shape.
    pub fn reshape(&mut self, tensor: &Tensor, shape: &[usize]) -> Result<Tensor> {
        if tensor.numel() != shape.iter().product::<usize>() {
            return Err(RuntimeError::ShapeMismatch {
                expected: tensor.shape().to_vec(),
                actual: shape.to_vec(),
            });
        }
        self.compute(tensor, |_, data| {
            let reshaped =
                |e: ShapeError| RuntimeError::backend("host", format!("reshape failed: {}", e));
            Ok(match data {
                TensorData::Float32(arr) => TensorData::Float32(
                    arr.as_standard_layout()
                        .into_owned()
                        .into_shape_with_order(IxDyn(shape))
                        .map_err(reshaped)?,
                ),
                TensorData::Uint8(arr) => TensorData::Uint8(
                    arr.as_standard_layout()
                        .into_owned()
                        .into_shape_with_order(IxDyn(shape))
                        .map_err(reshaped)?,
                ),
            })
        })
    }

    /// `[m, k] @ [k, n]`.
    pub fn matmul(&mut self, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        expect_rank(a, 2)?;
        expect_rank(b, 2)?;
        let out = {
            let backend = self.ctx.backend()?;
            let lhs = self.input(a)?.as_f32()?;
            let rhs = self.input(b)?.as_f32()?;
            backend.matmul(fixed::<Ix2>(lhs)?, fixed::<Ix2>(rhs)?)?
        };
        self.alloc(TensorData::Float32(out.into_dyn()))
    }

    /// Add a `[n]` bias to every row of an `[m, n]` tensor.
    pub fn add_bias(&mut self, x: &Tensor, bias: &Tensor) -> Result<Tensor> {
        expect_rank(x, 2)?;
        expect_rank(bias, 1)?;
        let out = {
            let backend = self.ctx.backend()?;
            let x = self.input(x)?.as_f32()?;
            let bias = self.input(bias)?.as_f32()?;
            backend.add_bias(fixed::<Ix2>(x)?, fixed(bias)?)?
        };
        self.alloc(TensorData::Float32(out.into_dyn()))
    }

    /// Element-wise `max(x, 0)`.
    pub fn relu(&mut self, tensor: &Tensor) -> Result<Tensor> {
        self.compute(tensor, |backend, data| {
            Ok(TensorData::Float32(backend.relu(data.as_f32()?.view())?))
        })
    }

    /// Row-wise softmax of an `[m, n]` tensor.
    pub fn softmax(&mut self, tensor: &Tensor) -> Result<Tensor> {
        expect_rank(tensor, 2)?;
        self.compute(tensor, |backend, data| {
            let out = backend.softmax(fixed::<Ix2>(data.as_f32()?)?)?;
            Ok(TensorData::Float32(out.into_dyn()))
        })
    }

    /// Mean over the spatial axes of `[N, H, W, C]`, giving `[N, C]`.
    pub fn spatial_mean(&mut self, tensor: &Tensor) -> Result<Tensor> {
        expect_rank(tensor, 4)?;
        self.compute(tensor, |backend, data| {
            let out = backend.spatial_mean(fixed::<Ix4>(data.as_f32()?)?)?;
            Ok(TensorData::Float32(out.into_dyn()))
        })
    }

    fn compute<F>(&mut self, tensor: &Tensor, op: F) -> Result<Tensor>
    where
        F: FnOnce(&dyn ComputeBackend, &TensorData) -> Result<TensorData>,
    {
        let out = {
            let backend = self.ctx.backend()?;
            let data = self.input(tensor)?;
            op(backend, data)?
        };
        self.alloc(out)
    }

    fn input(&self, tensor: &Tensor) -> Result<&TensorData> {
        let active = self.ctx.backend()?.name();
        let entry = self.ctx.pool().entry(tensor.id())?;
        if entry.backend != active {
            return Err(RuntimeError::BackendMismatch {
                tensor: tensor.id(),
                owner: entry.backend.clone(),
                active: active.to_string(),
            });
        }
        Ok(&entry.data)
    }

    fn alloc(&mut self, data: TensorData) -> Result<Tensor> {
        let backend = self.ctx.backend()?.name().to_string();
        let tensor = self.ctx.pool_mut().insert(data, &backend);
        self.tracked.push(tensor.id());
        Ok(tensor)
    }
}

impl Drop for TensorScope<'_> {
    fn drop(&mut self) {
        release_tracked(self.ctx.pool_mut(), &mut self.tracked);
    }
}

fn expect_rank(tensor: &Tensor, rank: usize) -> Result<()> {
    if tensor.ndim() != rank {
        return Err(RuntimeError::backend(
            "host",
            format!("expected rank-{} tensor, got {}", rank, tensor),
        ));
    }
    Ok(())
}

fn fixed<D: Dimension>(arr: &ArrayD<f32>) -> Result<ArrayView<'_, f32, D>> {
    arr.view().into_dimensionality::<D>().map_err(|e| {
        RuntimeError::backend(
            "host",
            format!("cannot view {:?} with fixed rank: {}", arr.shape(), e),
        )
    })
}
