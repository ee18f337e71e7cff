//! Tensor handles and the buffers they point at.

use std::fmt;

use ndarray::{ArrayD, IxDyn};

use crate::error::RuntimeError;
use crate::Result;

/// Identifier of a buffer inside a [`TensorPool`](crate::TensorPool).
///
/// Ids are issued monotonically and never reused, so a released id can be
/// told apart from one that was never issued. Each id also names the pool
/// that issued it; no other pool accepts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TensorId {
    pub(crate) pool: u64,
    pub(crate) seq: u64,
}

impl TensorId {
    pub(crate) fn new(pool: u64, seq: u64) -> Self {
        Self { pool, seq }
    }

    /// Position of the id in its pool's allocation order.
    pub fn raw(self) -> u64 {
        self.seq
    }
}

impl fmt::Display for TensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tensor#{}", self.seq)
    }
}

/// Supported element types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    Float32,
    Uint8,
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::Float32 => write!(f, "float32"),
            DType::Uint8 => write!(f, "uint8"),
        }
    }
}

/// Owned contents of a tensor buffer.
#[derive(Debug, Clone)]
pub enum TensorData {
    Float32(ArrayD<f32>),
    Uint8(ArrayD<u8>),
}

impl TensorData {
    /// Build a float32 buffer from row-major data.
    pub fn from_f32(data: Vec<f32>, shape: &[usize]) -> Result<Self> {
        let arr = ArrayD::from_shape_vec(IxDyn(shape), data).map_err(|e| {
            RuntimeError::backend("host", format!("cannot build {:?} buffer: {}", shape, e))
        })?;
        Ok(TensorData::Float32(arr))
    }

    /// Build a uint8 buffer from row-major data.
    pub fn from_u8(data: Vec<u8>, shape: &[usize]) -> Result<Self> {
        let arr = ArrayD::from_shape_vec(IxDyn(shape), data).map_err(|e| {
            RuntimeError::backend("host", format!("cannot build {:?} buffer: {}", shape, e))
        })?;
        Ok(TensorData::Uint8(arr))
    }

    /// Shape of the buffer.
    pub fn shape(&self) -> &[usize] {
        match self {
            TensorData::Float32(arr) => arr.shape(),
            TensorData::Uint8(arr) => arr.shape(),
        }
    }

    /// Element type of the buffer.
    pub fn dtype(&self) -> DType {
        match self {
            TensorData::Float32(_) => DType::Float32,
            TensorData::Uint8(_) => DType::Uint8,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            TensorData::Float32(arr) => arr.len(),
            TensorData::Uint8(arr) => arr.len(),
        }
    }

    /// Returns true if the buffer holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the float32 array, failing for other dtypes.
    pub fn as_f32(&self) -> Result<&ArrayD<f32>> {
        match self {
            TensorData::Float32(arr) => Ok(arr),
            other => Err(RuntimeError::DTypeMismatch {
                expected: DType::Float32,
                actual: other.dtype(),
            }),
        }
    }
}

/// Handle to a tensor owned by a [`TensorPool`](crate::TensorPool).
///
/// The handle carries the metadata (shape, dtype) but not the data itself;
/// reading or computing requires going through a
/// [`TensorScope`](crate::TensorScope). Cloning a handle does not clone the
/// buffer, and releasing any clone releases the buffer for all of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tensor {
    id: TensorId,
    shape: Vec<usize>,
    dtype: DType,
}

impl Tensor {
    pub(crate) fn new(id: TensorId, shape: Vec<usize>, dtype: DType) -> Self {
        Self { id, shape, dtype }
    }

    /// Pool identifier of this tensor.
    pub fn id(&self) -> TensorId {
        self.id
    }

    /// Shape of the tensor.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Element type of the tensor.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Total number of elements.
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}{:?}", self.id, self.dtype, self.shape)
    }
}
