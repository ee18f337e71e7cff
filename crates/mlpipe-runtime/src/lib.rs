//! Tensor runtime for mlpipe.
//!
//! This crate provides:
//! - A `ComputeBackend` trait with a single-threaded `cpu` backend and a
//!   rayon-backed `parallel` backend
//! - `BackendSelector` for ordered backend fallback
//! - `RuntimeContext`, the explicit state every computation runs against
//! - `TensorPool` and `TensorScope` for deterministic tensor release

pub mod backend;
mod context;
mod error;
mod pool;
mod scope;
mod selector;
mod tensor;

pub use backend::cpu::CpuBackend;
pub use backend::ComputeBackend;
pub use context::RuntimeContext;
pub use error::RuntimeError;
pub use pool::{PoolStats, TensorPool};
pub use scope::TensorScope;
pub use selector::{ActiveBackend, BackendSelector};
pub use tensor::{DType, Tensor, TensorData, TensorId};

#[cfg(feature = "parallel")]
pub use backend::parallel::ParallelBackend;

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;
