//! Error types for the tensor runtime.

use thiserror::Error;

use crate::tensor::{DType, TensorId};

/// Errors that can occur while selecting backends or operating on tensors.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Every candidate backend failed to activate or become ready.
    #[error("no backend available (tried: {})", format_attempts(.attempts))]
    NoBackendAvailable {
        /// `(backend name, failure reason)` for each attempted candidate.
        attempts: Vec<(String, String)>,
    },

    /// A backend name that is not compiled into this build.
    #[error("unknown backend: {0}")]
    UnknownBackend(String),

    /// No backend has been initialized on the runtime context yet.
    #[error("runtime context has no active backend")]
    NotInitialized,

    /// The tensor was already released.
    #[error("{0} released twice")]
    DoubleRelease(TensorId),

    /// The tensor id was never issued by this pool.
    #[error("{0} is not known to this pool")]
    UnknownTensor(TensorId),

    /// The tensor was accessed after being released.
    #[error("{0} accessed after release")]
    ReleasedTensor(TensorId),

    /// Tensor shapes are incompatible with the requested operation.
    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Tensor dtype is incompatible with the requested operation.
    #[error("dtype mismatch: expected {expected}, got {actual}")]
    DTypeMismatch { expected: DType, actual: DType },

    /// The tensor lives in the memory space of a different backend.
    #[error("{tensor} belongs to backend '{owner}' but '{active}' is active")]
    BackendMismatch {
        tensor: TensorId,
        owner: String,
        active: String,
    },

    /// The backend rejected an activation request or an operation.
    #[error("backend '{backend}' failed: {reason}")]
    Backend { backend: String, reason: String },
}

impl RuntimeError {
    /// Shorthand for a backend-originated failure.
    pub fn backend(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        RuntimeError::Backend {
            backend: backend.into(),
            reason: reason.into(),
        }
    }
}

fn format_attempts(attempts: &[(String, String)]) -> String {
    if attempts.is_empty() {
        return "no candidates".to_string();
    }
    attempts
        .iter()
        .map(|(name, reason)| format!("{}: {}", name, reason))
        .collect::<Vec<_>>()
        .join("; ")
}
