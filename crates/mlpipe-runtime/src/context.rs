//! Explicit runtime state threaded through every pipeline call.

use tracing::info;

use crate::backend::ComputeBackend;
use crate::error::RuntimeError;
use crate::pool::{PoolStats, TensorPool};
use crate::scope::TensorScope;
use crate::tensor::Tensor;
use crate::Result;

/// The active compute backend plus the pool of tensors created under it.
///
/// All tensor work goes through a `&mut RuntimeContext`, so at most one
/// computation is in flight per context.
#[derive(Default)]
pub struct RuntimeContext {
    backend: Option<Box<dyn ComputeBackend>>,
    pool: TensorPool,
}

impl RuntimeContext {
    /// Create a context with no active backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context with `backend` already activated and ready.
    pub fn with_backend(mut backend: Box<dyn ComputeBackend>) -> Result<Self> {
        backend.activate()?;
        backend.ready()?;
        let mut ctx = Self::new();
        ctx.set_active(backend)?;
        Ok(ctx)
    }

    /// Name of the active backend, if any.
    pub fn active_backend(&self) -> Option<&str> {
        self.backend.as_deref().map(|b| b.name())
    }

    pub(crate) fn backend(&self) -> Result<&dyn ComputeBackend> {
        self.backend.as_deref().ok_or(RuntimeError::NotInitialized)
    }

    /// Install an activated backend.
    ///
    /// Tensors created under a previously active backend must be released
    /// first; their buffers live in that backend's memory space.
    pub(crate) fn set_active(&mut self, backend: Box<dyn ComputeBackend>) -> Result<()> {
        if let Some(current) = self.backend.as_deref() {
            let stranded = self.pool.live_on(current.name());
            if stranded > 0 && current.name() != backend.name() {
                return Err(RuntimeError::backend(
                    backend.name(),
                    format!(
                        "{} tensor(s) still live on '{}'; release them before switching",
                        stranded,
                        current.name()
                    ),
                ));
            }
        }
        info!("Active backend: {}", backend.name());
        self.backend = Some(backend);
        Ok(())
    }

    /// Open a computation scope. Tensors created through the scope are
    /// released when it is dropped unless handed out with
    /// [`TensorScope::keep`].
    pub fn scope(&mut self) -> TensorScope<'_> {
        TensorScope::new(self)
    }

    /// Release a tensor that is not tracked by any open scope.
    pub fn release(&mut self, tensor: Tensor) -> Result<()> {
        self.pool.release(tensor)
    }

    /// Returns true if the tensor has not been released.
    pub fn is_live(&self, tensor: &Tensor) -> bool {
        self.pool.is_live(tensor)
    }

    /// Current allocation counters.
    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub(crate) fn pool(&self) -> &TensorPool {
        &self.pool
    }

    pub(crate) fn pool_mut(&mut self) -> &mut TensorPool {
        &mut self.pool
    }
}

impl std::fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("backend", &self.active_backend())
            .field("pool", &self.pool.stats())
            .finish()
    }
}
