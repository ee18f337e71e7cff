//! Tensor bookkeeping: the pool of live buffers and scoped acquisition.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{error, trace};

use crate::error::RuntimeError;
use crate::tensor::{Tensor, TensorData, TensorId};
use crate::Result;

/// Allocation counters of a [`TensorPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Tensors ever created.
    pub allocated: u64,
    /// Tensors released.
    pub released: u64,
    /// Tensors currently alive.
    pub live: usize,
}

pub(crate) struct Entry {
    pub(crate) data: TensorData,
    pub(crate) backend: String,
}

/// Owner of every tensor buffer created through a runtime context.
///
/// Buffers are addressed by [`TensorId`]; the pool enforces that each id is
/// released exactly once and never read afterwards. Tensors issued by a
/// different pool are rejected as unknown.
pub struct TensorPool {
    pool_id: u64,
    next_id: u64,
    live: HashMap<TensorId, Entry>,
    released: u64,
}

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(0);

impl Default for TensorPool {
    fn default() -> Self {
        Self {
            pool_id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            next_id: 0,
            live: HashMap::new(),
            released: 0,
        }
    }
}

impl TensorPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if this pool issued `id`, live or not.
    fn issued(&self, id: TensorId) -> bool {
        id.pool == self.pool_id && id.seq < self.next_id
    }

    pub(crate) fn insert(&mut self, data: TensorData, backend: &str) -> Tensor {
        let id = TensorId::new(self.pool_id, self.next_id);
        self.next_id += 1;
        let tensor = Tensor::new(id, data.shape().to_vec(), data.dtype());
        trace!("allocated {} on {}", tensor, backend);
        self.live.insert(
            id,
            Entry {
                data,
                backend: backend.to_string(),
            },
        );
        tensor
    }

    pub(crate) fn entry(&self, id: TensorId) -> Result<&Entry> {
        match self.live.get(&id) {
            Some(entry) => Ok(entry),
            None if self.issued(id) => Err(RuntimeError::ReleasedTensor(id)),
            None => Err(RuntimeError::UnknownTensor(id)),
        }
    }

    /// Release a tensor's buffer.
    ///
    /// # Errors
    /// `DoubleRelease` if the tensor was already released, `UnknownTensor`
    /// if this pool never issued it.
    pub fn release(&mut self, tensor: Tensor) -> Result<()> {
        self.release_id(tensor.id())
    }

    pub(crate) fn release_id(&mut self, id: TensorId) -> Result<()> {
        if id.pool != self.pool_id {
            return Err(RuntimeError::UnknownTensor(id));
        }
        if self.live.remove(&id).is_some() {
            self.released += 1;
            trace!("released {}", id);
            Ok(())
        } else if self.issued(id) {
            Err(RuntimeError::DoubleRelease(id))
        } else {
            Err(RuntimeError::UnknownTensor(id))
        }
    }

    /// Returns true if the tensor has not been released.
    pub fn is_live(&self, tensor: &Tensor) -> bool {
        self.live.contains_key(&tensor.id())
    }

    /// Current allocation counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.next_id,
            released: self.released,
            live: self.live.len(),
        }
    }

    /// Number of live tensors that were created under `backend`.
    pub(crate) fn live_on(&self, backend: &str) -> usize {
        self.live.values().filter(|e| e.backend == backend).count()
    }
}

/// Release every id in `tracked`, logging instead of failing.
///
/// Used from scope teardown where errors cannot be returned.
pub(crate) fn release_tracked(pool: &mut TensorPool, tracked: &mut Vec<TensorId>) {
    for id in tracked.drain(..) {
        if let Err(e) = pool.release_id(id) {
            error!("scope teardown: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn scalar(pool: &mut TensorPool) -> Tensor {
        pool.insert(TensorData::from_f32(vec![1.0], &[1]).unwrap(), "cpu")
    }

    #[test]
    fn test_release_twice_fails() {
        let mut pool = TensorPool::new();
        let t = scalar(&mut pool);
        let copy = t.clone();
        pool.release(t).unwrap();
        assert!(matches!(pool.release(copy), Err(RuntimeError::DoubleRelease(_))));
    }

    #[test]
    fn test_access_after_release_fails() {
        let mut pool = TensorPool::new();
        let t = scalar(&mut pool);
        let id = t.id();
        pool.release(t).unwrap();
        assert!(matches!(pool.entry(id), Err(RuntimeError::ReleasedTensor(_))));
    }

    #[test]
    fn test_unknown_id() {
        let mut pool = TensorPool::new();
        assert!(matches!(
            pool.release_id(TensorId::new(pool.pool_id, 42)),
            Err(RuntimeError::UnknownTensor(_))
        ));
    }

    #[test]
    fn test_rejects_tensor_from_other_pool() {
        let mut mine = TensorPool::new();
        let mut other = TensorPool::new();
        let own = scalar(&mut mine);
        let foreign = scalar(&mut other);
        assert_eq!(own.id().raw(), foreign.id().raw());

        assert!(matches!(
            mine.entry(foreign.id()),
            Err(RuntimeError::UnknownTensor(_))
        ));
        assert!(!mine.is_live(&foreign));
        assert!(matches!(
            mine.release(foreign.clone()),
            Err(RuntimeError::UnknownTensor(_))
        ));
        assert!(mine.is_live(&own));
        assert_eq!(mine.stats().live, 1);
        assert!(other.is_live(&foreign));
    }

    #[test]
    fn test_stats_balance() {
        let mut pool = TensorPool::new();
        let a = scalar(&mut pool);
        let b = scalar(&mut pool);
        assert!(pool.is_live(&a));
        pool.release(a).unwrap();
        assert_eq!(
            pool.stats(),
            PoolStats {
                allocated: 2,
                released: 1,
                live: 1
            }
        );
        pool.release(b).unwrap();
        assert_eq!(pool.stats().live, 0);
        assert_eq!(pool.live_on("cpu"), 0);
    }
}
