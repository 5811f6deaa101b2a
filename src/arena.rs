//! Indexed tensor store
//!
//! The network owns every batch-sized buffer (layer outputs, input gradients,
//! batch scratch tensors) in one [`TensorArena`]. Layers refer to those buffers
//! through [`TensorId`] handles, so reallocating the arena for a new batch size
//! can never leave a layer pointing at a stale buffer: the handles are simply
//! reissued on the next bind.

use crate::error::{NnError, Result};
use crate::tensor::NDArray;

/// Handle of a tensor slot inside a [`TensorArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TensorId(usize);

impl TensorId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Default)]
pub struct TensorArena {
    slots: Vec<NDArray>,
}

impl TensorArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every slot. Previously issued ids become invalid.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Store a tensor and return its handle.
    pub fn insert(&mut self, tensor: NDArray) -> TensorId {
        self.slots.push(tensor);
        TensorId(self.slots.len() - 1)
    }

    /// Allocate a zero tensor of `shape`.
    pub fn alloc(&mut self, shape: &[usize]) -> TensorId {
        self.insert(NDArray::zeros(shape))
    }

    pub fn get(&self, id: TensorId) -> Result<&NDArray> {
        self.slots
            .get(id.0)
            .ok_or_else(|| NnError::Unconfigured(format!("tensor slot {} is not allocated", id.0)))
    }

    pub fn get_mut(&mut self, id: TensorId) -> Result<&mut NDArray> {
        self.slots
            .get_mut(id.0)
            .ok_or_else(|| NnError::Unconfigured(format!("tensor slot {} is not allocated", id.0)))
    }

    /// Run `f` with exclusive access to slot `write` and shared access to the
    /// rest of the arena.
    ///
    /// The written tensor is moved out for the duration of the call, so reading
    /// `write` itself from inside `f` yields an empty placeholder.
    pub fn with_slot<T>(
        &mut self,
        write: TensorId,
        f: impl FnOnce(&TensorArena, &mut NDArray) -> Result<T>,
    ) -> Result<T> {
        let mut target = std::mem::take(self.get_mut(write)?);
        let result = f(self, &mut target);
        self.slots[write.0] = target;
        result
    }
}
