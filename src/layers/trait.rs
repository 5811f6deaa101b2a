//! Propagation contract shared by every layer kind
//!
//! This module defines the [`Propagate`] trait implemented by each concrete
//! layer. Layers never own their input or their batch-sized buffers: the
//! network hands them borrowed tensors out of its arena on every call.

use crate::error::Result;
use crate::tensor::NDArray;
use crate::utils::SimpleRng;

/// Mutable view of a parameterized layer's weights and biases together with
/// the gradients computed by its last backward pass.
pub struct Parameters<'a> {
    pub weights: &'a mut NDArray,
    pub weight_gradient: &'a NDArray,
    pub biases: &'a mut NDArray,
    pub bias_gradient: &'a NDArray,
}

/// Core trait for neural network layers.
///
/// Shapes passed to [`resolve`](Propagate::resolve) are per-sample (no batch
/// dimension). Tensors passed to `forward`/`backward` carry the batch as their
/// leading dimension. Calling either before `resolve` is `Unconfigured`; a
/// tensor that is not `[batch, resolved shape]` is `ShapeMismatch`.
///
/// # Example
///
/// ```ignore
/// let out_shape = layer.resolve(&[1, 28, 28], &mut rng)?;
/// layer.bind(batch_size)?;
/// layer.forward(&input, &mut output)?;
/// layer.backward(&input, &grad_output, &mut grad_input)?;
/// ```
pub trait Propagate {
    /// Shape resolution.
    ///
    /// Fixes the per-sample output shape for the given per-sample input shape,
    /// and allocates and initializes any parameters and parameter gradients.
    fn resolve(&mut self, input_shape: &[usize], rng: &mut SimpleRng) -> Result<Vec<usize>>;

    /// Batch-dependent allocation of layer-owned scratch state.
    fn bind(&mut self, _batch_size: usize) -> Result<()> {
        Ok(())
    }

    /// Compute `output` from `input`.
    fn forward(&mut self, input: &NDArray, output: &mut NDArray) -> Result<()>;

    /// Compute the gradient with respect to the input (written to `grad_input`)
    /// and, for parameterized layers, the parameter gradients.
    ///
    /// All gradient buffers are overwritten, never accumulated across calls.
    fn backward(
        &mut self,
        input: &NDArray,
        grad_output: &NDArray,
        grad_input: &mut NDArray,
    ) -> Result<()>;

    /// Weights, biases and their gradients, for layers that have them.
    fn parameters(&mut self) -> Option<Parameters<'_>> {
        None
    }

    /// Number of trainable scalars (weights + biases).
    fn parameter_count(&self) -> usize {
        0
    }
}
