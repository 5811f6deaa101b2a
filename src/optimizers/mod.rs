//! Optimizer abstractions for neural network parameter updates
//!
//! Optimizers turn the gradients accumulated by a backward pass into
//! parameter changes. The plain rule is `weight = weight - learning_rate * gradient`;
//! Adam adds per-element momentum and adaptive step sizes.
//!
//! # Parameter identity
//!
//! Every parameter tensor of a compiled network gets a [`ParamId`]. Stateful
//! optimizers key their per-parameter state by that handle, so one optimizer
//! instance can serve every weight and bias tensor of the network.
//!
//! # Available Optimizers
//!
//! - [`SGD`]: vanilla stochastic gradient descent
//! - [`Adam`]: adaptive moment estimation with bias correction
//!
//! # Example
//!
//! ```
//! use rust_cnn::optimizers::{Adam, Optimizer, ParamId};
//! use rust_cnn::NDArray;
//!
//! let mut optimizer = Adam::new(0.001, 0.9, 0.999, 1e-8);
//! let mut weights = NDArray::full(&[2, 2], 1.0);
//! let gradient = NDArray::full(&[2, 2], 0.5);
//!
//! optimizer.update(ParamId::new(0), &mut weights, &gradient).unwrap();
//! assert!(weights.data().iter().all(|&w| w < 1.0));
//! ```

pub mod adam;
pub mod sgd;

pub use adam::Adam;
pub use sgd::SGD;

use crate::error::{NnError, Result};
use crate::tensor::NDArray;

/// Stable handle for one parameter tensor (a layer's weights or biases).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId(usize);

impl ParamId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

/// Core trait for neural network optimizers.
///
/// The network calls [`Optimizer::update`] once for the weights and once for
/// the biases of every parameterized layer after each backward pass, walking
/// the layers from last to first.
pub trait Optimizer: Send {
    /// Apply one update step to `parameter` in place.
    ///
    /// Returns [`NnError::ShapeMismatch`] when the gradient does not have the
    /// parameter's shape.
    fn update(&mut self, id: ParamId, parameter: &mut NDArray, gradient: &NDArray) -> Result<()>;

    /// Forget all accumulated state (moments, step counters).
    ///
    /// A no-op for stateless optimizers.
    fn reset(&mut self);

    /// Base learning rate.
    fn learning_rate(&self) -> f32;

    fn set_learning_rate(&mut self, lr: f32);
}

pub(crate) fn check_gradient(parameter: &NDArray, gradient: &NDArray) -> Result<()> {
    if parameter.shape() != gradient.shape() {
        return Err(NnError::shape_mismatch(
            "optimizer update",
            parameter.shape(),
            gradient.shape(),
        ));
    }
    Ok(())
}
