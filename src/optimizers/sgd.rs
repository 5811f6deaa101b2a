//! Stochastic Gradient Descent (SGD) optimizer implementation
//!
//! Performs the basic gradient descent update:
//! `parameter = parameter - learning_rate * gradient`

use crate::error::Result;
use crate::optimizers::{check_gradient, Optimizer, ParamId};
use crate::tensor::NDArray;

/// Stochastic Gradient Descent optimizer.
///
/// `w = w - η * ∇L/∂w`
///
/// Stateless: the parameter handle is ignored and [`Optimizer::reset`] does nothing.
///
/// # Example
///
/// ```
/// use rust_cnn::optimizers::{Optimizer, ParamId, SGD};
/// use rust_cnn::NDArray;
///
/// let mut optimizer = SGD::new(0.01);
/// let mut weights = NDArray::from_vec(&[3], vec![1.0, 2.0, 3.0]).unwrap();
/// let gradient = NDArray::from_vec(&[3], vec![0.1, 0.2, 0.3]).unwrap();
///
/// optimizer.update(ParamId::new(0), &mut weights, &gradient).unwrap();
/// // weights are now: [0.999, 1.998, 2.997]
/// ```
#[derive(Debug, Clone)]
pub struct SGD {
    learning_rate: f32,
}

impl SGD {
    pub fn new(learning_rate: f32) -> Self {
        Self { learning_rate }
    }
}

impl Optimizer for SGD {
    fn update(&mut self, _id: ParamId, parameter: &mut NDArray, gradient: &NDArray) -> Result<()> {
        check_gradient(parameter, gradient)?;
        parameter.sub_scaled_assign(gradient, self.learning_rate)
    }

    fn reset(&mut self) {}

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.learning_rate = lr;
    }
}
