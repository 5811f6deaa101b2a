//! Adam (Adaptive Moment Estimation) optimizer implementation
//!
//! Combines momentum and adaptive learning rates with bias correction.

use std::collections::HashMap;

use log::debug;

use crate::error::Result;
use crate::optimizers::{check_gradient, Optimizer, ParamId};
use crate::tensor::NDArray;

/// Adam (Adaptive Moment Estimation) optimizer.
///
/// Maintains two moving averages per parameter element: the first moment
/// (mean) of gradients and the second moment (uncentered variance).
///
/// ```text
/// m_t = β1 * m_{t-1} + (1 - β1) * gradient
/// v_t = β2 * v_{t-1} + (1 - β2) * gradient²
/// m_hat = m_t / (1 - β1^t)
/// v_hat = v_t / (1 - β2^t)
/// parameter = parameter - α * m_hat / (√v_hat + ε)
/// ```
///
/// Moments are created lazily, zero-filled, the first time a [`ParamId`] is
/// seen. The step counter `t` is shared by every parameter and advances on
/// each [`Optimizer::update`] call, so a network with `P` parameter tensors
/// advances it `P` times per batch.
///
/// # Reference
///
/// Kingma, D. P., & Ba, J. (2014). Adam: A method for stochastic optimization.
/// arXiv preprint arXiv:1412.6980.
#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    /// (first moment, second moment) per parameter tensor
    moments: HashMap<ParamId, (NDArray, NDArray)>,
    /// Time step counter for bias correction
    t: u32,
}

impl Default for Adam {
    fn default() -> Self {
        Self::new(0.001, 0.9, 0.999, 1e-8)
    }
}

impl Adam {
    /// Creates a new Adam optimizer.
    ///
    /// # Arguments
    ///
    /// * `learning_rate` - The step size for parameter updates (α, must be positive)
    /// * `beta1` - Exponential decay rate for first moment estimates (0 < β1 < 1)
    /// * `beta2` - Exponential decay rate for second moment estimates (0 < β2 < 1)
    /// * `epsilon` - Small constant for numerical stability (must be positive)
    ///
    /// # Examples
    ///
    /// ```
    /// use rust_cnn::optimizers::{Adam, Optimizer};
    ///
    /// let optimizer = Adam::new(0.001, 0.9, 0.999, 1e-8);
    /// assert_eq!(optimizer.learning_rate(), 0.001);
    /// ```
    pub fn new(learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            moments: HashMap::new(),
            t: 0,
        }
    }

    pub fn beta1(&self) -> f32 {
        self.beta1
    }

    pub fn beta2(&self) -> f32 {
        self.beta2
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    /// Number of update calls since construction or the last reset.
    pub fn step(&self) -> u32 {
        self.t
    }

    /// Moment estimates for `id`, if that parameter has been updated.
    pub fn moments(&self, id: ParamId) -> Option<(&NDArray, &NDArray)> {
        self.moments.get(&id).map(|(m, v)| (m, v))
    }
}

impl Optimizer for Adam {
    fn update(&mut self, id: ParamId, parameter: &mut NDArray, gradient: &NDArray) -> Result<()> {
        check_gradient(parameter, gradient)?;

        let (m, v) = self.moments.entry(id).or_insert_with(|| {
            debug!(
                "adam: creating moment estimates for parameter {} with shape {:?}",
                id.index(),
                parameter.shape()
            );
            (NDArray::zeros(parameter.shape()), NDArray::zeros(parameter.shape()))
        });

        self.t += 1;
        let t = self.t as i32;
        let bias_correction1 = 1.0 - self.beta1.powi(t);
        let bias_correction2 = 1.0 - self.beta2.powi(t);
        let (beta1, beta2) = (self.beta1, self.beta2);
        let (lr, eps) = (self.learning_rate, self.epsilon);

        for (((p, &g), m), v) in parameter
            .data_mut()
            .iter_mut()
            .zip(gradient.data())
            .zip(m.data_mut())
            .zip(v.data_mut())
        {
            *m = beta1 * *m + (1.0 - beta1) * g;
            *v = beta2 * *v + (1.0 - beta2) * g * g;
            let m_hat = *m / bias_correction1;
            let v_hat = *v / bias_correction2;
            *p -= lr * m_hat / (v_hat.sqrt() + eps);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.moments.clear();
        self.t = 0;
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.learning_rate = lr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NnError;
    use approx::assert_relative_eq;

    #[test]
    fn test_adam_new() {
        let optimizer = Adam::new(0.001, 0.9, 0.999, 1e-8);
        assert_eq!(optimizer.learning_rate(), 0.001);
        assert_eq!(optimizer.beta1(), 0.9);
        assert_eq!(optimizer.beta2(), 0.999);
        assert_eq!(optimizer.epsilon(), 1e-8);
        assert_eq!(optimizer.step(), 0);
    }

    #[test]
    fn test_adam_first_step_moves_by_learning_rate() {
        // m_hat = g and v_hat = g² at t = 1, so the step is lr * g / (|g| + eps)
        let mut optimizer = Adam::new(0.001, 0.9, 0.999, 1e-8);
        let mut params = NDArray::full(&[1], 1.0);
        let grads = NDArray::full(&[1], 1.0);

        optimizer.update(ParamId::new(0), &mut params, &grads).unwrap();

        assert_relative_eq!(params.data()[0], 0.999, epsilon = 1e-6);
        let (m, v) = optimizer.moments(ParamId::new(0)).unwrap();
        assert_relative_eq!(m.data()[0], 0.1, epsilon = 1e-7);
        assert_relative_eq!(v.data()[0], 0.001, epsilon = 1e-7);
    }

    #[test]
    fn test_adam_keeps_state_per_parameter() {
        let mut optimizer = Adam::new(0.01, 0.9, 0.999, 1e-8);
        let mut weights = NDArray::full(&[2, 2], 1.0);
        let mut biases = NDArray::full(&[2], 1.0);

        optimizer
            .update(ParamId::new(0), &mut weights, &NDArray::full(&[2, 2], 0.5))
            .unwrap();
        optimizer
            .update(ParamId::new(1), &mut biases, &NDArray::full(&[2], -0.5))
            .unwrap();

        assert_eq!(optimizer.step(), 2);
        assert_eq!(optimizer.moments(ParamId::new(0)).unwrap().0.shape(), &[2, 2]);
        assert_eq!(optimizer.moments(ParamId::new(1)).unwrap().0.shape(), &[2]);
        assert!(weights.data().iter().all(|&w| w < 1.0));
        assert!(biases.data().iter().all(|&b| b > 1.0));
    }

    #[test]
    fn test_adam_step_counter_is_shared() {
        let mut optimizer = Adam::default();
        let mut a = NDArray::full(&[1], 1.0);
        let mut b = NDArray::full(&[1], 1.0);
        let g = NDArray::full(&[1], 1.0);

        optimizer.update(ParamId::new(0), &mut a, &g).unwrap();
        optimizer.update(ParamId::new(1), &mut b, &g).unwrap();

        // b saw t = 2: m_hat = 0.1 / 0.19, v_hat = 0.001 / 0.001999
        let m_hat = 0.1f32 / (1.0 - 0.9f32.powi(2));
        let v_hat = 0.001f32 / (1.0 - 0.999f32.powi(2));
        let expected = 1.0 - 0.001 * m_hat / (v_hat.sqrt() + 1e-8);
        assert_relative_eq!(b.data()[0], expected, epsilon = 1e-6);
    }

    #[test]
    fn test_adam_reset() {
        let mut optimizer = Adam::default();
        let mut params = NDArray::full(&[3], 1.0);
        let grads = NDArray::full(&[3], 0.1);

        optimizer.update(ParamId::new(0), &mut params, &grads).unwrap();
        optimizer.update(ParamId::new(0), &mut params, &grads).unwrap();
        assert_eq!(optimizer.step(), 2);

        optimizer.reset();

        assert_eq!(optimizer.step(), 0);
        assert!(optimizer.moments(ParamId::new(0)).is_none());
    }

    #[test]
    fn test_adam_mismatched_shapes() {
        let mut optimizer = Adam::default();
        let mut params = NDArray::zeros(&[3]);
        let grads = NDArray::zeros(&[2]);

        assert!(matches!(
            optimizer.update(ParamId::new(0), &mut params, &grads),
            Err(NnError::ShapeMismatch { .. })
        ));
        assert_eq!(optimizer.step(), 0);
    }

    #[test]
    fn test_adam_adaptive_step_is_gradient_scale_invariant() {
        let mut small = NDArray::full(&[1], 0.0);
        let mut large = NDArray::full(&[1], 0.0);
        Adam::default()
            .update(ParamId::new(0), &mut small, &NDArray::full(&[1], 0.01))
            .unwrap();
        Adam::default()
            .update(ParamId::new(0), &mut large, &NDArray::full(&[1], 100.0))
            .unwrap();
        assert_relative_eq!(small.data()[0], large.data()[0], epsilon = 1e-5);
    }
}
