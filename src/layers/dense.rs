//! Dense (fully connected) layer implementation
//!
//! This module provides a DenseLayer (also known as Linear or Fully Connected layer)
//! that performs the transformation: output = input × weights + biases

use crate::error::{NnError, Result};
use crate::initializer;
use crate::layers::{batch_dim, check_batched, Parameters, Propagate};
use crate::tensor::NDArray;
use crate::utils::{ActivationKind, SimpleRng};
use rayon::prelude::*;

/// Dense (fully connected) layer with weights and biases.
///
/// Performs the linear transformation: y = xW + b
/// where x is the input (batch_size × input_size),
/// W is the weight matrix (input_size × output_size),
/// and b is the bias vector (output_size).
///
/// Inputs of any rank are accepted: every non-batch dimension is folded into
/// `input_size` through the input's batch stride, so no explicit flatten is
/// required in front of this layer.
///
/// Gradients are summed over the batch.
#[derive(Debug, Clone)]
pub struct DenseLayer {
    input_size: usize,
    output_size: usize,
    activation_hint: Option<ActivationKind>,
    weights: NDArray,
    biases: NDArray,
    weight_gradient: NDArray,
    bias_gradient: NDArray,
}

impl DenseLayer {
    /// Create an unresolved dense layer producing `output_size` features.
    ///
    /// `activation_hint` names the activation that follows this layer and
    /// selects the weight initializer.
    pub fn new(output_size: usize, activation_hint: Option<ActivationKind>) -> Self {
        Self {
            input_size: 0,
            output_size,
            activation_hint,
            weights: NDArray::default(),
            biases: NDArray::default(),
            weight_gradient: NDArray::default(),
            bias_gradient: NDArray::default(),
        }
    }

    /// Get the input size of the layer (0 until resolved).
    pub fn input_size(&self) -> usize {
        self.input_size
    }

    /// Get the output size of the layer.
    pub fn output_size(&self) -> usize {
        self.output_size
    }

    pub fn weights(&self) -> &NDArray {
        &self.weights
    }

    pub fn biases(&self) -> &NDArray {
        &self.biases
    }

    pub fn weight_gradient(&self) -> &NDArray {
        &self.weight_gradient
    }

    pub fn bias_gradient(&self) -> &NDArray {
        &self.bias_gradient
    }

    /// Mutable access to the weights, for callers loading known values.
    pub fn weights_mut(&mut self) -> &mut NDArray {
        &mut self.weights
    }

    pub fn biases_mut(&mut self) -> &mut NDArray {
        &mut self.biases
    }

    fn check_resolved(&self) -> Result<()> {
        if self.input_size == 0 {
            return Err(NnError::Unconfigured(
                "dense layer must be resolved before propagating".to_string(),
            ));
        }
        Ok(())
    }
}

impl Propagate for DenseLayer {
    fn resolve(&mut self, input_shape: &[usize], rng: &mut SimpleRng) -> Result<Vec<usize>> {
        let input_size: usize = input_shape.iter().product();
        if input_size == 0 || self.output_size == 0 {
            return Err(NnError::UnsupportedConfiguration(format!(
                "dense layer needs non-empty input and output, got input {:?} and output size {}",
                input_shape, self.output_size
            )));
        }
        self.input_size = input_size;

        self.weights = NDArray::zeros(&[input_size, self.output_size]);
        initializer::for_activation(
            &mut self.weights,
            self.activation_hint,
            input_size,
            self.output_size,
            rng,
        );
        self.biases = NDArray::zeros(&[self.output_size]);
        self.weight_gradient = NDArray::zeros(&[input_size, self.output_size]);
        self.bias_gradient = NDArray::zeros(&[self.output_size]);

        Ok(vec![self.output_size])
    }

    fn forward(&mut self, input: &NDArray, output: &mut NDArray) -> Result<()> {
        self.check_resolved()?;
        let batch = batch_dim("dense forward input", input, self.input_size)?;
        check_batched("dense forward output", output, batch, &[self.output_size])?;

        let in_size = self.input_size;
        let out_size = self.output_size;
        let row_stride = input.strides()[0];
        let weights = self.weights.data();
        let biases = self.biases.data();

        output
            .data_mut()
            .par_chunks_mut(out_size)
            .zip(input.data().par_chunks(row_stride))
            .for_each(|(out_row, in_row)| {
                out_row.copy_from_slice(biases);
                for (j, &x) in in_row.iter().enumerate().take(in_size) {
                    let w_row = &weights[j * out_size..(j + 1) * out_size];
                    for (o, &w) in out_row.iter_mut().zip(w_row) {
                        *o += x * w;
                    }
                }
            });
        Ok(())
    }

    fn backward(
        &mut self,
        input: &NDArray,
        grad_output: &NDArray,
        grad_input: &mut NDArray,
    ) -> Result<()> {
        self.check_resolved()?;
        let batch = batch_dim("dense backward input", input, self.input_size)?;
        check_batched("dense backward gradient", grad_output, batch, &[self.output_size])?;
        if grad_input.shape() != input.shape() {
            return Err(NnError::shape_mismatch(
                "dense backward input gradient",
                input.shape(),
                grad_input.shape(),
            ));
        }

        let in_size = self.input_size;
        let out_size = self.output_size;
        let x = input.data();
        let grad = grad_output.data();

        // bias_gradient[i] = Σ_b grad[b, i]
        self.bias_gradient.zero();
        let bias_gradient = self.bias_gradient.data_mut();
        for g_row in grad.chunks_exact(out_size) {
            for (bg, &g) in bias_gradient.iter_mut().zip(g_row) {
                *bg += g;
            }
        }

        // weight_gradient[j, i] = Σ_b input[b, j] * grad[b, i], one weight row per task
        self.weight_gradient
            .data_mut()
            .par_chunks_mut(out_size)
            .enumerate()
            .for_each(|(j, wg_row)| {
                wg_row.iter_mut().for_each(|v| *v = 0.0);
                for b in 0..batch {
                    let xj = x[b * in_size + j];
                    let g_row = &grad[b * out_size..(b + 1) * out_size];
                    for (wg, &g) in wg_row.iter_mut().zip(g_row) {
                        *wg += xj * g;
                    }
                }
            });

        // input_gradient[b, j] = Σ_i weight[j, i] * grad[b, i], one sample per task
        let weights = self.weights.data();
        grad_input
            .data_mut()
            .par_chunks_mut(in_size)
            .zip(grad.par_chunks(out_size))
            .for_each(|(gi_row, g_row)| {
                for (j, gi) in gi_row.iter_mut().enumerate() {
                    let w_row = &weights[j * out_size..(j + 1) * out_size];
                    *gi = w_row.iter().zip(g_row).map(|(w, g)| w * g).sum();
                }
            });
        Ok(())
    }

    fn parameters(&mut self) -> Option<Parameters<'_>> {
        Some(Parameters {
            weights: &mut self.weights,
            weight_gradient: &self.weight_gradient,
            biases: &mut self.biases,
            bias_gradient: &self.bias_gradient,
        })
    }

    fn parameter_count(&self) -> usize {
        self.weights.len() + self.biases.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn resolved(input: usize, output: usize) -> DenseLayer {
        let mut rng = SimpleRng::new(42);
        let mut layer = DenseLayer::new(output, Some(ActivationKind::Relu));
        layer.resolve(&[input], &mut rng).unwrap();
        layer
    }

    #[test]
    fn test_dense_layer_resolution() {
        let layer = resolved(10, 5);

        assert_eq!(layer.input_size(), 10);
        assert_eq!(layer.output_size(), 5);
        assert_eq!(layer.weights().shape(), &[10, 5]);
        assert_eq!(layer.biases().shape(), &[5]);
        assert_eq!(layer.parameter_count(), 55);
    }

    #[test]
    fn test_dense_resolves_multidimensional_input() {
        let mut rng = SimpleRng::new(1);
        let mut layer = DenseLayer::new(4, None);
        let out = layer.resolve(&[2, 3, 3], &mut rng).unwrap();
        assert_eq!(out, vec![4]);
        assert_eq!(layer.input_size(), 18);
    }

    #[test]
    fn test_dense_rejects_zero_output() {
        let mut rng = SimpleRng::new(1);
        let mut layer = DenseLayer::new(0, None);
        assert!(matches!(
            layer.resolve(&[3], &mut rng),
            Err(NnError::UnsupportedConfiguration(_))
        ));
    }

    #[test]
    fn test_dense_forward_known_values() {
        let mut layer = resolved(2, 2);
        *layer.weights_mut() = NDArray::from_vec(&[2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        *layer.biases_mut() = NDArray::from_vec(&[2], vec![0.5, -0.5]).unwrap();

        let input = NDArray::from_vec(&[2, 2], vec![1.0, 1.0, 2.0, 0.0]).unwrap();
        let mut output = NDArray::zeros(&[2, 2]);
        layer.forward(&input, &mut output).unwrap();

        // [1,1]·W + b = [4.5, 5.5]; [2,0]·W + b = [2.5, 3.5]
        assert_eq!(output.data(), &[4.5, 5.5, 2.5, 3.5]);
    }

    #[test]
    fn test_dense_backward_known_values() {
        let mut layer = resolved(2, 2);
        *layer.weights_mut() = NDArray::from_vec(&[2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();

        let input = NDArray::from_vec(&[2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let grad = NDArray::from_vec(&[2, 2], vec![1.0, 0.0, 0.0, 1.0]).unwrap();
        let mut grad_input = NDArray::zeros(&[2, 2]);
        layer.backward(&input, &grad, &mut grad_input).unwrap();

        assert_eq!(layer.bias_gradient().data(), &[1.0, 1.0]);
        // wg[j][i] = Σ_b x[b][j] g[b][i]
        assert_eq!(layer.weight_gradient().data(), &[1.0, 3.0, 2.0, 4.0]);
        // gi[b][j] = Σ_i w[j][i] g[b][i]
        assert_eq!(grad_input.data(), &[1.0, 3.0, 2.0, 4.0]);
    }

    #[test]
    fn test_dense_backward_overwrites_previous_gradients() {
        let mut layer = resolved(3, 2);
        let input = NDArray::full(&[1, 3], 1.0);
        let grad = NDArray::full(&[1, 2], 1.0);
        let mut grad_input = NDArray::zeros(&[1, 3]);

        layer.backward(&input, &grad, &mut grad_input).unwrap();
        let first = layer.weight_gradient().clone();
        layer.backward(&input, &grad, &mut grad_input).unwrap();

        assert_eq!(layer.weight_gradient(), &first);
        assert_relative_eq!(layer.bias_gradient().sum(), 2.0);
    }

    #[test]
    fn test_dense_propagate_before_resolve() {
        let mut layer = DenseLayer::new(3, None);
        let input = NDArray::zeros(&[2, 4]);
        let mut output = NDArray::zeros(&[2, 3]);
        assert!(matches!(
            layer.forward(&input, &mut output),
            Err(NnError::Unconfigured(_))
        ));
        let mut grad_input = NDArray::zeros(&[2, 4]);
        assert!(matches!(
            layer.backward(&input, &output, &mut grad_input),
            Err(NnError::Unconfigured(_))
        ));
    }

    #[test]
    fn test_dense_rejects_mismatched_tensors() {
        let mut layer = resolved(4, 3);
        let input = NDArray::full(&[2, 4], 1.0);
        let mut output = NDArray::zeros(&[2, 3]);

        assert!(matches!(
            layer.forward(&NDArray::zeros(&[2, 5]), &mut output),
            Err(NnError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            layer.forward(&NDArray::zeros(&[8]), &mut output),
            Err(NnError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            layer.forward(&input, &mut NDArray::zeros(&[3, 3])),
            Err(NnError::ShapeMismatch { .. })
        ));

        // a gradient for three samples against a two-sample input
        let mut grad_input = NDArray::zeros(&[2, 4]);
        assert!(matches!(
            layer.backward(&input, &NDArray::full(&[3, 3], 1.0), &mut grad_input),
            Err(NnError::ShapeMismatch { .. })
        ));
        assert!(layer.bias_gradient().data().iter().all(|&g| g == 0.0));
        assert!(matches!(
            layer.backward(&input, &output, &mut NDArray::zeros(&[2, 2, 2])),
            Err(NnError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_dense_accepts_unflattened_input() {
        let mut rng = SimpleRng::new(5);
        let mut layer = DenseLayer::new(2, None);
        layer.resolve(&[2, 2], &mut rng).unwrap();

        let input = NDArray::full(&[3, 2, 2], 1.0);
        let mut output = NDArray::zeros(&[3, 2]);
        layer.forward(&input, &mut output).unwrap();
        let mut grad_input = NDArray::zeros(&[3, 2, 2]);
        layer.backward(&input, &output, &mut grad_input).unwrap();
        assert_eq!(layer.weight_gradient().shape(), &[4, 2]);
    }

    #[test]
    fn test_deterministic_initialization() {
        let layer1 = resolved(10, 5);
        let layer2 = resolved(10, 5);

        assert_eq!(layer1.weights(), layer2.weights());
        assert_eq!(layer1.biases(), layer2.biases());
        assert!(layer1.biases().data().iter().all(|&b| b == 0.0));
    }
}
