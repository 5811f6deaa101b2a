//! Activation layer
//!
//! Stateless element-wise (or, for softmax, row-wise) transform. Softmax rows
//! span every non-batch dimension of the input.

use crate::error::{NnError, Result};
use crate::layers::{check_batched, Propagate};
use crate::tensor::NDArray;
use crate::utils::activations::{
    relu, relu_derivative, sigmoid_derivative, sigmoid_slice, softmax_derivative_rows, softmax_rows,
};
use crate::utils::{ActivationKind, SimpleRng};

#[derive(Debug, Clone)]
pub struct ActivationLayer {
    kind: ActivationKind,
    shape: Option<Vec<usize>>,
}

impl ActivationLayer {
    pub fn new(kind: ActivationKind) -> Self {
        Self { kind, shape: None }
    }

    pub fn kind(&self) -> ActivationKind {
        self.kind
    }

    fn resolved_shape(&self) -> Result<&[usize]> {
        self.shape.as_deref().ok_or_else(|| {
            NnError::Unconfigured("activation layer must be resolved before propagating".to_string())
        })
    }
}

impl Propagate for ActivationLayer {
    fn resolve(&mut self, input_shape: &[usize], _rng: &mut SimpleRng) -> Result<Vec<usize>> {
        self.shape = Some(input_shape.to_vec());
        Ok(input_shape.to_vec())
    }

    fn forward(&mut self, input: &NDArray, output: &mut NDArray) -> Result<()> {
        let shape = self.resolved_shape()?;
        let batch = input.shape().first().copied().unwrap_or(0);
        check_batched("activation forward input", input, batch, shape)?;
        check_batched("activation forward output", output, batch, shape)?;

        let cols = input.sample_len();
        match self.kind {
            ActivationKind::Relu => relu(input.data(), output.data_mut()),
            ActivationKind::Sigmoid => sigmoid_slice(input.data(), output.data_mut()),
            ActivationKind::Softmax | ActivationKind::SoftmaxCrossEntropy => {
                softmax_rows(input.data(), output.data_mut(), cols)
            }
        }
        Ok(())
    }

    fn backward(
        &mut self,
        input: &NDArray,
        grad_output: &NDArray,
        grad_input: &mut NDArray,
    ) -> Result<()> {
        let shape = self.resolved_shape()?;
        let batch = input.shape().first().copied().unwrap_or(0);
        check_batched("activation backward input", input, batch, shape)?;
        check_batched("activation backward gradient", grad_output, batch, shape)?;
        check_batched("activation backward input gradient", grad_input, batch, shape)?;

        let cols = input.sample_len();
        match self.kind {
            ActivationKind::Relu => relu_derivative(input.data(), grad_input.data_mut()),
            ActivationKind::Sigmoid => sigmoid_derivative(input.data(), grad_input.data_mut()),
            ActivationKind::Softmax => {
                softmax_derivative_rows(input.data(), grad_input.data_mut(), cols)
            }
            // the paired loss already produced `predictions - labels`
            ActivationKind::SoftmaxCrossEntropy => {
                grad_input.data_mut().copy_from_slice(grad_output.data());
                return Ok(());
            }
        }
        for (gi, &g) in grad_input.data_mut().iter_mut().zip(grad_output.data()) {
            *gi *= g;
        }
        Ok(())
    }
}
