//! Flatten layer: folds every non-batch dimension into one.

use crate::error::{NnError, Result};
use crate::layers::{check_batched, Propagate};
use crate::tensor::NDArray;
use crate::utils::SimpleRng;

#[derive(Debug, Clone, Default)]
pub struct FlattenLayer {
    // per-sample input shape, empty until resolved
    input_shape: Vec<usize>,
}

impl FlattenLayer {
    pub fn new() -> Self {
        Self::default()
    }

    fn resolved_shapes(&self) -> Result<(&[usize], [usize; 1])> {
        if self.input_shape.is_empty() {
            return Err(NnError::Unconfigured(
                "flatten layer must be resolved before propagating".to_string(),
            ));
        }
        Ok((self.input_shape.as_slice(), [self.input_shape.iter().product()]))
    }
}

impl Propagate for FlattenLayer {
    fn resolve(&mut self, input_shape: &[usize], _rng: &mut SimpleRng) -> Result<Vec<usize>> {
        if input_shape.is_empty() {
            return Err(NnError::UnsupportedConfiguration(
                "flatten needs at least one non-batch dimension".to_string(),
            ));
        }
        self.input_shape = input_shape.to_vec();
        Ok(vec![input_shape.iter().product()])
    }

    fn forward(&mut self, input: &NDArray, output: &mut NDArray) -> Result<()> {
        let (in_shape, out_shape) = self.resolved_shapes()?;
        let batch = input.shape().first().copied().unwrap_or(0);
        check_batched("flatten forward input", input, batch, in_shape)?;
        check_batched("flatten forward output", output, batch, &out_shape)?;
        output.data_mut().copy_from_slice(input.data());
        Ok(())
    }

    fn backward(
        &mut self,
        input: &NDArray,
        grad_output: &NDArray,
        grad_input: &mut NDArray,
    ) -> Result<()> {
        let (in_shape, out_shape) = self.resolved_shapes()?;
        let batch = input.shape().first().copied().unwrap_or(0);
        check_batched("flatten backward gradient", grad_output, batch, &out_shape)?;
        check_batched("flatten backward input gradient", grad_input, batch, in_shape)?;
        grad_input.data_mut().copy_from_slice(grad_output.data());
        Ok(())
    }
}
