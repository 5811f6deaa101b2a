//! Max pooling layer
//!
//! Forward records, for every output cell, the flat input offset of the
//! maximum it selected. Backward routes each output gradient to exactly that
//! offset and leaves every other input position at zero.

use crate::error::{NnError, Result};
use crate::layers::{check_batched, Propagate};
use crate::tensor::NDArray;
use crate::utils::SimpleRng;
use rayon::prelude::*;

/// 2D max pooling over `[channels, height, width]` inputs without padding.
#[derive(Debug, Clone)]
pub struct MaxPool2DLayer {
    window_size: usize,
    stride: usize,
    channels: usize,
    input_height: usize,
    input_width: usize,
    output_height: usize,
    output_width: usize,
    /// Flat offsets into the batched input, one per output element.
    max_indices: Vec<usize>,
}

impl MaxPool2DLayer {
    pub fn new(window_size: usize, stride: usize) -> Self {
        Self {
            window_size,
            stride,
            channels: 0,
            input_height: 0,
            input_width: 0,
            output_height: 0,
            output_width: 0,
            max_indices: Vec::new(),
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Input offsets selected by the last forward pass, laid out like the output.
    pub fn max_indices(&self) -> &[usize] {
        &self.max_indices
    }

    fn resolved_shapes(&self) -> Result<([usize; 3], [usize; 3])> {
        if self.channels == 0 {
            return Err(NnError::Unconfigured(
                "max pooling layer must be resolved before propagating".to_string(),
            ));
        }
        Ok((
            [self.channels, self.input_height, self.input_width],
            [self.channels, self.output_height, self.output_width],
        ))
    }
}

impl Propagate for MaxPool2DLayer {
    fn resolve(&mut self, input_shape: &[usize], _rng: &mut SimpleRng) -> Result<Vec<usize>> {
        let &[channels, height, width] = input_shape else {
            return Err(NnError::UnsupportedConfiguration(format!(
                "max pooling expects a [channels, height, width] input, got {:?}",
                input_shape
            )));
        };
        if channels == 0 || self.window_size == 0 || self.stride == 0 {
            return Err(NnError::UnsupportedConfiguration(
                "pooling channels, window and stride must be greater than 0".to_string(),
            ));
        }
        if self.window_size > height || self.window_size > width {
            return Err(NnError::UnsupportedConfiguration(format!(
                "pooling window {} does not fit input {}x{}",
                self.window_size, height, width
            )));
        }

        self.channels = channels;
        self.input_height = height;
        self.input_width = width;
        self.output_height = (height - self.window_size) / self.stride + 1;
        self.output_width = (width - self.window_size) / self.stride + 1;

        Ok(vec![channels, self.output_height, self.output_width])
    }

    fn bind(&mut self, batch_size: usize) -> Result<()> {
        self.max_indices = vec![0; batch_size * self.channels * self.output_height * self.output_width];
        Ok(())
    }

    fn forward(&mut self, input: &NDArray, output: &mut NDArray) -> Result<()> {
        let (in_shape, out_shape) = self.resolved_shapes()?;
        let batch = input.shape().first().copied().unwrap_or(0);
        check_batched("max pooling forward input", input, batch, &in_shape)?;
        check_batched("max pooling forward output", output, batch, &out_shape)?;
        if self.max_indices.len() != output.len() {
            return Err(NnError::Unconfigured(
                "max pooling indices are not allocated for this batch size".to_string(),
            ));
        }
        let (channels, height, width) = (self.channels, self.input_height, self.input_width);
        let (out_h, out_w) = (self.output_height, self.output_width);
        let (window, stride) = (self.window_size, self.stride);
        let in_len = channels * height * width;
        let out_len = channels * out_h * out_w;
        let x = input.data();

        output
            .data_mut()
            .par_chunks_mut(out_len)
            .zip(self.max_indices.par_chunks_mut(out_len))
            .enumerate()
            .for_each(|(b, (out_b, idx_b))| {
                for c in 0..channels {
                    let plane = b * in_len + c * height * width;
                    for oy in 0..out_h {
                        for ox in 0..out_w {
                            let mut best = f32::NEG_INFINITY;
                            let mut best_offset = plane + oy * stride * width + ox * stride;
                            for ky in 0..window {
                                let row = plane + (oy * stride + ky) * width + ox * stride;
                                for offset in row..row + window {
                                    if x[offset] > best {
                                        best = x[offset];
                                        best_offset = offset;
                                    }
                                }
                            }
                            let cell = (c * out_h + oy) * out_w + ox;
                            out_b[cell] = best;
                            idx_b[cell] = best_offset;
                        }
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
        let (in_shape, out_shape) = self.resolved_shapes()?;
        let batch = input.shape().first().copied().unwrap_or(0);
        check_batched("max pooling backward gradient", grad_output, batch, &out_shape)?;
        check_batched("max pooling backward input gradient", grad_input, batch, &in_shape)?;
        if self.max_indices.len() != grad_output.len() {
            return Err(NnError::Unconfigured(
                "max pooling backward called without a matching forward pass".to_string(),
            ));
        }
        let in_len = self.channels * self.input_height * self.input_width;
        let out_len = self.channels * self.output_height * self.output_width;

        grad_input
            .data_mut()
            .par_chunks_mut(in_len)
            .zip(grad_output.data().par_chunks(out_len))
            .zip(self.max_indices.par_chunks(out_len))
            .enumerate()
            .for_each(|(b, ((gi_b, g_b), idx_b))| {
                gi_b.iter_mut().for_each(|v| *v = 0.0);
                let base = b * in_len;
                // accumulate: overlapping windows may pick the same input cell
                for (&g, &offset) in g_b.iter().zip(idx_b) {
                    gi_b[offset - base] += g;
                }
            });
        Ok(())
    }
}
