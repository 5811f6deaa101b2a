//! 2D Convolutional layer implementation
//!
//! This module provides a Conv2DLayer that performs 2D convolution operations,
//! commonly used in computer vision tasks like image classification.

use crate::error::{NnError, Result};
use crate::initializer;
use crate::layers::{check_batched, Parameters, Propagate};
use crate::tensor::NDArray;
use crate::utils::{ActivationKind, SimpleRng};
use rayon::prelude::*;

/// 2D Convolutional layer with learnable filters.
///
/// Slides `num_filters` filters of size `filter_height × filter_width` over a
/// `[channels, height, width]` input with the given stride and symmetric zero
/// padding. Padding is simulated: taps that fall outside the input contribute
/// zero. Trailing partial windows are dropped:
///
/// `out = (in + 2 * padding - filter) / stride + 1`
///
/// # Fields
///
/// * `weights` - Filters `[num_filters, in_channels, filter_height, filter_width]`
/// * `biases` - One bias per filter `[num_filters]`
///
/// # Example
///
/// ```
/// use rust_cnn::layers::{Conv2DLayer, Propagate};
/// use rust_cnn::utils::{ActivationKind, SimpleRng};
///
/// let mut rng = SimpleRng::new(42);
/// // 8 filters of 3x3, stride 1, padding 1
/// let mut layer = Conv2DLayer::new(8, 3, 3, 1, 1, Some(ActivationKind::Relu));
/// let out = layer.resolve(&[1, 28, 28], &mut rng).unwrap();
/// assert_eq!(out, vec![8, 28, 28]);
/// ```
#[derive(Debug, Clone)]
pub struct Conv2DLayer {
    num_filters: usize,
    filter_height: usize,
    filter_width: usize,
    stride: usize,
    padding: usize,
    activation_hint: Option<ActivationKind>,
    // [channels, height, width] once resolved
    in_channels: usize,
    input_height: usize,
    input_width: usize,
    output_height: usize,
    output_width: usize,
    weights: NDArray,
    biases: NDArray,
    weight_gradient: NDArray,
    bias_gradient: NDArray,
}

/// Input coordinate hit by output position `out` and filter tap `tap`,
/// or `None` when the tap lands in the zero padding.
#[inline]
fn tap_index(out: usize, tap: usize, stride: usize, padding: usize, bound: usize) -> Option<usize> {
    let pos = (out * stride + tap).checked_sub(padding)?;
    (pos < bound).then_some(pos)
}

impl Conv2DLayer {
    pub fn new(
        num_filters: usize,
        filter_height: usize,
        filter_width: usize,
        stride: usize,
        padding: usize,
        activation_hint: Option<ActivationKind>,
    ) -> Self {
        Self {
            num_filters,
            filter_height,
            filter_width,
            stride,
            padding,
            activation_hint,
            in_channels: 0,
            input_height: 0,
            input_width: 0,
            output_height: 0,
            output_width: 0,
            weights: NDArray::default(),
            biases: NDArray::default(),
            weight_gradient: NDArray::default(),
            bias_gradient: NDArray::default(),
        }
    }

    pub fn num_filters(&self) -> usize {
        self.num_filters
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn padding(&self) -> usize {
        self.padding
    }

    /// Output height after convolution (0 until resolved).
    pub fn output_height(&self) -> usize {
        self.output_height
    }

    /// Output width after convolution (0 until resolved).
    pub fn output_width(&self) -> usize {
        self.output_width
    }

    pub fn weights(&self) -> &NDArray {
        &self.weights
    }

    pub fn weights_mut(&mut self) -> &mut NDArray {
        &mut self.weights
    }

    pub fn biases(&self) -> &NDArray {
        &self.biases
    }

    pub fn biases_mut(&mut self) -> &mut NDArray {
        &mut self.biases
    }

    pub fn weight_gradient(&self) -> &NDArray {
        &self.weight_gradient
    }

    pub fn bias_gradient(&self) -> &NDArray {
        &self.bias_gradient
    }

    /// Per-sample input and output shapes, once resolved.
    fn resolved_shapes(&self) -> Result<([usize; 3], [usize; 3])> {
        if self.weights.is_empty() {
            return Err(NnError::Unconfigured(
                "conv2d layer must be resolved before propagating".to_string(),
            ));
        }
        Ok((
            [self.in_channels, self.input_height, self.input_width],
            [self.num_filters, self.output_height, self.output_width],
        ))
    }
}

impl Propagate for Conv2DLayer {
    fn resolve(&mut self, input_shape: &[usize], rng: &mut SimpleRng) -> Result<Vec<usize>> {
        let &[channels, height, width] = input_shape else {
            return Err(NnError::UnsupportedConfiguration(format!(
                "conv2d expects a [channels, height, width] input, got {:?}",
                input_shape
            )));
        };
        if channels == 0
            || self.num_filters == 0
            || self.filter_height == 0
            || self.filter_width == 0
            || self.stride == 0
        {
            return Err(NnError::UnsupportedConfiguration(
                "conv2d channels, filters, filter size and stride must be greater than 0".to_string(),
            ));
        }
        if self.filter_height > height + 2 * self.padding || self.filter_width > width + 2 * self.padding {
            return Err(NnError::UnsupportedConfiguration(format!(
                "conv2d filter {}x{} does not fit padded input {}x{}",
                self.filter_height,
                self.filter_width,
                height + 2 * self.padding,
                width + 2 * self.padding
            )));
        }

        self.in_channels = channels;
        self.input_height = height;
        self.input_width = width;
        self.output_height = (height + 2 * self.padding - self.filter_height) / self.stride + 1;
        self.output_width = (width + 2 * self.padding - self.filter_width) / self.stride + 1;

        let weight_shape = [self.num_filters, channels, self.filter_height, self.filter_width];
        let taps = self.filter_height * self.filter_width;
        self.weights = NDArray::zeros(&weight_shape);
        initializer::for_activation(
            &mut self.weights,
            self.activation_hint,
            channels * taps,
            self.num_filters * taps,
            rng,
        );
        self.biases = NDArray::zeros(&[self.num_filters]);
        self.weight_gradient = NDArray::zeros(&weight_shape);
        self.bias_gradient = NDArray::zeros(&[self.num_filters]);

        Ok(vec![self.num_filters, self.output_height, self.output_width])
    }

    fn forward(&mut self, input: &NDArray, output: &mut NDArray) -> Result<()> {
        let (in_shape, out_shape) = self.resolved_shapes()?;
        let batch = input.shape().first().copied().unwrap_or(0);
        check_batched("conv2d forward input", input, batch, &in_shape)?;
        check_batched("conv2d forward output", output, batch, &out_shape)?;

        let (channels, height, width) = (self.in_channels, self.input_height, self.input_width);
        let (out_h, out_w) = (self.output_height, self.output_width);
        let (fh, fw) = (self.filter_height, self.filter_width);
        let (stride, padding) = (self.stride, self.padding);
        let in_len = channels * height * width;
        let weights = self.weights.data();
        let biases = self.biases.data();
        let x = input.data();

        output
            .data_mut()
            .par_chunks_mut(self.num_filters * out_h * out_w)
            .enumerate()
            .for_each(|(b, out_b)| {
                let x_b = &x[b * in_len..(b + 1) * in_len];
                for (f, out_f) in out_b.chunks_exact_mut(out_h * out_w).enumerate() {
                    let w_f = &weights[f * channels * fh * fw..(f + 1) * channels * fh * fw];
                    for oy in 0..out_h {
                        for ox in 0..out_w {
                            let mut sum = biases[f];
                            for c in 0..channels {
                                for ky in 0..fh {
                                    let Some(iy) = tap_index(oy, ky, stride, padding, height) else {
                                        continue;
                                    };
                                    for kx in 0..fw {
                                        let Some(ix) = tap_index(ox, kx, stride, padding, width) else {
                                            continue;
                                        };
                                        sum += w_f[(c * fh + ky) * fw + kx]
                                            * x_b[(c * height + iy) * width + ix];
                                    }
                                }
                            }
                            out_f[oy * out_w + ox] = sum;
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
        check_batched("conv2d backward input", input, batch, &in_shape)?;
        check_batched("conv2d backward gradient", grad_output, batch, &out_shape)?;
        check_batched("conv2d backward input gradient", grad_input, batch, &in_shape)?;

        let (channels, height, width) = (self.in_channels, self.input_height, self.input_width);
        let (out_h, out_w) = (self.output_height, self.output_width);
        let (fh, fw) = (self.filter_height, self.filter_width);
        let (stride, padding) = (self.stride, self.padding);
        let num_filters = self.num_filters;
        let in_len = channels * height * width;
        let out_len = num_filters * out_h * out_w;
        let filter_len = channels * fh * fw;
        let x = input.data();
        let grad = grad_output.data();

        // Input gradient: scatter every output gradient back through its
        // receptive window. One sample per task, so writes never overlap.
        let weights = self.weights.data();
        grad_input
            .data_mut()
            .par_chunks_mut(in_len)
            .enumerate()
            .for_each(|(b, gi_b)| {
                gi_b.iter_mut().for_each(|v| *v = 0.0);
                let g_b = &grad[b * out_len..(b + 1) * out_len];
                for f in 0..num_filters {
                    let w_f = &weights[f * filter_len..(f + 1) * filter_len];
                    for oy in 0..out_h {
                        for ox in 0..out_w {
                            let g = g_b[(f * out_h + oy) * out_w + ox];
                            if g == 0.0 {
                                continue;
                            }
                            for c in 0..channels {
                                for ky in 0..fh {
                                    let Some(iy) = tap_index(oy, ky, stride, padding, height) else {
                                        continue;
                                    };
                                    for kx in 0..fw {
                                        let Some(ix) = tap_index(ox, kx, stride, padding, width) else {
                                            continue;
                                        };
                                        gi_b[(c * height + iy) * width + ix] +=
                                            g * w_f[(c * fh + ky) * fw + kx];
                                    }
                                }
                            }
                        }
                    }
                }
            });

        // Weight and bias gradients: one filter per task.
        self.weight_gradient
            .data_mut()
            .par_chunks_mut(filter_len)
            .zip(self.bias_gradient.data_mut().par_iter_mut())
            .enumerate()
            .for_each(|(f, (wg_f, bg_f))| {
                wg_f.iter_mut().for_each(|v| *v = 0.0);
                *bg_f = 0.0;
                for b in 0..batch {
                    let x_b = &x[b * in_len..(b + 1) * in_len];
                    let g_bf = &grad[b * out_len + f * out_h * out_w..b * out_len + (f + 1) * out_h * out_w];
                    for oy in 0..out_h {
                        for ox in 0..out_w {
                            let g = g_bf[oy * out_w + ox];
                            *bg_f += g;
                            for c in 0..channels {
                                for ky in 0..fh {
                                    let Some(iy) = tap_index(oy, ky, stride, padding, height) else {
                                        continue;
                                    };
                                    for kx in 0..fw {
                                        let Some(ix) = tap_index(ox, kx, stride, padding, width) else {
                                            continue;
                                        };
                                        wg_f[(c * fh + ky) * fw + kx] +=
                                            g * x_b[(c * height + iy) * width + ix];
                                    }
                                }
                            }
                        }
                    }
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
