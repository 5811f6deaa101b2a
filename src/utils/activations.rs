//! Activation functions for neural networks
//!
//! [`ActivationKind`] names the supported activations; the free functions are
//! the slice kernels used by the activation layer:
//! - ReLU and its derivative
//! - Sigmoid and its derivative
//! - Row-wise softmax, its diagonal derivative and its full Jacobian

use crate::error::{NnError, Result};
use std::fmt;
use std::str::FromStr;

/// Lower bound applied to softmax exponentials and row sums.
const SOFTMAX_FLOOR: f32 = 1e-20;

/// Activation kinds understood by the activation layer and by the
/// initializer selection of parameterized layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationKind {
    Relu,
    Sigmoid,
    Softmax,
    /// Softmax whose backward pass is the identity, for use as the last layer
    /// in front of [`CrossEntropyLoss`](crate::loss::CrossEntropyLoss).
    SoftmaxCrossEntropy,
}

impl FromStr for ActivationKind {
    type Err = NnError;

    fn from_str(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "relu" => Ok(ActivationKind::Relu),
            "sigmoid" => Ok(ActivationKind::Sigmoid),
            "softmax" => Ok(ActivationKind::Softmax),
            "softmax_cel" | "softmax_cross_entropy" => Ok(ActivationKind::SoftmaxCrossEntropy),
            _ => Err(NnError::UnsupportedConfiguration(format!(
                "unknown activation function '{}', expected one of: relu, sigmoid, softmax, softmax_cross_entropy",
                name
            ))),
        }
    }
}

impl fmt::Display for ActivationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActivationKind::Relu => "relu",
            ActivationKind::Sigmoid => "sigmoid",
            ActivationKind::Softmax => "softmax",
            ActivationKind::SoftmaxCrossEntropy => "softmax_cross_entropy",
        };
        f.write_str(name)
    }
}

/// Sigmoid of a single value: 1 / (1 + exp(-x))
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// `out[i] = max(0, input[i])`
pub fn relu(input: &[f32], out: &mut [f32]) {
    for (o, &x) in out.iter_mut().zip(input) {
        *o = x.max(0.0);
    }
}

/// `out[i] = 1` where `input[i] > 0`, else `0`.
pub fn relu_derivative(input: &[f32], out: &mut [f32]) {
    for (o, &x) in out.iter_mut().zip(input) {
        *o = if x > 0.0 { 1.0 } else { 0.0 };
    }
}

pub fn sigmoid_slice(input: &[f32], out: &mut [f32]) {
    for (o, &x) in out.iter_mut().zip(input) {
        *o = sigmoid(x);
    }
}

/// `out[i] = s * (1 - s)` with `s = sigmoid(input[i])`.
pub fn sigmoid_derivative(input: &[f32], out: &mut [f32]) {
    for (o, &x) in out.iter_mut().zip(input) {
        let s = sigmoid(x);
        *o = s * (1.0 - s);
    }
}

/// Softmax applied independently to each row of length `cols`.
///
/// The row maximum is subtracted before exponentiating, and exponentials and
/// row sums are floored away from zero, so rows stay finite and sum to one for
/// any finite input.
pub fn softmax_rows(input: &[f32], out: &mut [f32], cols: usize) {
    if cols == 0 {
        return;
    }
    for (row_in, row_out) in input.chunks_exact(cols).zip(out.chunks_exact_mut(cols)) {
        let max_value = row_in.iter().copied().fold(f32::NEG_INFINITY, f32::max);

        let mut sum = 0.0f32;
        for (o, &x) in row_out.iter_mut().zip(row_in) {
            *o = (x - max_value).exp().max(SOFTMAX_FLOOR);
            sum += *o;
        }

        let inv_sum = 1.0 / sum.max(SOFTMAX_FLOOR);
        for o in row_out.iter_mut() {
            *o *= inv_sum;
        }
    }
}

/// Diagonal of the softmax Jacobian per row: `s * (1 - s)`.
pub fn softmax_derivative_rows(input: &[f32], out: &mut [f32], cols: usize) {
    softmax_rows(input, out, cols);
    for s in out.iter_mut() {
        *s *= 1.0 - *s;
    }
}

/// Full softmax Jacobian of a single row, `cols × cols` row-major:
/// `J[i][j] = s_i (δ_ij - s_j)`.
pub fn softmax_jacobian(row: &[f32]) -> Vec<f32> {
    let n = row.len();
    let mut s = vec![0.0; n];
    softmax_rows(row, &mut s, n);

    let mut jacobian = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..n {
            jacobian[i * n + j] = if i == j {
                s[i] * (1.0 - s[i])
            } else {
                -s[i] * s[j]
            };
        }
    }
    jacobian
}
