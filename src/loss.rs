//! Loss functions
//!
//! A loss compares the network's final-layer output with one-hot labels and
//! produces the gradient that seeds the backward pass.

use crate::error::{NnError, Result};
use crate::tensor::NDArray;

/// Lower clamp applied to predictions before taking the logarithm.
pub const PREDICTION_FLOOR: f32 = 1e-7;

/// Scalar loss plus its gradient with respect to the predictions.
pub trait Loss: Send {
    /// Mean loss over the batch rows of `predictions`.
    fn compute(&self, labels: &NDArray, predictions: &NDArray) -> Result<f32>;

    /// Gradient with respect to the predictions, same shape as `predictions`.
    fn backward(&self, labels: &NDArray, predictions: &NDArray) -> Result<NDArray>;
}

/// Categorical cross-entropy over softmax probabilities.
///
/// `compute` returns `-Σ labels · ln(clamp(p, 1e-7, 1 - 1e-7)) / batch_size`.
/// `backward` returns `predictions - labels`, the combined softmax plus
/// cross-entropy gradient with respect to the pre-softmax logits. It must be
/// paired with a final `SoftmaxCrossEntropy` activation, whose own backward
/// passes this gradient through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossEntropyLoss;

impl CrossEntropyLoss {
    pub fn new() -> Self {
        Self
    }
}

fn check_pair(labels: &NDArray, predictions: &NDArray) -> Result<()> {
    if labels.shape() != predictions.shape() {
        return Err(NnError::shape_mismatch("loss", predictions.shape(), labels.shape()));
    }
    Ok(())
}

impl Loss for CrossEntropyLoss {
    fn compute(&self, labels: &NDArray, predictions: &NDArray) -> Result<f32> {
        check_pair(labels, predictions)?;
        let batch_size = predictions.shape().first().copied().unwrap_or(1).max(1);
        let total: f32 = labels
            .data()
            .iter()
            .zip(predictions.data())
            .map(|(&y, &p)| y * p.clamp(PREDICTION_FLOOR, 1.0 - PREDICTION_FLOOR).ln())
            .sum();
        Ok(-total / batch_size as f32)
    }

    fn backward(&self, labels: &NDArray, predictions: &NDArray) -> Result<NDArray> {
        check_pair(labels, predictions)?;
        predictions.sub(labels)
    }
}
