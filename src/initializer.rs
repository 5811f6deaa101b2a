//! Parameter initialization
//!
//! Weight tensors are filled according to the activation the layer feeds:
//! He for ReLU, Xavier for sigmoid/softmax, and the uniform fallback for
//! everything else (no hint, or softmax paired with cross-entropy). All
//! samplers draw from the caller's [`SimpleRng`].

use crate::tensor::NDArray;
use crate::utils::{ActivationKind, SimpleRng};

/// Uniform in `[-limit, limit]` with `limit = sqrt(1 / fan_in)`.
pub fn uniform(weights: &mut NDArray, fan_in: usize, rng: &mut SimpleRng) {
    let limit = (1.0 / fan_in.max(1) as f32).sqrt();
    weights.apply(|_| rng.gen_range_f32(-limit, limit));
}

/// He initialization: normal with std `sqrt(2 / fan_in)`.
pub fn he(weights: &mut NDArray, fan_in: usize, rng: &mut SimpleRng) {
    let std_dev = (2.0 / fan_in.max(1) as f32).sqrt();
    weights.apply(|_| rng.gen_normal_f32(0.0, std_dev));
}

/// Xavier/Glorot initialization: normal with std `sqrt(2 / (fan_in + fan_out))`.
pub fn xavier(weights: &mut NDArray, fan_in: usize, fan_out: usize, rng: &mut SimpleRng) {
    let std_dev = (2.0 / (fan_in + fan_out).max(1) as f32).sqrt();
    weights.apply(|_| rng.gen_normal_f32(0.0, std_dev));
}

/// Pick the initializer for a layer from its activation hint.
pub fn for_activation(
    weights: &mut NDArray,
    hint: Option<ActivationKind>,
    fan_in: usize,
    fan_out: usize,
    rng: &mut SimpleRng,
) {
    match hint {
        Some(ActivationKind::Relu) => he(weights, fan_in, rng),
        Some(ActivationKind::Sigmoid | ActivationKind::Softmax) => {
            xavier(weights, fan_in, fan_out, rng)
        }
        Some(ActivationKind::SoftmaxCrossEntropy) | None => uniform(weights, fan_in, rng),
    }
}
