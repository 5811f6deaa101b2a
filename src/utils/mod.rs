//! Shared utilities for the engine
//!
//! This module provides the seedable random number generator and the
//! activation-function kernels used by the layers.

pub mod activations;
pub mod rng;

pub use activations::ActivationKind;
pub use rng::SimpleRng;
