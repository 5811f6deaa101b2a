//! Rust CNN Library
//!
//! A CPU training engine for small convolutional networks: N-dimensional
//! arrays, convolution, pooling, dense and activation layers, a cross-entropy
//! loss, SGD and Adam, and a network orchestrator that compiles a layer stack
//! and trains it batch by batch.
//!
//! # Modules
//!
//! - `tensor`: `NDArray`, the strided array every component works on
//! - `arena`: indexed store owning the network's batch-sized buffers
//! - `layers`: `Propagate` trait, `Layer` wrapper and the concrete layer kinds
//! - `initializer`: fan-based parameter initializers
//! - `loss`: `Loss` trait and `CrossEntropyLoss`
//! - `optimizers`: `Optimizer` trait, `SGD`, `Adam`
//! - `network`: the `Network` orchestrator
//! - `utils`: RNG and activation kernels
//! - `config`: training configuration
//! - `architecture`: JSON architecture description and network building
//! - `data`: MNIST CSV loading
//!
//! # Example
//!
//! ```
//! use rust_cnn::layers::Layer;
//! use rust_cnn::loss::CrossEntropyLoss;
//! use rust_cnn::optimizers::Adam;
//! use rust_cnn::utils::ActivationKind;
//! use rust_cnn::{NDArray, Network};
//!
//! let mut network = Network::new();
//! network
//!     .add(Layer::conv2d(4, 3, 3, 1, 0, Some(ActivationKind::Relu)))
//!     .add(Layer::activation(ActivationKind::Relu))
//!     .add(Layer::max_pool(2, 2))
//!     .add(Layer::flatten())
//!     .add(Layer::dense(10, Some(ActivationKind::SoftmaxCrossEntropy)))
//!     .add(Layer::activation(ActivationKind::SoftmaxCrossEntropy))
//!     .set_input_shape(&[1, 8, 8]);
//! network
//!     .compile(Box::new(CrossEntropyLoss::new()), Box::new(Adam::default()))
//!     .unwrap();
//!
//! let probabilities = network.predict(&NDArray::zeros(&[2, 1, 8, 8])).unwrap();
//! assert_eq!(probabilities.shape(), &[2, 10]);
//! ```

pub mod architecture;
pub mod arena;
pub mod config;
pub mod data;
pub mod error;
pub mod initializer;
pub mod layers;
pub mod loss;
pub mod network;
pub mod optimizers;
pub mod tensor;
pub mod utils;

pub use error::{NnError, Result};
pub use network::{Evaluation, GradientReduction, Network, TrainingHistory};
pub use tensor::NDArray;
