//! Architecture configuration structures
//!
//! Network architectures can be described in JSON and turned into an
//! uncompiled [`Network`], so layer stacks can be changed without code edits.
//! Shape compatibility between consecutive layers is checked later by
//! [`Network::compile`].

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{NnError, Result};
use crate::layers::Layer;
use crate::network::Network;
use crate::utils::ActivationKind;

/// Configuration for a single layer.
///
/// Fields used per `layer_type`:
///
/// - **conv2d**: `out_channels`, `kernel_size` (square), optional `stride`
///   (default 1), `padding` (default 0), `activation` (initializer hint)
/// - **dense**: `output_size`, optional `activation` (initializer hint)
/// - **max_pool**: `window_size`, optional `stride` (default: `window_size`)
/// - **activation**: `activation`
/// - **flatten**: no fields
///
/// # Examples
///
/// ```json
/// { "layer_type": "conv2d", "out_channels": 32, "kernel_size": 3, "activation": "relu" }
/// ```
///
/// ```json
/// { "layer_type": "activation", "activation": "softmax_cross_entropy" }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LayerConfig {
    /// "conv2d", "dense", "max_pool", "activation" or "flatten"
    pub layer_type: String,

    // Conv2D
    pub out_channels: Option<usize>,
    pub kernel_size: Option<usize>,
    pub padding: Option<usize>,

    // Conv2D and MaxPool
    pub stride: Option<usize>,

    // Dense
    pub output_size: Option<usize>,

    // MaxPool
    pub window_size: Option<usize>,

    /// Activation name for activation layers; initializer hint for conv2d and dense
    pub activation: Option<String>,
}

/// Configuration for the entire network.
///
/// # Example
///
/// ```json
/// {
///   "input_shape": [1, 28, 28],
///   "layers": [
///     { "layer_type": "conv2d", "out_channels": 8, "kernel_size": 3, "activation": "relu" },
///     { "layer_type": "activation", "activation": "relu" },
///     { "layer_type": "max_pool", "window_size": 2 },
///     { "layer_type": "flatten" },
///     { "layer_type": "dense", "output_size": 10, "activation": "softmax_cross_entropy" },
///     { "layer_type": "activation", "activation": "softmax_cross_entropy" }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ArchitectureConfig {
    /// Per-sample input shape, batch dimension excluded
    pub input_shape: Vec<usize>,
    /// Layers in forward order
    pub layers: Vec<LayerConfig>,
}

/// Loads an architecture configuration from a JSON file and validates it.
///
/// # Examples
///
/// ```no_run
/// use rust_cnn::architecture::load_architecture;
///
/// let arch = load_architecture("config/architectures/mnist_cnn.json").unwrap();
/// assert!(!arch.layers.is_empty());
/// ```
pub fn load_architecture(path: impl AsRef<Path>) -> Result<ArchitectureConfig> {
    let contents = fs::read_to_string(path)?;
    let config: ArchitectureConfig = serde_json::from_str(&contents)?;
    validate_architecture(&config)?;
    Ok(config)
}

fn invalid(index: usize, message: impl std::fmt::Display) -> NnError {
    NnError::UnsupportedConfiguration(format!("Layer {}: {}", index, message))
}

fn required(value: Option<usize>, index: usize, layer: &str, field: &str) -> Result<usize> {
    match value {
        None => Err(invalid(index, format!("{} layer requires '{}'", layer, field))),
        Some(0) => Err(invalid(index, format!("{} must be greater than 0", field))),
        Some(v) => Ok(v),
    }
}

fn positive_or(value: Option<usize>, default: usize, index: usize, field: &str) -> Result<usize> {
    match value {
        Some(0) => Err(invalid(index, format!("{} must be greater than 0", field))),
        Some(v) => Ok(v),
        None => Ok(default),
    }
}

fn activation_hint(config: &LayerConfig, index: usize) -> Result<Option<ActivationKind>> {
    config
        .activation
        .as_deref()
        .map(|name| {
            name.parse()
                .map_err(|_| invalid(index, format!("Unknown activation: {}", name)))
        })
        .transpose()
}

/// Translate one layer configuration into a [`Layer`].
fn layer_from_config(config: &LayerConfig, index: usize) -> Result<Layer> {
    let activation = activation_hint(config, index)?;
    match config.layer_type.to_lowercase().as_str() {
        "conv2d" => {
            let out_channels = required(config.out_channels, index, "Conv2D", "out_channels")?;
            let kernel_size = required(config.kernel_size, index, "Conv2D", "kernel_size")?;
            let stride = positive_or(config.stride, 1, index, "stride")?;
            Ok(Layer::conv2d(
                out_channels,
                kernel_size,
                kernel_size,
                stride,
                config.padding.unwrap_or(0),
                activation,
            ))
        }
        "dense" => {
            let output_size = required(config.output_size, index, "Dense", "output_size")?;
            Ok(Layer::dense(output_size, activation))
        }
        "max_pool" => {
            let window_size = required(config.window_size, index, "MaxPool", "window_size")?;
            let stride = positive_or(config.stride, window_size, index, "stride")?;
            Ok(Layer::max_pool(window_size, stride))
        }
        "activation" => match activation {
            Some(kind) => Ok(Layer::activation(kind)),
            None => Err(invalid(index, "Activation layer requires 'activation'")),
        },
        "flatten" => Ok(Layer::flatten()),
        other => Err(invalid(index, format!("Unknown layer type: {}", other))),
    }
}

/// Validates an architecture configuration.
///
/// Checks that the input shape and layer list are non-empty and that each
/// layer has the required, positive fields for its type.
pub fn validate_architecture(config: &ArchitectureConfig) -> Result<()> {
    if config.input_shape.is_empty() || config.input_shape.contains(&0) {
        return Err(NnError::UnsupportedConfiguration(format!(
            "input_shape must be non-empty with positive dimensions, got {:?}",
            config.input_shape
        )));
    }
    if config.layers.is_empty() {
        return Err(NnError::UnsupportedConfiguration(
            "Architecture must have at least one layer".to_string(),
        ));
    }
    for (i, layer) in config.layers.iter().enumerate() {
        layer_from_config(layer, i)?;
    }
    Ok(())
}

/// Builds an uncompiled network from an architecture configuration.
///
/// The returned network has its input shape and layers set; call
/// [`Network::compile`] to resolve shapes and initialize parameters from `seed`.
pub fn build_network(config: &ArchitectureConfig, seed: u64) -> Result<Network> {
    validate_architecture(config)?;
    let mut network = Network::with_seed(seed);
    network.set_input_shape(&config.input_shape);
    for (i, layer_config) in config.layers.iter().enumerate() {
        network.add(layer_from_config(layer_config, i)?);
    }
    Ok(network)
}
