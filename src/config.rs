//! Configuration structures for training
//!
//! Training hyperparameters are read from a JSON file. Every field is
//! optional; missing fields take the defaults listed on [`TrainingConfig`].

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{NnError, Result};
use crate::network::GradientReduction;
use crate::optimizers::{Adam, Optimizer, SGD};

/// Training configuration
///
/// | field                | default  | constraint          |
/// |----------------------|----------|---------------------|
/// | `epochs`             | 10       |                     |
/// | `batch_size`         | 60       | > 0                 |
/// | `optimizer`          | `"adam"` | `"sgd"` or `"adam"` |
/// | `learning_rate`      | 0.001    | > 0                 |
/// | `beta1`, `beta2`     | 0.9, 0.999 | in [0, 1)         |
/// | `epsilon`            | 1e-8     | > 0                 |
/// | `seed`               | 42       |                     |
/// | `gradient_reduction` | `"sum"`  | `"sum"` or `"mean"` |
///
/// # Example
///
/// ```json
/// {
///   "epochs": 5,
///   "batch_size": 32,
///   "optimizer": "sgd",
///   "learning_rate": 0.01,
///   "gradient_reduction": "mean"
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    /// Optimizer name: "sgd" or "adam"
    pub optimizer: String,
    pub learning_rate: f32,
    /// Adam first-moment decay
    pub beta1: f32,
    /// Adam second-moment decay
    pub beta2: f32,
    pub epsilon: f32,
    /// Seed for parameter initialization
    pub seed: u64,
    /// "sum" or "mean"
    pub gradient_reduction: String,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: 60,
            optimizer: "adam".to_string(),
            learning_rate: 0.001,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            seed: 42,
            gradient_reduction: "sum".to_string(),
        }
    }
}

impl TrainingConfig {
    /// Build the configured optimizer.
    pub fn build_optimizer(&self) -> Result<Box<dyn Optimizer>> {
        match self.optimizer.to_lowercase().as_str() {
            "sgd" => Ok(Box::new(SGD::new(self.learning_rate))),
            "adam" => Ok(Box::new(Adam::new(
                self.learning_rate,
                self.beta1,
                self.beta2,
                self.epsilon,
            ))),
            other => Err(NnError::UnsupportedConfiguration(format!(
                "unknown optimizer '{}', expected 'sgd' or 'adam'",
                other
            ))),
        }
    }

    pub fn reduction(&self) -> Result<GradientReduction> {
        self.gradient_reduction.parse()
    }
}

/// Loads a training configuration from a JSON file and validates it.
///
/// # Examples
///
/// ```no_run
/// use rust_cnn::config::load_config;
///
/// let cfg = load_config("config/mnist_cnn.json").unwrap();
/// assert!(cfg.batch_size > 0);
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<TrainingConfig> {
    let contents = fs::read_to_string(path)?;
    let config: TrainingConfig = serde_json::from_str(&contents)?;
    validate_config(&config)?;
    Ok(config)
}

fn invalid(message: impl Into<String>) -> NnError {
    NnError::UnsupportedConfiguration(message.into())
}

/// Checks value ranges and names; see [`TrainingConfig`] for the constraints.
pub fn validate_config(config: &TrainingConfig) -> Result<()> {
    if config.batch_size == 0 {
        return Err(invalid("batch_size must be greater than 0"));
    }
    if config.learning_rate.is_nan() || config.learning_rate <= 0.0 {
        return Err(invalid("learning_rate must be positive"));
    }
    if !(0.0..1.0).contains(&config.beta1) {
        return Err(invalid("beta1 must be in [0, 1)"));
    }
    if !(0.0..1.0).contains(&config.beta2) {
        return Err(invalid("beta2 must be in [0, 1)"));
    }
    if config.epsilon.is_nan() || config.epsilon <= 0.0 {
        return Err(invalid("epsilon must be positive"));
    }

    let valid_optimizers = ["sgd", "adam"];
    if !valid_optimizers.contains(&config.optimizer.to_lowercase().as_str()) {
        return Err(invalid(format!(
            "Invalid optimizer '{}'. Must be one of: {}",
            config.optimizer,
            valid_optimizers.join(", ")
        )));
    }
    config.reduction()?;

    Ok(())
}
