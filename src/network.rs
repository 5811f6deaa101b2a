//! Network orchestrator
//!
//! A [`Network`] owns the ordered layers, the loss, the optimizer, the
//! parameter RNG and a [`TensorArena`] holding every batch-sized buffer.
//!
//! Lifecycle:
//!
//! 1. `add` layers in forward order and `set_input_shape` (batch excluded).
//! 2. `compile` once: shape resolution runs through the layers in order,
//!    allocating parameters and assigning each weight and bias tensor a
//!    [`ParamId`].
//! 3. `fit`, `predict`, `evaluate`: each binds the batch size it needs. The
//!    arena is rebuilt only when the batch size changes.
//!
//! # Example
//!
//! ```
//! use rust_cnn::layers::Layer;
//! use rust_cnn::loss::CrossEntropyLoss;
//! use rust_cnn::optimizers::SGD;
//! use rust_cnn::utils::ActivationKind;
//! use rust_cnn::{NDArray, Network};
//!
//! let mut network = Network::with_seed(7);
//! network
//!     .add(Layer::dense(2, Some(ActivationKind::SoftmaxCrossEntropy)))
//!     .add(Layer::activation(ActivationKind::SoftmaxCrossEntropy))
//!     .set_input_shape(&[3]);
//! network
//!     .compile(Box::new(CrossEntropyLoss::new()), Box::new(SGD::new(0.1)))
//!     .unwrap();
//!
//! let output = network.predict(&NDArray::zeros(&[4, 3])).unwrap();
//! assert_eq!(output.shape(), &[4, 2]);
//! ```

use std::fmt;
use std::str::FromStr;

use log::{debug, info, trace};

use crate::arena::{TensorArena, TensorId};
use crate::error::{NnError, Result};
use crate::layers::Layer;
use crate::loss::Loss;
use crate::optimizers::{Optimizer, ParamId};
use crate::tensor::NDArray;
use crate::utils::SimpleRng;

/// Seed used by [`Network::new`].
pub const DEFAULT_SEED: u64 = 42;

/// Chunk size for `predict`-based evaluation when no batch size is bound yet.
const DEFAULT_EVAL_BATCH: usize = 100;

/// How the per-batch loss gradient is scaled before backpropagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GradientReduction {
    /// Parameter gradients are sums over the batch rows.
    #[default]
    Sum,
    /// The loss gradient is divided by the batch size, so parameter
    /// gradients are batch means.
    Mean,
}

impl FromStr for GradientReduction {
    type Err = NnError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sum" => Ok(GradientReduction::Sum),
            "mean" => Ok(GradientReduction::Mean),
            other => Err(NnError::UnsupportedConfiguration(format!(
                "unknown gradient reduction '{}', expected 'sum' or 'mean'",
                other
            ))),
        }
    }
}

/// Mean training loss of every completed epoch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingHistory {
    pub epoch_losses: Vec<f32>,
}

impl TrainingHistory {
    pub fn final_loss(&self) -> Option<f32> {
        self.epoch_losses.last().copied()
    }

    pub fn epochs(&self) -> usize {
        self.epoch_losses.len()
    }
}

/// Loss and accuracy over a whole dataset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub loss: f32,
    pub accuracy: f32,
}

/// Arena slots owned by the network itself for the bound batch size.
#[derive(Debug, Clone, Copy)]
struct Scratch {
    batch_size: usize,
    input: TensorId,
    labels: TensorId,
    output: TensorId,
    loss_gradient: TensorId,
}

pub struct Network {
    layers: Vec<Layer>,
    input_shape: Option<Vec<usize>>,
    loss: Option<Box<dyn Loss>>,
    optimizer: Option<Box<dyn Optimizer>>,
    reduction: GradientReduction,
    rng: SimpleRng,
    arena: TensorArena,
    scratch: Option<Scratch>,
    compiled: bool,
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Network")
            .field("layers", &self.layers.iter().map(|l| l.kind().name()).collect::<Vec<_>>())
            .field("input_shape", &self.input_shape)
            .field("reduction", &self.reduction)
            .field("compiled", &self.compiled)
            .field("batch_size", &self.scratch.map(|s| s.batch_size))
            .finish()
    }
}

fn batched(batch_size: usize, shape: &[usize]) -> Vec<usize> {
    let mut full = Vec::with_capacity(shape.len() + 1);
    full.push(batch_size);
    full.extend_from_slice(shape);
    full
}

impl Network {
    pub fn new() -> Self {
        Self::with_seed(DEFAULT_SEED)
    }

    /// Network whose parameter initialization is driven by `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            layers: Vec::new(),
            input_shape: None,
            loss: None,
            optimizer: None,
            reduction: GradientReduction::default(),
            rng: SimpleRng::new(seed),
            arena: TensorArena::new(),
            scratch: None,
            compiled: false,
        }
    }

    /// Append a layer; layers run in the order they are added.
    pub fn add(&mut self, layer: Layer) -> &mut Self {
        self.layers.push(layer);
        self
    }

    /// Declare the per-sample input shape (batch dimension excluded).
    pub fn set_input_shape(&mut self, shape: &[usize]) -> &mut Self {
        self.input_shape = Some(shape.to_vec());
        self
    }

    pub fn set_gradient_reduction(&mut self, reduction: GradientReduction) -> &mut Self {
        self.reduction = reduction;
        self
    }

    pub fn gradient_reduction(&self) -> GradientReduction {
        self.reduction
    }

    pub fn input_shape(&self) -> Option<&[usize]> {
        self.input_shape.as_deref()
    }

    /// Per-sample output shape of the last layer, once compiled.
    pub fn output_shape(&self) -> Option<&[usize]> {
        self.layers.last().and_then(|l| l.output_shape())
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer_mut(&mut self, index: usize) -> Option<&mut Layer> {
        self.layers.get_mut(index)
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    /// Batch size the buffers are currently sized for.
    pub fn bound_batch_size(&self) -> Option<usize> {
        self.scratch.map(|s| s.batch_size)
    }

    pub fn optimizer(&self) -> Option<&dyn Optimizer> {
        self.optimizer.as_deref()
    }

    pub fn optimizer_mut(&mut self) -> Option<&mut (dyn Optimizer + 'static)> {
        self.optimizer.as_deref_mut()
    }

    /// Total number of trainable scalars.
    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(Layer::parameter_count).sum()
    }

    /// Resolve every layer's shape, allocate parameters and assign parameter handles.
    ///
    /// Must run exactly once, after the input shape is declared and at least
    /// one layer was added.
    pub fn compile(&mut self, loss: Box<dyn Loss>, optimizer: Box<dyn Optimizer>) -> Result<()> {
        if self.compiled {
            return Err(NnError::Unconfigured("network is already compiled".to_string()));
        }
        if self.layers.is_empty() {
            return Err(NnError::Unconfigured(
                "must add layers before compiling".to_string(),
            ));
        }
        let Some(input_shape) = self.input_shape.clone() else {
            return Err(NnError::Unconfigured(
                "input shape must be set before compiling".to_string(),
            ));
        };

        let mut shape = input_shape;
        let mut next_param = 0;
        for layer in &mut self.layers {
            shape = layer.resolve(&shape, &mut self.rng)?;
            if layer.has_parameters() {
                layer.set_param_ids((ParamId::new(next_param), ParamId::new(next_param + 1)));
                next_param += 2;
            }
        }

        self.loss = Some(loss);
        self.optimizer = Some(optimizer);
        self.compiled = true;
        info!(
            "compiled network: {} layers, {} parameters, output shape {:?}",
            self.layers.len(),
            self.parameter_count(),
            shape
        );
        Ok(())
    }

    /// Size every batch buffer for `batch_size` and relink the layers.
    /// Does nothing when already bound to that batch size.
    fn bind(&mut self, batch_size: usize) -> Result<Scratch> {
        if !self.compiled {
            return Err(NnError::Unconfigured(
                "network must be compiled before use".to_string(),
            ));
        }
        if batch_size == 0 {
            return Err(NnError::UnsupportedConfiguration(
                "batch size must be greater than 0".to_string(),
            ));
        }
        if let Some(scratch) = self.scratch.filter(|s| s.batch_size == batch_size) {
            return Ok(scratch);
        }
        trace!(
            "binding network buffers to batch size {} (was {:?})",
            batch_size,
            self.bound_batch_size()
        );

        let input_shape = self.input_shape.clone().unwrap_or_default();
        let output_shape = self.output_shape().map(<[usize]>::to_vec).unwrap_or_default();

        self.scratch = None;
        self.arena.clear();
        let input = self.arena.alloc(&batched(batch_size, &input_shape));
        let labels = self.arena.alloc(&batched(batch_size, &output_shape));
        let loss_gradient = self.arena.alloc(&batched(batch_size, &output_shape));

        let mut current = input;
        for layer in &mut self.layers {
            current = layer.bind(&mut self.arena, batch_size, current)?;
        }

        let scratch = Scratch {
            batch_size,
            input,
            labels,
            output: current,
            loss_gradient,
        };
        self.scratch = Some(scratch);
        Ok(scratch)
    }

    fn forward_pass(&mut self) -> Result<()> {
        for layer in &mut self.layers {
            layer.forward(&mut self.arena)?;
        }
        Ok(())
    }

    /// Validate a dataset against the compiled shapes and return its row count.
    fn check_dataset(&self, data: &NDArray, labels: &NDArray) -> Result<usize> {
        let (Some(input_shape), Some(output_shape)) = (self.input_shape(), self.output_shape()) else {
            return Err(NnError::Unconfigured(
                "network must be compiled before use".to_string(),
            ));
        };
        let rows = data.shape().first().copied().unwrap_or(0);
        let expected_data = batched(rows, input_shape);
        if data.shape() != expected_data.as_slice() {
            return Err(NnError::shape_mismatch("dataset", &expected_data, data.shape()));
        }
        let expected_labels = batched(rows, output_shape);
        if labels.shape() != expected_labels.as_slice() {
            return Err(NnError::shape_mismatch("labels", &expected_labels, labels.shape()));
        }
        Ok(rows)
    }

    /// One forward, loss, backward and update cycle on batch `batch`.
    fn train_batch(&mut self, data: &NDArray, labels: &NDArray, batch: usize, batch_size: usize) -> Result<f32> {
        let scratch = self.bind(batch_size)?;
        self.arena
            .get_mut(scratch.input)?
            .copy_batch_from(data, batch, batch_size)?;
        self.arena
            .get_mut(scratch.labels)?
            .copy_batch_from(labels, batch, batch_size)?;

        self.forward_pass()?;

        let Self {
            layers,
            loss,
            optimizer,
            arena,
            reduction,
            ..
        } = self;
        let (Some(loss), Some(optimizer)) = (loss.as_ref(), optimizer.as_mut()) else {
            return Err(NnError::Unconfigured(
                "network must be compiled before training".to_string(),
            ));
        };

        let predictions = arena.get(scratch.output)?;
        let targets = arena.get(scratch.labels)?;
        let loss_value = loss.compute(targets, predictions)?;
        let mut gradient = loss.backward(targets, predictions)?;
        if *reduction == GradientReduction::Mean {
            gradient.scale_assign(1.0 / batch_size as f32);
        }
        *arena.get_mut(scratch.loss_gradient)? = gradient;

        let mut grad_output = scratch.loss_gradient;
        for layer in layers.iter_mut().rev() {
            layer.backward(arena, grad_output)?;
            if let Some((weight_id, bias_id)) = layer.param_ids() {
                if let Some(params) = layer.parameters() {
                    optimizer.update(weight_id, params.weights, params.weight_gradient)?;
                    optimizer.update(bias_id, params.biases, params.bias_gradient)?;
                }
            }
            if let Some(binding) = layer.binding() {
                grad_output = binding.input_gradient;
            }
        }
        Ok(loss_value)
    }

    /// Train for `epochs` passes over `data`/`labels` in batches of `batch_size`.
    ///
    /// Trailing rows that do not fill a whole batch are skipped.
    pub fn fit(&mut self, data: &NDArray, labels: &NDArray, epochs: usize, batch_size: usize) -> Result<TrainingHistory> {
        self.fit_with_callback(data, labels, epochs, batch_size, |_, _| Ok(()))
    }

    /// Like [`fit`](Self::fit), calling `callback(network, epoch)` after every epoch.
    ///
    /// The callback may run `predict`, `evaluate` or `one_hot_accuracy`; the
    /// training batch size is rebound at the start of the next epoch.
    pub fn fit_with_callback<F>(
        &mut self,
        data: &NDArray,
        labels: &NDArray,
        epochs: usize,
        batch_size: usize,
        mut callback: F,
    ) -> Result<TrainingHistory>
    where
        F: FnMut(&mut Network, usize) -> Result<()>,
    {
        let rows = self.check_dataset(data, labels)?;
        if batch_size == 0 {
            return Err(NnError::UnsupportedConfiguration(
                "batch size must be greater than 0".to_string(),
            ));
        }
        if batch_size > rows {
            return Err(NnError::BatchOutOfRange {
                start: 0,
                end: batch_size,
                len: rows,
            });
        }
        let num_batches = rows / batch_size;

        let mut history = TrainingHistory::default();
        for epoch in 0..epochs {
            let mut total = 0.0;
            for batch in 0..num_batches {
                let loss = self.train_batch(data, labels, batch, batch_size)?;
                debug!("epoch {} batch {}/{}: loss {:.6}", epoch + 1, batch + 1, num_batches, loss);
                total += loss;
            }
            let mean = total / num_batches as f32;
            info!("epoch {}/{}: mean loss {:.6}", epoch + 1, epochs, mean);
            history.epoch_losses.push(mean);
            callback(&mut *self, epoch)?;
        }
        Ok(history)
    }

    /// Forward `input` (shape `[batch, input_shape..]`) and return the final layer's output.
    ///
    /// The returned tensor is the network's own output buffer, valid until
    /// the next call that runs the network.
    pub fn predict(&mut self, input: &NDArray) -> Result<&NDArray> {
        let Some(input_shape) = self.input_shape() else {
            return Err(NnError::Unconfigured(
                "input shape must be set before predicting".to_string(),
            ));
        };
        let rows = input.shape().first().copied().unwrap_or(0);
        let expected = batched(rows, input_shape);
        if input.shape() != expected.as_slice() {
            return Err(NnError::shape_mismatch("predict", &expected, input.shape()));
        }

        let scratch = self.bind(rows)?;
        self.arena
            .get_mut(scratch.input)?
            .data_mut()
            .copy_from_slice(input.data());
        self.forward_pass()?;
        self.arena.get(scratch.output)
    }

    /// Mean loss and one-hot accuracy over a dataset, evaluated in chunks of
    /// the currently bound batch size.
    pub fn evaluate(&mut self, data: &NDArray, labels: &NDArray) -> Result<Evaluation> {
        let rows = self.check_dataset(data, labels)?;
        if rows == 0 {
            return Err(NnError::UnsupportedConfiguration(
                "cannot evaluate an empty dataset".to_string(),
            ));
        }
        let chunk = self.bound_batch_size().unwrap_or(DEFAULT_EVAL_BATCH).min(rows);

        let mut correct = 0;
        let mut total_loss = 0.0;
        let mut start = 0;
        while start < rows {
            let end = (start + chunk).min(rows);
            let batch_data = data.linear_slice(start, end)?;
            let batch_labels = labels.linear_slice(start, end)?;

            let predictions = self.predict(&batch_data)?.clone();
            let predicted = predictions.argmax_rows();
            let batch_loss = match &self.loss {
                Some(loss) => loss.compute(&batch_labels, &predictions)?,
                None => 0.0,
            };

            total_loss += batch_loss * (end - start) as f32;
            correct += predicted
                .iter()
                .zip(batch_labels.argmax_rows())
                .filter(|(p, t)| **p == *t)
                .count();
            start = end;
        }

        Ok(Evaluation {
            loss: total_loss / rows as f32,
            accuracy: correct as f32 / rows as f32,
        })
    }

    /// Fraction of rows whose predicted argmax equals the label argmax, in `[0, 1]`.
    pub fn one_hot_accuracy(&mut self, data: &NDArray, labels: &NDArray) -> Result<f32> {
        Ok(self.evaluate(data, labels)?.accuracy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::LayerKind;
    use crate::loss::CrossEntropyLoss;
    use crate::optimizers::SGD;
    use crate::utils::ActivationKind;

    fn small_network() -> Network {
        let mut network = Network::with_seed(3);
        network
            .add(Layer::dense(4, Some(ActivationKind::Relu)))
            .add(Layer::activation(ActivationKind::Relu))
            .add(Layer::dense(2, Some(ActivationKind::SoftmaxCrossEntropy)))
            .add(Layer::activation(ActivationKind::SoftmaxCrossEntropy))
            .set_input_shape(&[3]);
        network
    }

    fn compile(network: &mut Network) -> Result<()> {
        network.compile(Box::new(CrossEntropyLoss::new()), Box::new(SGD::new(0.1)))
    }

    #[test]
    fn test_gradient_reduction_from_str() {
        assert_eq!("sum".parse::<GradientReduction>().unwrap(), GradientReduction::Sum);
        assert_eq!("Mean".parse::<GradientReduction>().unwrap(), GradientReduction::Mean);
        assert!("median".parse::<GradientReduction>().is_err());
    }

    #[test]
    fn test_compile_requires_layers() {
        let mut network = Network::new();
        network.set_input_shape(&[3]);
        assert!(matches!(compile(&mut network), Err(NnError::Unconfigured(_))));
    }

    #[test]
    fn test_compile_requires_input_shape() {
        let mut network = Network::new();
        network.add(Layer::dense(2, None));
        assert!(matches!(compile(&mut network), Err(NnError::Unconfigured(_))));
    }

    #[test]
    fn test_compile_twice_fails() {
        let mut network = small_network();
        compile(&mut network).unwrap();
        assert!(matches!(compile(&mut network), Err(NnError::Unconfigured(_))));
    }

    #[test]
    fn test_compile_assigns_parameter_handles() {
        let mut network = small_network();
        compile(&mut network).unwrap();
        let ids: Vec<_> = network.layers().iter().map(Layer::param_ids).collect();
        assert_eq!(ids[0], Some((ParamId::new(0), ParamId::new(1))));
        assert_eq!(ids[1], None);
        assert_eq!(ids[2], Some((ParamId::new(2), ParamId::new(3))));
        assert_eq!(network.parameter_count(), 3 * 4 + 4 + 4 * 2 + 2);
        assert_eq!(network.output_shape(), Some(&[2][..]));
    }

    #[test]
    fn test_predict_before_compile() {
        let mut network = small_network();
        assert!(matches!(
            network.predict(&NDArray::zeros(&[1, 3])),
            Err(NnError::Unconfigured(_))
        ));
    }

    #[test]
    fn test_predict_rebinds_on_batch_change() {
        let mut network = small_network();
        compile(&mut network).unwrap();
        assert_eq!(network.predict(&NDArray::zeros(&[5, 3])).unwrap().shape(), &[5, 2]);
        assert_eq!(network.bound_batch_size(), Some(5));
        assert_eq!(network.predict(&NDArray::zeros(&[2, 3])).unwrap().shape(), &[2, 2]);
        assert_eq!(network.bound_batch_size(), Some(2));
    }

    #[test]
    fn test_predict_rejects_wrong_sample_shape() {
        let mut network = small_network();
        compile(&mut network).unwrap();
        assert!(matches!(
            network.predict(&NDArray::zeros(&[2, 4])),
            Err(NnError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_fit_validates_batching() {
        let mut network = small_network();
        compile(&mut network).unwrap();
        let data = NDArray::zeros(&[4, 3]);
        let labels = NDArray::zeros(&[4, 2]);
        assert!(matches!(
            network.fit(&data, &labels, 1, 0),
            Err(NnError::UnsupportedConfiguration(_))
        ));
        assert!(matches!(
            network.fit(&data, &labels, 1, 5),
            Err(NnError::BatchOutOfRange { .. })
        ));
        assert!(matches!(
            network.fit(&data, &NDArray::zeros(&[4, 3]), 1, 2),
            Err(NnError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_fit_records_history_and_calls_back() {
        let mut network = small_network();
        compile(&mut network).unwrap();
        let data = NDArray::from_vec(&[4, 3], (0..12).map(|v| v as f32 / 12.0).collect()).unwrap();
        let labels = NDArray::from_vec(&[4, 2], vec![1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0]).unwrap();

        let mut seen = Vec::new();
        let history = network
            .fit_with_callback(&data, &labels, 3, 2, |net, epoch| {
                let accuracy = net.one_hot_accuracy(&data, &labels)?;
                assert!((0.0..=1.0).contains(&accuracy));
                seen.push(epoch);
                Ok(())
            })
            .unwrap();

        assert_eq!(history.epochs(), 3);
        assert_eq!(seen, vec![0, 1, 2]);
        assert!(history.epoch_losses.iter().all(|l| l.is_finite()));
    }

    #[test]
    fn test_evaluate_handles_partial_chunk() {
        let mut network = small_network();
        compile(&mut network).unwrap();
        network.predict(&NDArray::zeros(&[2, 3])).unwrap();

        let data = NDArray::zeros(&[5, 3]);
        let labels = NDArray::from_vec(&[5, 2], [1.0, 0.0].repeat(5)).unwrap();
        let evaluation = network.evaluate(&data, &labels).unwrap();
        // identical rows give identical predictions, so accuracy is all or nothing
        assert!(evaluation.accuracy == 0.0 || evaluation.accuracy == 1.0);
        assert_eq!(network.bound_batch_size(), Some(1));
    }

    #[test]
    fn test_mean_reduction_scales_updates() {
        let data = NDArray::from_vec(&[2, 3], vec![1.0, 0.0, 0.5, 0.0, 1.0, 0.5]).unwrap();
        let labels = NDArray::from_vec(&[2, 2], vec![1.0, 0.0, 0.0, 1.0]).unwrap();

        let weight_change = |reduction: GradientReduction| {
            let mut network = small_network();
            network.set_gradient_reduction(reduction);
            compile(&mut network).unwrap();
            let before = match network.layers()[2].kind() {
                LayerKind::Dense(dense) => dense.biases().clone(),
                _ => unreachable!(),
            };
            network.fit(&data, &labels, 1, 2).unwrap();
            match network.layers()[2].kind() {
                LayerKind::Dense(dense) => dense.biases().sub(&before).unwrap(),
                _ => unreachable!(),
            }
        };

        let sum = weight_change(GradientReduction::Sum);
        let mean = weight_change(GradientReduction::Mean);
        for (s, m) in sum.data().iter().zip(mean.data()) {
            approx::assert_relative_eq!(*s, 2.0 * m, epsilon = 1e-6);
        }
    }
}
