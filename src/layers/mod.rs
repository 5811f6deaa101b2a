//! Layer abstractions for neural networks
//!
//! Every layer goes through the same lifecycle:
//!
//! 1. **Uninitialized**: constructed with hyperparameters only.
//! 2. **ShapeResolved**: [`Layer::resolve`] fixed the output shape and
//!    allocated and initialized the parameters.
//! 3. **BatchBound**: [`Layer::bind`] allocated the batch-sized output and
//!    input-gradient buffers in the network's [`TensorArena`] and wired the
//!    layer's input to the previous layer's output. Forward and backward are
//!    callable from here on.
//!
//! Binding again with another batch size re-enters BatchBound without
//! touching shapes or parameters.
//!
//! The set of layer kinds is closed ([`LayerKind`]) and dispatched by
//! exhaustive matching; each kind implements [`Propagate`].

mod r#trait;
pub mod activation;
pub mod conv2d;
pub mod dense;
pub mod flatten;
pub mod pooling;

pub use activation::ActivationLayer;
pub use conv2d::Conv2DLayer;
pub use dense::DenseLayer;
pub use flatten::FlattenLayer;
pub use pooling::MaxPool2DLayer;
pub use r#trait::{Parameters, Propagate};

use crate::arena::{TensorArena, TensorId};
use crate::error::{NnError, Result};
use crate::optimizers::ParamId;
use crate::tensor::NDArray;
use crate::utils::{ActivationKind, SimpleRng};

/// The closed set of layer kinds.
#[derive(Debug, Clone)]
pub enum LayerKind {
    Dense(DenseLayer),
    Conv2D(Conv2DLayer),
    MaxPool2D(MaxPool2DLayer),
    Activation(ActivationLayer),
    Flatten(FlattenLayer),
}

impl LayerKind {
    pub fn name(&self) -> &'static str {
        match self {
            LayerKind::Dense(_) => "dense",
            LayerKind::Conv2D(_) => "conv2d",
            LayerKind::MaxPool2D(_) => "max_pool",
            LayerKind::Activation(_) => "activation",
            LayerKind::Flatten(_) => "flatten",
        }
    }
}

impl Propagate for LayerKind {
    fn resolve(&mut self, input_shape: &[usize], rng: &mut SimpleRng) -> Result<Vec<usize>> {
        match self {
            LayerKind::Dense(l) => l.resolve(input_shape, rng),
            LayerKind::Conv2D(l) => l.resolve(input_shape, rng),
            LayerKind::MaxPool2D(l) => l.resolve(input_shape, rng),
            LayerKind::Activation(l) => l.resolve(input_shape, rng),
            LayerKind::Flatten(l) => l.resolve(input_shape, rng),
        }
    }

    fn bind(&mut self, batch_size: usize) -> Result<()> {
        match self {
            LayerKind::Dense(l) => l.bind(batch_size),
            LayerKind::Conv2D(l) => l.bind(batch_size),
            LayerKind::MaxPool2D(l) => l.bind(batch_size),
            LayerKind::Activation(l) => l.bind(batch_size),
            LayerKind::Flatten(l) => l.bind(batch_size),
        }
    }

    fn forward(&mut self, input: &NDArray, output: &mut NDArray) -> Result<()> {
        match self {
            LayerKind::Dense(l) => l.forward(input, output),
            LayerKind::Conv2D(l) => l.forward(input, output),
            LayerKind::MaxPool2D(l) => l.forward(input, output),
            LayerKind::Activation(l) => l.forward(input, output),
            LayerKind::Flatten(l) => l.forward(input, output),
        }
    }

    fn backward(
        &mut self,
        input: &NDArray,
        grad_output: &NDArray,
        grad_input: &mut NDArray,
    ) -> Result<()> {
        match self {
            LayerKind::Dense(l) => l.backward(input, grad_output, grad_input),
            LayerKind::Conv2D(l) => l.backward(input, grad_output, grad_input),
            LayerKind::MaxPool2D(l) => l.backward(input, grad_output, grad_input),
            LayerKind::Activation(l) => l.backward(input, grad_output, grad_input),
            LayerKind::Flatten(l) => l.backward(input, grad_output, grad_input),
        }
    }

    fn parameters(&mut self) -> Option<Parameters<'_>> {
        match self {
            LayerKind::Dense(l) => l.parameters(),
            LayerKind::Conv2D(l) => l.parameters(),
            LayerKind::MaxPool2D(l) => l.parameters(),
            LayerKind::Activation(l) => l.parameters(),
            LayerKind::Flatten(l) => l.parameters(),
        }
    }

    fn parameter_count(&self) -> usize {
        match self {
            LayerKind::Dense(l) => l.parameter_count(),
            LayerKind::Conv2D(l) => l.parameter_count(),
            LayerKind::MaxPool2D(l) => l.parameter_count(),
            LayerKind::Activation(l) => l.parameter_count(),
            LayerKind::Flatten(l) => l.parameter_count(),
        }
    }
}

/// Lifecycle stage of a [`Layer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerState {
    Uninitialized,
    ShapeResolved,
    BatchBound,
}

/// Arena slots a bound layer reads from and writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub batch_size: usize,
    pub input: TensorId,
    pub output: TensorId,
    pub input_gradient: TensorId,
}

/// A layer of the network: its kind plus resolved shapes, arena binding and
/// optimizer parameter handles.
#[derive(Debug, Clone)]
pub struct Layer {
    kind: LayerKind,
    input_shape: Option<Vec<usize>>,
    output_shape: Option<Vec<usize>>,
    binding: Option<Binding>,
    param_ids: Option<(ParamId, ParamId)>,
}

impl From<LayerKind> for Layer {
    fn from(kind: LayerKind) -> Self {
        Self {
            kind,
            input_shape: None,
            output_shape: None,
            binding: None,
            param_ids: None,
        }
    }
}

fn batched(batch_size: usize, shape: &[usize]) -> Vec<usize> {
    let mut full = Vec::with_capacity(shape.len() + 1);
    full.push(batch_size);
    full.extend_from_slice(shape);
    full
}

/// Leading dimension of `tensor`, which must hold `sample_len` values per sample.
pub(crate) fn batch_dim(op: &'static str, tensor: &NDArray, sample_len: usize) -> Result<usize> {
    match tensor.shape().split_first() {
        Some((&batch, rest)) if !rest.is_empty() && rest.iter().product::<usize>() == sample_len => {
            Ok(batch)
        }
        _ => Err(NnError::shape_mismatch(
            op,
            &[tensor.shape().first().copied().unwrap_or(0), sample_len],
            tensor.shape(),
        )),
    }
}

/// `tensor` must be exactly `[batch_size, shape...]`.
pub(crate) fn check_batched(
    op: &'static str,
    tensor: &NDArray,
    batch_size: usize,
    shape: &[usize],
) -> Result<()> {
    let expected = batched(batch_size, shape);
    if tensor.shape() != expected.as_slice() {
        return Err(NnError::shape_mismatch(op, &expected, tensor.shape()));
    }
    Ok(())
}

impl Layer {
    /// Dense layer with `output_size` outputs; `activation_hint` selects the initializer.
    pub fn dense(output_size: usize, activation_hint: Option<ActivationKind>) -> Self {
        LayerKind::Dense(DenseLayer::new(output_size, activation_hint)).into()
    }

    /// Convolution with `num_filters` filters of `filter_height × filter_width`.
    pub fn conv2d(
        num_filters: usize,
        filter_height: usize,
        filter_width: usize,
        stride: usize,
        padding: usize,
        activation_hint: Option<ActivationKind>,
    ) -> Self {
        LayerKind::Conv2D(Conv2DLayer::new(
            num_filters,
            filter_height,
            filter_width,
            stride,
            padding,
            activation_hint,
        ))
        .into()
    }

    pub fn max_pool(window_size: usize, stride: usize) -> Self {
        LayerKind::MaxPool2D(MaxPool2DLayer::new(window_size, stride)).into()
    }

    pub fn activation(kind: ActivationKind) -> Self {
        LayerKind::Activation(ActivationLayer::new(kind)).into()
    }

    pub fn flatten() -> Self {
        LayerKind::Flatten(FlattenLayer::new()).into()
    }

    pub fn kind(&self) -> &LayerKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut LayerKind {
        &mut self.kind
    }

    pub fn state(&self) -> LayerState {
        match (&self.output_shape, &self.binding) {
            (None, _) => LayerState::Uninitialized,
            (Some(_), None) => LayerState::ShapeResolved,
            (Some(_), Some(_)) => LayerState::BatchBound,
        }
    }

    /// Per-sample input shape (known once resolved).
    pub fn input_shape(&self) -> Option<&[usize]> {
        self.input_shape.as_deref()
    }

    /// Per-sample output shape (known once resolved).
    pub fn output_shape(&self) -> Option<&[usize]> {
        self.output_shape.as_deref()
    }

    pub fn binding(&self) -> Option<Binding> {
        self.binding
    }

    pub fn param_ids(&self) -> Option<(ParamId, ParamId)> {
        self.param_ids
    }

    pub(crate) fn set_param_ids(&mut self, ids: (ParamId, ParamId)) {
        self.param_ids = Some(ids);
    }

    pub fn parameter_count(&self) -> usize {
        self.kind.parameter_count()
    }

    pub fn has_parameters(&self) -> bool {
        matches!(self.kind, LayerKind::Dense(_) | LayerKind::Conv2D(_))
    }

    pub fn parameters(&mut self) -> Option<Parameters<'_>> {
        self.kind.parameters()
    }

    /// Shape resolution. Returns the per-sample output shape.
    pub fn resolve(&mut self, input_shape: &[usize], rng: &mut SimpleRng) -> Result<Vec<usize>> {
        let output_shape = self.kind.resolve(input_shape, rng)?;
        self.input_shape = Some(input_shape.to_vec());
        self.output_shape = Some(output_shape.clone());
        self.binding = None;
        Ok(output_shape)
    }

    /// Allocate this layer's batch-sized buffers in `arena` and read from `input`.
    ///
    /// Returns the id of the output buffer, which becomes the next layer's input.
    pub fn bind(&mut self, arena: &mut TensorArena, batch_size: usize, input: TensorId) -> Result<TensorId> {
        let (Some(input_shape), Some(output_shape)) = (&self.input_shape, &self.output_shape) else {
            return Err(NnError::Unconfigured(format!(
                "{} layer must be resolved before binding a batch size",
                self.kind.name()
            )));
        };
        let output = arena.alloc(&batched(batch_size, output_shape));
        let input_gradient = arena.alloc(&batched(batch_size, input_shape));
        self.kind.bind(batch_size)?;
        self.binding = Some(Binding {
            batch_size,
            input,
            output,
            input_gradient,
        });
        Ok(output)
    }

    fn bound(&self) -> Result<(Binding, &[usize])> {
        match (self.binding, &self.input_shape) {
            (Some(binding), Some(input_shape)) => Ok((binding, input_shape)),
            _ => Err(NnError::Unconfigured(format!(
                "{} layer is not linked to a batch; compile and bind the network first",
                self.kind.name()
            ))),
        }
    }

    /// Run the forward pass from the bound input slot into the output slot.
    pub fn forward(&mut self, arena: &mut TensorArena) -> Result<()> {
        let (binding, input_shape) = self.bound()?;
        let expected = batched(binding.batch_size, input_shape);
        let kind = &mut self.kind;
        arena.with_slot(binding.output, |arena, output| {
            let input = arena.get(binding.input)?;
            if input.shape() != expected.as_slice() {
                return Err(NnError::shape_mismatch("layer input", &expected, input.shape()));
            }
            kind.forward(input, output)
        })
    }

    /// Run the backward pass for the gradient stored in `grad_output`, writing
    /// this layer's input gradient slot and its parameter gradients.
    pub fn backward(&mut self, arena: &mut TensorArena, grad_output: TensorId) -> Result<()> {
        let (binding, _) = self.bound()?;
        let kind = &mut self.kind;
        arena.with_slot(binding.input_gradient, |arena, grad_input| {
            let grad = arena.get(grad_output)?;
            let output = arena.get(binding.output)?;
            if grad.shape() != output.shape() {
                return Err(NnError::shape_mismatch("layer gradient", output.shape(), grad.shape()));
            }
            kind.backward(arena.get(binding.input)?, grad, grad_input)
        })
    }
}
