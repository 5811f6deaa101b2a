//! Error types shared by every component of the engine
//!
//! All fallible operations return [`Result`], whose error side is [`NnError`].
//! Errors are never retried or recovered internally: a failing operation aborts
//! and hands the error back to the caller.

use thiserror::Error;

/// Errors raised by tensors, layers, the network orchestrator and the
/// configuration/data edges of the crate.
#[derive(Debug, Error)]
pub enum NnError {
    /// Two tensors (or a tensor and a declared shape) disagree where they must match.
    #[error("shape mismatch in {op}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        op: &'static str,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    /// A coordinate tuple has the wrong number of entries for the tensor rank.
    #[error("coordinate rank mismatch: tensor has rank {expected}, got {found} coordinates")]
    RankMismatch { expected: usize, found: usize },

    /// A coordinate exceeds the bound of its dimension.
    #[error("index {index} out of range for dimension {dim} of size {bound}")]
    IndexOutOfRange {
        dim: usize,
        index: usize,
        bound: usize,
    },

    /// An operation was invoked before the component reached the required lifecycle state.
    #[error("unconfigured state: {0}")]
    Unconfigured(String),

    /// A hyperparameter or configuration value is not supported.
    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    /// A requested batch slice runs past the end of the dataset.
    #[error("batch out of range: rows {start}..{end} requested from {len} rows")]
    BatchOutOfRange { start: usize, end: usize, len: usize },

    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, NnError>;

impl NnError {
    pub(crate) fn shape_mismatch(op: &'static str, expected: &[usize], found: &[usize]) -> Self {
        NnError::ShapeMismatch {
            op,
            expected: expected.to_vec(),
            found: found.to_vec(),
        }
    }
}
