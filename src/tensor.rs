//! Strided N-dimensional array
//!
//! [`NDArray`] owns a flat `f32` buffer together with its shape and row-major
//! strides (last dimension fastest-varying). Every layer, the loss and the
//! optimizers operate exclusively on this type.
//!
//! The buffer length always equals the product of the shape. Reshaping only
//! reinterprets strides and never reorders data; batch extraction always copies
//! into a freshly owned array.

use crate::error::{NnError, Result};

/// Dense, row-major N-dimensional array of `f32`.
///
/// # Example
///
/// ```
/// use rust_cnn::tensor::NDArray;
///
/// let mut a = NDArray::zeros(&[2, 3]);
/// a.set(&[1, 2], 5.0).unwrap();
/// assert_eq!(a.get(&[1, 2]).unwrap(), 5.0);
/// assert_eq!(a.strides(), &[3, 1]);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NDArray {
    shape: Vec<usize>,
    strides: Vec<usize>,
    data: Vec<f32>,
}

/// Row-major strides for `shape`.
fn compute_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![0; shape.len()];
    let mut stride = 1;
    for (dim, size) in shape.iter().enumerate().rev() {
        strides[dim] = stride;
        stride *= size;
    }
    strides
}

impl NDArray {
    /// Create an array of the given shape filled with `value`.
    pub fn full(shape: &[usize], value: f32) -> Self {
        let len = shape.iter().product();
        Self {
            shape: shape.to_vec(),
            strides: compute_strides(shape),
            data: vec![value; len],
        }
    }

    /// Create a zero-filled array of the given shape.
    pub fn zeros(shape: &[usize]) -> Self {
        Self::full(shape, 0.0)
    }

    /// Wrap an existing buffer. Fails if `data.len()` differs from the shape's element count.
    pub fn from_vec(shape: &[usize], data: Vec<f32>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(NnError::shape_mismatch("from_vec", &[expected], &[data.len()]));
        }
        Ok(Self {
            shape: shape.to_vec(),
            strides: compute_strides(shape),
            data,
        })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Number of elements in one entry of the leading (batch) dimension.
    pub fn sample_len(&self) -> usize {
        self.shape.iter().skip(1).product()
    }

    /// Flat buffer offset of a full coordinate tuple.
    ///
    /// Each coordinate must be smaller than its dimension; the offset is
    /// `Σ coords[d] * strides[d]`.
    pub fn offset(&self, coords: &[usize]) -> Result<usize> {
        if coords.len() != self.shape.len() {
            return Err(NnError::RankMismatch {
                expected: self.shape.len(),
                found: coords.len(),
            });
        }
        let mut offset = 0;
        for (dim, (&index, &bound)) in coords.iter().zip(&self.shape).enumerate() {
            if index >= bound {
                return Err(NnError::IndexOutOfRange { dim, index, bound });
            }
            offset += index * self.strides[dim];
        }
        Ok(offset)
    }

    pub fn get(&self, coords: &[usize]) -> Result<f32> {
        Ok(self.data[self.offset(coords)?])
    }

    pub fn get_mut(&mut self, coords: &[usize]) -> Result<&mut f32> {
        let offset = self.offset(coords)?;
        Ok(&mut self.data[offset])
    }

    pub fn set(&mut self, coords: &[usize], value: f32) -> Result<()> {
        *self.get_mut(coords)? = value;
        Ok(())
    }

    pub fn fill(&mut self, value: f32) {
        self.data.iter_mut().for_each(|x| *x = value);
    }

    /// Reset every element to zero (gradient buffers are zeroed before accumulation).
    pub fn zero(&mut self) {
        self.fill(0.0);
    }

    fn check_same_shape(&self, other: &NDArray, op: &'static str) -> Result<()> {
        if self.shape != other.shape {
            return Err(NnError::shape_mismatch(op, &self.shape, &other.shape));
        }
        Ok(())
    }

    fn zip_with(&self, other: &NDArray, op: &'static str, f: impl Fn(f32, f32) -> f32) -> Result<NDArray> {
        self.check_same_shape(other, op)?;
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(&a, &b)| f(a, b))
            .collect();
        Ok(NDArray {
            shape: self.shape.clone(),
            strides: self.strides.clone(),
            data,
        })
    }

    fn map(&self, f: impl Fn(f32) -> f32) -> NDArray {
        NDArray {
            shape: self.shape.clone(),
            strides: self.strides.clone(),
            data: self.data.iter().map(|&x| f(x)).collect(),
        }
    }

    /// Element-wise sum. Shapes must be identical.
    pub fn add(&self, other: &NDArray) -> Result<NDArray> {
        self.zip_with(other, "add", |a, b| a + b)
    }

    /// Element-wise difference. Shapes must be identical.
    pub fn sub(&self, other: &NDArray) -> Result<NDArray> {
        self.zip_with(other, "sub", |a, b| a - b)
    }

    /// Element-wise product. Shapes must be identical.
    pub fn mul(&self, other: &NDArray) -> Result<NDArray> {
        self.zip_with(other, "mul", |a, b| a * b)
    }

    /// Element-wise quotient. Shapes must be identical.
    pub fn div(&self, other: &NDArray) -> Result<NDArray> {
        self.zip_with(other, "div", |a, b| a / b)
    }

    pub fn scale(&self, scalar: f32) -> NDArray {
        self.map(|x| x * scalar)
    }

    pub fn div_scalar(&self, scalar: f32) -> NDArray {
        self.map(|x| x / scalar)
    }

    pub fn add_scalar(&self, scalar: f32) -> NDArray {
        self.map(|x| x + scalar)
    }

    pub fn square(&self) -> NDArray {
        self.map(|x| x * x)
    }

    pub fn sqrt(&self) -> NDArray {
        self.map(f32::sqrt)
    }

    pub fn clamp(&self, lo: f32, hi: f32) -> NDArray {
        self.map(|x| x.clamp(lo, hi))
    }

    /// In-place `self += other`.
    pub fn add_assign(&mut self, other: &NDArray) -> Result<()> {
        self.check_same_shape(other, "add_assign")?;
        for (a, &b) in self.data.iter_mut().zip(&other.data) {
            *a += b;
        }
        Ok(())
    }

    /// In-place `self -= other * scalar`, the core of every gradient step.
    pub fn sub_scaled_assign(&mut self, other: &NDArray, scalar: f32) -> Result<()> {
        self.check_same_shape(other, "sub_scaled_assign")?;
        for (a, &b) in self.data.iter_mut().zip(&other.data) {
            *a -= b * scalar;
        }
        Ok(())
    }

    /// In-place scalar multiplication.
    pub fn scale_assign(&mut self, scalar: f32) {
        self.data.iter_mut().for_each(|x| *x *= scalar);
    }

    /// Map `f` over every element in place.
    pub fn apply(&mut self, mut f: impl FnMut(f32) -> f32) -> &mut Self {
        for x in self.data.iter_mut() {
            *x = f(*x);
        }
        self
    }

    pub fn sum(&self) -> f32 {
        self.data.iter().sum()
    }

    /// Reinterpret the buffer under a new shape with the same element count.
    pub fn reshape(&mut self, new_shape: &[usize]) -> Result<()> {
        let new_len: usize = new_shape.iter().product();
        if new_len != self.data.len() {
            return Err(NnError::shape_mismatch("reshape", &self.shape, new_shape));
        }
        self.shape = new_shape.to_vec();
        self.strides = compute_strides(new_shape);
        Ok(())
    }

    /// Copy rows `start..end` of the leading dimension into a new array.
    ///
    /// # Example
    ///
    /// ```
    /// use rust_cnn::tensor::NDArray;
    ///
    /// let data = NDArray::from_vec(&[3, 2], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
    /// let rows = data.linear_slice(1, 3).unwrap();
    /// assert_eq!(rows.shape(), &[2, 2]);
    /// assert_eq!(rows.data(), &[3.0, 4.0, 5.0, 6.0]);
    /// ```
    pub fn linear_slice(&self, start: usize, end: usize) -> Result<NDArray> {
        let rows = self.shape.first().copied().unwrap_or(0);
        if start > end || end > rows {
            return Err(NnError::BatchOutOfRange { start, end, len: rows });
        }
        let row_len = self.sample_len();
        let mut shape = self.shape.clone();
        shape[0] = end - start;
        NDArray::from_vec(&shape, self.data[start * row_len..end * row_len].to_vec())
    }

    /// Copy batch number `batch` of size `batch_size` from `source` into `self`,
    /// reusing this array's buffer.
    ///
    /// `self` must already have shape `[batch_size, source.shape[1..]]`.
    pub fn copy_batch_from(&mut self, source: &NDArray, batch: usize, batch_size: usize) -> Result<()> {
        if source.shape.is_empty()
            || self.shape.first() != Some(&batch_size)
            || self.shape[1..] != source.shape[1..]
        {
            let mut expected = source.shape.clone();
            if let Some(rows) = expected.first_mut() {
                *rows = batch_size;
            }
            return Err(NnError::shape_mismatch("copy_batch_from", &expected, &self.shape));
        }
        let rows = source.shape[0];
        let start = batch * batch_size;
        let end = start + batch_size;
        if end > rows {
            return Err(NnError::BatchOutOfRange { start, end, len: rows });
        }
        let row_len = source.sample_len();
        self.data
            .copy_from_slice(&source.data[start * row_len..end * row_len]);
        Ok(())
    }

    /// Index of the largest element in each row of the leading dimension.
    pub fn argmax_rows(&self) -> Vec<usize> {
        let row_len = self.sample_len();
        if row_len == 0 {
            return Vec::new();
        }
        self.data
            .chunks_exact(row_len)
            .map(|row| {
                let mut best = 0;
                for (i, &v) in row.iter().enumerate() {
                    if v > row[best] {
                        best = i;
                    }
                }
                best
            })
            .collect()
    }
}
