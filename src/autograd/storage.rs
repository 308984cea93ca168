//! Dense element storage

use crate::error::{Error, Result};
use ndarray::{ArrayD, ArrayViewD, IxDyn};

/// Row-major strides for a contiguous buffer of the given shape.
pub fn contiguous_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for axis in (0..shape.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * shape[axis + 1];
    }
    strides
}

/// Number of elements described by a shape.
pub fn numel(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Contiguous `f32` buffer with shape and stride metadata.
///
/// Owned storage is always kept in standard (row-major) layout, so `strides()`
/// agrees with [`contiguous_strides`] and `view` never has to copy.
#[derive(Clone, Debug, PartialEq)]
pub struct Storage {
    data: ArrayD<f32>,
}

impl Storage {
    /// Wrap an array, normalizing it to standard layout.
    pub fn new(data: ArrayD<f32>) -> Self {
        if data.is_standard_layout() {
            Self { data }
        } else {
            Self {
                data: data.as_standard_layout().into_owned(),
            }
        }
    }

    /// Zero-initialized buffer.
    pub fn zeros(shape: &[usize]) -> Self {
        Self {
            data: ArrayD::zeros(IxDyn(shape)),
        }
    }

    pub fn ones(shape: &[usize]) -> Self {
        Self::full(shape, 1.0)
    }

    pub fn full(shape: &[usize], value: f32) -> Self {
        Self {
            data: ArrayD::from_elem(IxDyn(shape), value),
        }
    }

    /// Build storage from row-major values.
    pub fn from_vec(shape: &[usize], data: Vec<f32>) -> Result<Self> {
        if numel(shape) != data.len() {
            return Err(Error::shape(format!(
                "shape {:?} needs {} elements, got {}",
                shape,
                numel(shape),
                data.len()
            )));
        }
        let data = ArrayD::from_shape_vec(IxDyn(shape), data)
            .map_err(|e| Error::shape(e.to_string()))?;
        Ok(Self { data })
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn strides(&self) -> Vec<usize> {
        contiguous_strides(self.data.shape())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn array(&self) -> &ArrayD<f32> {
        &self.data
    }

    pub fn array_mut(&mut self) -> &mut ArrayD<f32> {
        &mut self.data
    }

    pub fn into_array(self) -> ArrayD<f32> {
        self.data
    }

    fn check_index(&self, index: &[usize]) -> Result<()> {
        if index.len() != self.data.ndim() {
            return Err(Error::shape(format!(
                "index {:?} has rank {}, storage has rank {}",
                index,
                index.len(),
                self.data.ndim()
            )));
        }
        for (axis, (&i, &dim)) in index.iter().zip(self.data.shape()).enumerate() {
            if i >= dim {
                return Err(Error::value(format!(
                    "index {i} is out of bounds for axis {axis} with size {dim}"
                )));
            }
        }
        Ok(())
    }

    /// Read one element by multi-index.
    pub fn get(&self, index: &[usize]) -> Result<f32> {
        self.check_index(index)?;
        Ok(self.data[IxDyn(index)])
    }

    /// Write one element by multi-index.
    pub fn set(&mut self, index: &[usize], value: f32) -> Result<()> {
        self.check_index(index)?;
        self.data[IxDyn(index)] = value;
        Ok(())
    }

    /// Reinterpret the shape without copying.
    pub fn view(&self, shape: &[usize]) -> Result<ArrayViewD<'_, f32>> {
        if numel(shape) != self.data.len() {
            return Err(Error::shape(format!(
                "cannot view storage of shape {:?} as {:?}",
                self.data.shape(),
                shape
            )));
        }
        let slice = self
            .data
            .as_slice()
            .ok_or_else(|| Error::shape("storage is not contiguous"))?;
        ArrayViewD::from_shape(IxDyn(shape), slice).map_err(|e| Error::shape(e.to_string()))
    }

    /// Owned copy with a new shape.
    pub fn reshape(&self, shape: &[usize]) -> Result<Self> {
        Ok(Self {
            data: self.view(shape)?.to_owned(),
        })
    }
}
