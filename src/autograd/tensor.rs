//! Tensor type with gradient tracking

use super::backward::{BackwardOp, Node};
use super::storage::Storage;
use crate::error::{Error, Result};
use ndarray::{ArrayD, IxDyn};
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::rc::Rc;

struct TensorInner {
    data: RefCell<Storage>,
    grad: RefCell<Option<ArrayD<f32>>>,
    requires_grad: Cell<bool>,
    retain_grad: Cell<bool>,
    node: Option<Node>,
}

/// Tensor with automatic differentiation support
///
/// `Tensor` is a shared handle: cloning it aliases the same values, gradient
/// slot and graph node. Use [`Tensor::detach`] for an independent copy.
#[derive(Clone)]
pub struct Tensor {
    inner: Rc<TensorInner>,
}

impl Tensor {
    fn from_parts(data: Storage, requires_grad: bool, node: Option<Node>) -> Self {
        Self {
            inner: Rc::new(TensorInner {
                data: RefCell::new(data),
                grad: RefCell::new(None),
                requires_grad: Cell::new(requires_grad),
                retain_grad: Cell::new(false),
                node,
            }),
        }
    }

    /// Create a leaf tensor from an array
    pub fn new(data: ArrayD<f32>, requires_grad: bool) -> Self {
        Self::from_parts(Storage::new(data), requires_grad, None)
    }

    /// Create a leaf tensor from row-major values and a shape
    pub fn from_vec(data: Vec<f32>, shape: &[usize], requires_grad: bool) -> Result<Self> {
        Ok(Self::from_parts(
            Storage::from_vec(shape, data)?,
            requires_grad,
            None,
        ))
    }

    /// Create a leaf tensor from existing storage
    pub fn from_storage(storage: Storage, requires_grad: bool) -> Self {
        Self::from_parts(storage, requires_grad, None)
    }

    /// Create a tensor filled with zeros
    pub fn zeros(shape: &[usize], requires_grad: bool) -> Self {
        Self::from_parts(Storage::zeros(shape), requires_grad, None)
    }

    /// Create a tensor filled with ones
    pub fn ones(shape: &[usize], requires_grad: bool) -> Self {
        Self::from_parts(Storage::ones(shape), requires_grad, None)
    }

    /// Create a single-element tensor of shape `[1]`
    pub fn scalar(value: f32, requires_grad: bool) -> Self {
        Self::from_parts(Storage::full(&[1], value), requires_grad, None)
    }

    /// Wrap an op result, recording a graph node when any input tracks gradients.
    pub(crate) fn from_op(data: ArrayD<f32>, op: BackwardOp, inputs: Vec<Tensor>) -> Self {
        if inputs.iter().any(Tensor::requires_grad) {
            tracing::trace!(op = op.name(), shape = ?data.shape(), "recorded node");
            Self::from_parts(Storage::new(data), true, Some(Node::new(op, inputs)))
        } else {
            Self::from_parts(Storage::new(data), false, None)
        }
    }

    /// Get reference to data
    pub fn data(&self) -> Ref<'_, ArrayD<f32>> {
        Ref::map(self.inner.data.borrow(), Storage::array)
    }

    /// Get mutable reference to data
    ///
    /// Writing to a tensor that a live graph still reads will change the
    /// gradients that graph produces.
    pub fn data_mut(&self) -> RefMut<'_, ArrayD<f32>> {
        RefMut::map(self.inner.data.borrow_mut(), Storage::array_mut)
    }

    /// Get reference to the underlying storage
    pub fn storage(&self) -> Ref<'_, Storage> {
        self.inner.data.borrow()
    }

    /// Values in row-major order
    pub fn to_vec(&self) -> Vec<f32> {
        self.data().iter().copied().collect()
    }

    pub fn shape(&self) -> Vec<usize> {
        self.inner.data.borrow().shape().to_vec()
    }

    pub fn ndim(&self) -> usize {
        self.inner.data.borrow().shape().len()
    }

    /// Number of elements
    pub fn numel(&self) -> usize {
        self.inner.data.borrow().len()
    }

    /// Read one element by multi-index
    pub fn get(&self, index: &[usize]) -> Result<f32> {
        self.inner.data.borrow().get(index)
    }

    /// Write one element by multi-index
    pub fn set(&self, index: &[usize], value: f32) -> Result<()> {
        self.inner.data.borrow_mut().set(index, value)
    }

    /// Value of a single-element tensor
    pub fn item(&self) -> Result<f32> {
        let data = self.data();
        match data.len() {
            1 => Ok(data.iter().copied().sum()),
            n => Err(Error::shape(format!(
                "only one element tensors can be converted to a scalar, got {n}"
            ))),
        }
    }

    /// Get gradient (if computed)
    pub fn grad(&self) -> Option<ArrayD<f32>> {
        self.inner.grad.borrow().clone()
    }

    /// Gradient values in row-major order
    pub fn grad_vec(&self) -> Option<Vec<f32>> {
        self.inner
            .grad
            .borrow()
            .as_ref()
            .map(|g| g.iter().copied().collect())
    }

    /// Set gradient
    pub fn set_grad(&self, grad: ArrayD<f32>) -> Result<()> {
        self.check_grad_shape(&grad)?;
        *self.inner.grad.borrow_mut() = Some(grad);
        Ok(())
    }

    /// Accumulate gradient (for when tensor is used multiple times)
    pub fn accumulate_grad(&self, grad: ArrayD<f32>) -> Result<()> {
        self.check_grad_shape(&grad)?;
        let mut slot = self.inner.grad.borrow_mut();
        match slot.as_mut() {
            Some(existing) => *existing += &grad,
            None => *slot = Some(grad),
        }
        Ok(())
    }

    fn check_grad_shape(&self, grad: &ArrayD<f32>) -> Result<()> {
        let shape = self.shape();
        if grad.shape() != shape.as_slice() {
            return Err(Error::shape(format!(
                "gradient of shape {:?} does not match tensor of shape {:?}",
                grad.shape(),
                shape
            )));
        }
        Ok(())
    }

    /// Zero out gradient
    ///
    /// The slot is kept and filled with zeros of the tensor's shape.
    pub fn zero_grad(&self) {
        let zeros = ArrayD::zeros(IxDyn(&self.shape()));
        *self.inner.grad.borrow_mut() = Some(zeros);
    }

    /// Drop the gradient slot entirely
    pub fn clear_grad(&self) {
        *self.inner.grad.borrow_mut() = None;
    }

    /// Check if requires gradient
    pub fn requires_grad(&self) -> bool {
        self.inner.requires_grad.get()
    }

    /// Toggle gradient tracking on a leaf tensor
    pub fn set_requires_grad(&self, requires_grad: bool) -> Result<()> {
        if !self.is_leaf() {
            return Err(Error::graph(
                "requires_grad can only be changed on leaf tensors",
            ));
        }
        self.inner.requires_grad.set(requires_grad);
        Ok(())
    }

    /// Keep this tensor's gradient after backward even though it is not a leaf
    pub fn retain_grad(&self) -> Result<()> {
        if !self.requires_grad() {
            return Err(Error::graph(
                "can't retain_grad on a tensor that does not require grad",
            ));
        }
        if !self.is_leaf() {
            self.inner.retain_grad.set(true);
        }
        Ok(())
    }

    pub fn retains_grad(&self) -> bool {
        self.inner.retain_grad.get()
    }

    /// True when the tensor was not produced by a recorded operation
    pub fn is_leaf(&self) -> bool {
        self.inner.node.is_none()
    }

    /// Name of the operation that produced this tensor
    pub fn grad_fn(&self) -> Option<&'static str> {
        self.inner.node.as_ref().map(Node::name)
    }

    pub(crate) fn node(&self) -> Option<&Node> {
        self.inner.node.as_ref()
    }

    /// Release this tensor's node and return its inputs, but only when this
    /// handle is the last owner. Shared tensors keep their node intact.
    pub(crate) fn take_unique_inputs(&self) -> Vec<Tensor> {
        match &self.inner.node {
            Some(node) if Rc::strong_count(&self.inner) == 1 => node.take_inputs(),
            _ => Vec::new(),
        }
    }

    /// Identity of the shared tensor state
    pub(crate) fn id(&self) -> usize {
        Rc::as_ptr(&self.inner) as usize
    }

    /// Independent leaf copy of the values, without gradient tracking
    pub fn detach(&self) -> Tensor {
        Self::from_parts(self.inner.data.borrow().clone(), false, None)
    }

    /// Backpropagate from this tensor with an implicit gradient of one
    pub fn backward(&self) -> Result<()> {
        super::engine::backward(self, None)
    }

    /// Backpropagate from this tensor with an explicit upstream gradient
    pub fn backward_with(&self, upstream: ArrayD<f32>) -> Result<()> {
        super::engine::backward(self, Some(upstream))
    }
}

impl PartialEq for Tensor {
    fn eq(&self, other: &Self) -> bool {
        *self.inner.data.borrow() == *other.inner.data.borrow()
    }
}

impl std::fmt::Debug for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("data", &*self.data())
            .field("grad", &self.inner.grad.borrow())
            .field("requires_grad", &self.requires_grad())
            .field("grad_fn", &self.grad_fn())
            .finish()
    }
}
