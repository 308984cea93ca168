//! Graph nodes and per-op backward rules
//!
//! Each recorded operation becomes a [`Node`] owned by its output tensor. The
//! node keeps strong handles to its inputs plus whatever the backward rule
//! needs from the forward pass, tagged by [`BackwardOp`]. Backward rules are
//! dispatched with a single `match` rather than one trait object per op.

use super::shape::{broadcast_to, expand_reduced, reshape, unbroadcast};
use super::Tensor;
use crate::error::{Error, Result};
use ndarray::{Array2, ArrayD, Axis, Zip};
use std::cell::RefCell;

/// How a loss collapses per-element error into a scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reduction {
    Sum,
    #[default]
    Mean,
}

impl std::str::FromStr for Reduction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sum" => Ok(Self::Sum),
            "mean" => Ok(Self::Mean),
            other => Err(Error::value(format!(
                "invalid reduction mode '{other}' (expected 'sum' or 'mean')"
            ))),
        }
    }
}

/// Operation kind plus the forward-time values its backward rule reads.
#[derive(Debug, Clone)]
pub enum BackwardOp {
    Add {
        lhs_axes: Vec<usize>,
        rhs_axes: Vec<usize>,
    },
    Sub {
        lhs_axes: Vec<usize>,
        rhs_axes: Vec<usize>,
    },
    Mul {
        lhs: ArrayD<f32>,
        rhs: ArrayD<f32>,
        lhs_axes: Vec<usize>,
        rhs_axes: Vec<usize>,
    },
    Div {
        lhs: ArrayD<f32>,
        rhs: ArrayD<f32>,
        lhs_axes: Vec<usize>,
        rhs_axes: Vec<usize>,
    },
    Matmul {
        lhs: ArrayD<f32>,
        rhs: ArrayD<f32>,
    },
    Sum {
        dims: Vec<usize>,
    },
    Mean,
    Neg,
    Exp {
        output: ArrayD<f32>,
    },
    Log {
        input: ArrayD<f32>,
    },
    Relu {
        mask: ArrayD<f32>,
    },
    Tanh {
        output: ArrayD<f32>,
    },
    Softmax {
        output: ArrayD<f32>,
        dim: usize,
    },
    MseLoss {
        diff: ArrayD<f32>,
        reduction: Reduction,
    },
    CrossEntropy {
        log_probs: ArrayD<f32>,
        target: ArrayD<f32>,
        rows: usize,
    },
    BinaryCrossEntropy {
        output: ArrayD<f32>,
        target: ArrayD<f32>,
    },
    View,
}

impl BackwardOp {
    /// Name reported as the tensor's `grad_fn`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Add { .. } => "AddBackward",
            Self::Sub { .. } => "SubBackward",
            Self::Mul { .. } => "MulBackward",
            Self::Div { .. } => "DivBackward",
            Self::Matmul { .. } => "MatmulBackward",
            Self::Sum { .. } => "SumBackward",
            Self::Mean => "MeanBackward",
            Self::Neg => "NegBackward",
            Self::Exp { .. } => "ExpBackward",
            Self::Log { .. } => "LogBackward",
            Self::Relu { .. } => "ReluBackward",
            Self::Tanh { .. } => "TanhBackward",
            Self::Softmax { .. } => "SoftmaxBackward",
            Self::MseLoss { .. } => "MseLossBackward",
            Self::CrossEntropy { .. } => "CrossEntropyBackward",
            Self::BinaryCrossEntropy { .. } => "BinaryCrossEntropyBackward",
            Self::View => "ViewBackward",
        }
    }

    /// Gradient for each input given the upstream gradient `grad`.
    ///
    /// Returns one entry per input, `None` where the input does not track
    /// gradients.
    pub(crate) fn backward(
        &self,
        inputs: &[Tensor],
        grad: &ArrayD<f32>,
    ) -> Result<Vec<Option<ArrayD<f32>>>> {
        match self {
            Self::Add { lhs_axes, rhs_axes } => {
                let (a, b) = (&inputs[0], &inputs[1]);
                Ok(vec![
                    tracked(a, || unbroadcast(grad, lhs_axes, &a.shape()))?,
                    tracked(b, || unbroadcast(grad, rhs_axes, &b.shape()))?,
                ])
            }
            Self::Sub { lhs_axes, rhs_axes } => {
                let (a, b) = (&inputs[0], &inputs[1]);
                Ok(vec![
                    tracked(a, || unbroadcast(grad, lhs_axes, &a.shape()))?,
                    tracked(b, || Ok(-unbroadcast(grad, rhs_axes, &b.shape())?))?,
                ])
            }
            Self::Mul {
                lhs,
                rhs,
                lhs_axes,
                rhs_axes,
            } => {
                let (a, b) = (&inputs[0], &inputs[1]);
                let a_view = broadcast_to(lhs, grad.shape())?;
                let b_view = broadcast_to(rhs, grad.shape())?;
                Ok(vec![
                    tracked(a, || unbroadcast(&(grad * &b_view), lhs_axes, lhs.shape()))?,
                    tracked(b, || unbroadcast(&(grad * &a_view), rhs_axes, rhs.shape()))?,
                ])
            }
            Self::Div {
                lhs,
                rhs,
                lhs_axes,
                rhs_axes,
            } => {
                let (a, b) = (&inputs[0], &inputs[1]);
                let a_view = broadcast_to(lhs, grad.shape())?;
                let b_view = broadcast_to(rhs, grad.shape())?;
                Ok(vec![
                    tracked(a, || unbroadcast(&(grad / &b_view), lhs_axes, lhs.shape()))?,
                    tracked(b, || {
                        let local = Zip::from(grad)
                            .and(&a_view)
                            .and(&b_view)
                            .map_collect(|&g, &x, &y| -g * x / (y * y));
                        unbroadcast(&local, rhs_axes, rhs.shape())
                    })?,
                ])
            }
            Self::Matmul { lhs, rhs } => matmul_backward(&inputs[0], &inputs[1], lhs, rhs, grad),
            Self::Sum { dims } => {
                let x = &inputs[0];
                Ok(vec![tracked(x, || expand_reduced(grad, &x.shape(), dims))?])
            }
            Self::Mean => {
                let x = &inputs[0];
                let n = x.numel() as f32;
                Ok(vec![tracked(x, || {
                    let dims: Vec<usize> = (0..x.ndim()).collect();
                    Ok(expand_reduced(grad, &x.shape(), &dims)? / n)
                })?])
            }
            Self::Neg => Ok(vec![tracked(&inputs[0], || Ok(-grad))?]),
            Self::Exp { output } => Ok(vec![tracked(&inputs[0], || Ok(grad * output))?]),
            Self::Log { input } => Ok(vec![tracked(&inputs[0], || Ok(grad / input))?]),
            Self::Relu { mask } => Ok(vec![tracked(&inputs[0], || Ok(grad * mask))?]),
            Self::Tanh { output } => Ok(vec![tracked(&inputs[0], || {
                Ok(Zip::from(grad)
                    .and(output)
                    .map_collect(|&g, &y| g * (1.0 - y * y)))
            })?]),
            Self::Softmax { output, dim } => Ok(vec![tracked(&inputs[0], || {
                let weighted = (grad * output).sum_axis(Axis(*dim)).insert_axis(Axis(*dim));
                let weighted = broadcast_to(&weighted, grad.shape())?;
                Ok(output * &(grad - &weighted))
            })?]),
            Self::MseLoss { diff, reduction } => {
                let g = scalar_grad(grad)?;
                let scale = match reduction {
                    Reduction::Sum => 2.0 * g,
                    Reduction::Mean => 2.0 * g / diff.len() as f32,
                };
                let (pred, target) = (&inputs[0], &inputs[1]);
                Ok(vec![
                    tracked(pred, || Ok(diff * scale))?,
                    tracked(target, || Ok(diff * -scale))?,
                ])
            }
            Self::CrossEntropy {
                log_probs,
                target,
                rows,
            } => {
                let g = scalar_grad(grad)? / *rows as f32;
                let last = Axis(log_probs.ndim() - 1);
                Ok(vec![
                    tracked(&inputs[0], || {
                        let mass = target.sum_axis(last).insert_axis(last);
                        let mass = broadcast_to(&mass, log_probs.shape())?;
                        Ok(Zip::from(log_probs)
                            .and(target)
                            .and(&mass)
                            .map_collect(|&lp, &t, &m| g * (lp.exp() * m - t)))
                    })?,
                    tracked(&inputs[1], || Ok(log_probs * -g))?,
                ])
            }
            Self::BinaryCrossEntropy { output, target } => {
                let g = -scalar_grad(grad)? / output.len() as f32;
                Ok(vec![
                    tracked(&inputs[0], || {
                        Ok(Zip::from(output)
                            .and(target)
                            .map_collect(|&o, &t| g * (t / o - (1.0 - t) / (1.0 - o))))
                    })?,
                    tracked(&inputs[1], || {
                        Ok(output.mapv(|o| g * (o.ln() - (1.0 - o).ln())))
                    })?,
                ])
            }
            Self::View => {
                let x = &inputs[0];
                Ok(vec![tracked(x, || reshape(grad, &x.shape()))?])
            }
        }
    }
}

/// Run `f` only for inputs that take part in the backward pass.
fn tracked<F>(input: &Tensor, f: F) -> Result<Option<ArrayD<f32>>>
where
    F: FnOnce() -> Result<ArrayD<f32>>,
{
    if input.requires_grad() {
        f().map(Some)
    } else {
        Ok(None)
    }
}

fn scalar_grad(grad: &ArrayD<f32>) -> Result<f32> {
    match grad.len() {
        1 => Ok(grad.iter().copied().sum()),
        n => Err(Error::shape(format!(
            "loss gradient must have one element, got {n}"
        ))),
    }
}

/// Flatten `(..., rows, cols)` into a row-major matrix.
pub(crate) fn as_matrix(array: &ArrayD<f32>, cols: usize) -> Result<Array2<f32>> {
    let rows = if cols == 0 { 0 } else { array.len() / cols };
    Array2::from_shape_vec((rows, cols), array.iter().copied().collect())
        .map_err(|e| Error::shape(e.to_string()))
}

fn matmul_backward(
    a: &Tensor,
    b: &Tensor,
    lhs: &ArrayD<f32>,
    rhs: &ArrayD<f32>,
    grad: &ArrayD<f32>,
) -> Result<Vec<Option<ArrayD<f32>>>> {
    let (k, n) = (rhs.shape()[0], rhs.shape()[1]);
    let g = as_matrix(grad, n)?;

    // dA = dC @ B^T
    let grad_a = tracked(a, || {
        let b_mat = as_matrix(rhs, n)?;
        reshape(&g.dot(&b_mat.t()).into_dyn(), lhs.shape())
    })?;

    // dB = A^T @ dC
    let grad_b = tracked(b, || {
        let a_mat = as_matrix(lhs, k)?;
        reshape(&a_mat.t().dot(&g).into_dyn(), rhs.shape())
    })?;

    Ok(vec![grad_a, grad_b])
}

struct NodeState {
    op: BackwardOp,
    inputs: Vec<Tensor>,
}

/// One recorded operation in the computation graph.
///
/// A node is released after its backward rule runs: inputs and cached values
/// are dropped, and any later traversal reaching it fails.
pub(crate) struct Node {
    name: &'static str,
    state: RefCell<Option<NodeState>>,
}

impl Node {
    pub(crate) fn new(op: BackwardOp, inputs: Vec<Tensor>) -> Self {
        Self {
            name: op.name(),
            state: RefCell::new(Some(NodeState { op, inputs })),
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn is_released(&self) -> bool {
        self.state.borrow().is_none()
    }

    /// Handles to the node's inputs, or `None` once released.
    pub(crate) fn inputs(&self) -> Option<Vec<Tensor>> {
        self.state.borrow().as_ref().map(|s| s.inputs.clone())
    }

    /// Release the node, handing back its inputs.
    pub(crate) fn take_inputs(&self) -> Vec<Tensor> {
        self.state
            .borrow_mut()
            .take()
            .map(|state| state.inputs)
            .unwrap_or_default()
    }

    /// Run the backward rule and release the node.
    pub(crate) fn run_backward(
        &self,
        grad: &ArrayD<f32>,
    ) -> Result<Vec<(Tensor, ArrayD<f32>)>> {
        let state = self.state.borrow_mut().take().ok_or_else(|| {
            Error::graph(format!("{} has already been released", self.name))
        })?;
        let grads = state.op.backward(&state.inputs, grad)?;
        Ok(state
            .inputs
            .into_iter()
            .zip(grads)
            .filter_map(|(input, g)| g.map(|g| (input, g)))
            .collect())
    }
}

// Frees uniquely owned input chains with a worklist; stack depth stays
// constant however long the graph is.
impl Drop for Node {
    fn drop(&mut self) {
        let mut pending = self.take_inputs();
        while let Some(tensor) = pending.pop() {
            pending.extend(tensor.take_unique_inputs());
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    #[test]
    fn test_reduction_from_str() {
        assert_eq!("sum".parse::<Reduction>().unwrap(), Reduction::Sum);
        assert_eq!("mean".parse::<Reduction>().unwrap(), Reduction::Mean);
        assert!(matches!("max".parse::<Reduction>(), Err(Error::Value(_))));
    }

    #[test]
    fn test_node_releases_after_backward() {
        let a = Tensor::from_vec(vec![1.0, 2.0], &[2], true).unwrap();
        let node = Node::new(BackwardOp::Neg, vec![a.clone()]);
        assert!(!node.is_released());

        let grad = ArrayD::from_elem(IxDyn(&[2]), 1.0);
        let grads = node.run_backward(&grad).unwrap();
        assert_eq!(grads.len(), 1);
        assert_eq!(grads[0].1.iter().copied().collect::<Vec<_>>(), vec![-1.0, -1.0]);

        assert!(node.is_released());
        assert!(node.inputs().is_none());
        assert!(matches!(node.run_backward(&grad), Err(Error::Graph(_))));
    }

    #[test]
    fn test_untracked_inputs_get_no_gradient() {
        let a = Tensor::from_vec(vec![1.0, 2.0], &[2], true).unwrap();
        let b = Tensor::from_vec(vec![3.0, 4.0], &[2], false).unwrap();
        let op = BackwardOp::Mul {
            lhs: a.data().clone(),
            rhs: b.data().clone(),
            lhs_axes: vec![],
            rhs_axes: vec![],
        };
        let grad = ArrayD::from_elem(IxDyn(&[2]), 1.0);
        let grads = op.backward(&[a, b], &grad).unwrap();
        assert_eq!(grads[0].as_ref().unwrap().iter().copied().collect::<Vec<_>>(), vec![3.0, 4.0]);
        assert!(grads[0].is_some());
        assert!(grads[1].is_none());
    }
}
