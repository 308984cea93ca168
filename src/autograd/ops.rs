//! Autograd operations
//!
//! Every op validates its operands before allocating anything, computes the
//! forward value, and records a graph node only when an input tracks
//! gradients.

use super::backward::{as_matrix, BackwardOp, Reduction};
use super::shape::{broadcast_shape, broadcast_to, matmul_shape, reduce_shape, reshape};
use super::storage::numel;
use super::Tensor;
use crate::error::{Error, Result};
use ndarray::{ArrayD, Axis, IxDyn, Zip};

/// Shared forward path of the broadcasting binary ops.
fn broadcast_binary<F, B>(a: &Tensor, b: &Tensor, f: F, make_op: B) -> Result<Tensor>
where
    F: Fn(f32, f32) -> f32,
    B: FnOnce(Vec<usize>, Vec<usize>) -> BackwardOp,
{
    let plan = broadcast_shape(&a.shape(), &b.shape())?;
    let data = {
        let (a_data, b_data) = (a.data(), b.data());
        let a_view = broadcast_to(&a_data, &plan.shape)?;
        let b_view = broadcast_to(&b_data, &plan.shape)?;
        Zip::from(&a_view)
            .and(&b_view)
            .map_collect(|&x, &y| f(x, y))
    };
    let op = make_op(plan.lhs_axes, plan.rhs_axes);
    Ok(Tensor::from_op(data, op, vec![a.clone(), b.clone()]))
}

/// Add two tensors element-wise with broadcasting
pub fn add(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    broadcast_binary(a, b, |x, y| x + y, |lhs_axes, rhs_axes| BackwardOp::Add {
        lhs_axes,
        rhs_axes,
    })
}

/// Subtract `b` from `a` element-wise with broadcasting
pub fn sub(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    broadcast_binary(a, b, |x, y| x - y, |lhs_axes, rhs_axes| BackwardOp::Sub {
        lhs_axes,
        rhs_axes,
    })
}

/// Multiply two tensors element-wise with broadcasting
pub fn mul(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    broadcast_binary(a, b, |x, y| x * y, |lhs_axes, rhs_axes| BackwardOp::Mul {
        lhs: a.data().clone(),
        rhs: b.data().clone(),
        lhs_axes,
        rhs_axes,
    })
}

/// Divide `a` by `b` element-wise with broadcasting
pub fn div(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    broadcast_binary(a, b, |x, y| x / y, |lhs_axes, rhs_axes| BackwardOp::Div {
        lhs: a.data().clone(),
        rhs: b.data().clone(),
        lhs_axes,
        rhs_axes,
    })
}

/// Matrix multiplication
///
/// Computes C = A @ B where:
/// - A is (..., m, k); leading dims are treated as extra rows
/// - B is (k, n)
/// - C is (..., m, n)
pub fn matmul(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    let b_shape = b.shape();
    let shape = matmul_shape(&a.shape(), &b_shape)?;
    let (k, n) = (b_shape[0], b_shape[1]);

    let product = {
        let a_mat = as_matrix(&a.data(), k)?;
        let b_mat = as_matrix(&b.data(), n)?;
        a_mat.dot(&b_mat)
    };
    let data = reshape(&product.into_dyn(), &shape)?;
    let op = BackwardOp::Matmul {
        lhs: a.data().clone(),
        rhs: b.data().clone(),
    };
    Ok(Tensor::from_op(data, op, vec![a.clone(), b.clone()]))
}

fn reduce_sum(x: &Tensor, dims: Vec<usize>, keepdim: bool) -> Result<Tensor> {
    let out_shape = reduce_shape(&x.shape(), &dims, keepdim)?;
    let data = {
        let mut reduced = x.data().clone();
        let mut sorted = dims.clone();
        sorted.sort_unstable_by(|p, q| q.cmp(p));
        for &dim in &sorted {
            reduced = reduced.sum_axis(Axis(dim));
        }
        reshape(&reduced, &out_shape)?
    };
    Ok(Tensor::from_op(data, BackwardOp::Sum { dims }, vec![x.clone()]))
}

/// Sum elements along `dim`, or all elements when `dim` is `None`
///
/// Summing everything yields a single-element tensor of shape `[1]`.
pub fn sum(x: &Tensor, dim: Option<usize>) -> Result<Tensor> {
    match dim {
        Some(dim) => reduce_sum(x, vec![dim], false),
        None => {
            let dims: Vec<usize> = (0..x.ndim()).collect();
            let total = x.data().sum();
            let data = ArrayD::from_elem(IxDyn(&[1]), total);
            Ok(Tensor::from_op(data, BackwardOp::Sum { dims }, vec![x.clone()]))
        }
    }
}

/// Sum along `dim`, keeping it as a size-1 dimension
pub fn sum_keepdim(x: &Tensor, dim: usize) -> Result<Tensor> {
    reduce_sum(x, vec![dim], true)
}

/// Mean of all elements
pub fn mean(x: &Tensor) -> Result<Tensor> {
    if x.numel() == 0 {
        return Err(Error::value("mean of an empty tensor"));
    }
    let value = x.data().sum() / x.numel() as f32;
    let data = ArrayD::from_elem(IxDyn(&[1]), value);
    Ok(Tensor::from_op(data, BackwardOp::Mean, vec![x.clone()]))
}

/// Negate element-wise
pub fn neg(x: &Tensor) -> Tensor {
    let data = -&*x.data();
    Tensor::from_op(data, BackwardOp::Neg, vec![x.clone()])
}

/// Exponential element-wise
pub fn exp(x: &Tensor) -> Tensor {
    let data = x.data().mapv(f32::exp);
    let op = BackwardOp::Exp {
        output: data.clone(),
    };
    Tensor::from_op(data, op, vec![x.clone()])
}

/// Natural logarithm element-wise
pub fn log(x: &Tensor) -> Tensor {
    let input = x.data().clone();
    let data = input.mapv(f32::ln);
    Tensor::from_op(data, BackwardOp::Log { input }, vec![x.clone()])
}

/// ReLU activation
pub fn relu(x: &Tensor) -> Tensor {
    let (data, mask) = {
        let input = x.data();
        (
            input.mapv(|v| v.max(0.0)),
            input.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
        )
    };
    Tensor::from_op(data, BackwardOp::Relu { mask }, vec![x.clone()])
}

/// Hyperbolic tangent activation
pub fn tanh(x: &Tensor) -> Tensor {
    let data = x.data().mapv(f32::tanh);
    let op = BackwardOp::Tanh {
        output: data.clone(),
    };
    Tensor::from_op(data, op, vec![x.clone()])
}

/// Numerically stable softmax along `dim`
pub fn softmax(x: &Tensor, dim: usize) -> Result<Tensor> {
    reduce_shape(&x.shape(), &[dim], true)?;
    let mut data = x.data().clone();
    for mut lane in data.lanes_mut(Axis(dim)) {
        let max = lane.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        lane.mapv_inplace(|v| (v - max).exp());
        let total = lane.sum();
        lane.mapv_inplace(|v| v / total);
    }
    let op = BackwardOp::Softmax {
        output: data.clone(),
        dim,
    };
    Ok(Tensor::from_op(data, op, vec![x.clone()]))
}

/// Mean squared error
///
/// Squares `pred - target` element-wise, then sums or averages over all
/// elements. Both tensors must have the same shape.
pub fn mse_loss(pred: &Tensor, target: &Tensor, reduction: Reduction) -> Result<Tensor> {
    if pred.shape() != target.shape() {
        return Err(Error::shape(format!(
            "mse_loss expects matching shapes, got {:?} and {:?}",
            pred.shape(),
            target.shape()
        )));
    }
    let diff = &*pred.data() - &*target.data();
    let total: f32 = diff.iter().map(|d| d * d).sum();
    let value = match reduction {
        Reduction::Sum => total,
        Reduction::Mean => total / diff.len().max(1) as f32,
    };
    let data = ArrayD::from_elem(IxDyn(&[1]), value);
    let op = BackwardOp::MseLoss { diff, reduction };
    Ok(Tensor::from_op(data, op, vec![pred.clone(), target.clone()]))
}

/// Cross-entropy between logits and target distributions
///
/// Softmax runs over the last dimension; every other dimension indexes a
/// sample. The per-sample losses are averaged into a `[1]` tensor.
pub fn cross_entropy(logits: &Tensor, target: &Tensor) -> Result<Tensor> {
    let shape = logits.shape();
    if shape != target.shape() {
        return Err(Error::shape(format!(
            "cross_entropy expects matching shapes, got {:?} and {:?}",
            shape,
            target.shape()
        )));
    }
    if shape.is_empty() || numel(&shape) == 0 {
        return Err(Error::shape("cross_entropy needs at least one class"));
    }
    let last = Axis(shape.len() - 1);
    let rows = numel(&shape) / shape[shape.len() - 1];

    let mut log_probs = logits.data().clone();
    for mut lane in log_probs.lanes_mut(last) {
        let max = lane.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        let log_total = lane.fold(0.0, |acc, &v| acc + (v - max).exp()).ln() + max;
        lane.mapv_inplace(|v| v - log_total);
    }
    let target_data = target.data().clone();
    let total: f32 = Zip::from(&log_probs)
        .and(&target_data)
        .fold(0.0, |acc, &lp, &t| acc - t * lp);
    let data = ArrayD::from_elem(IxDyn(&[1]), total / rows as f32);

    let op = BackwardOp::CrossEntropy {
        log_probs,
        target: target_data,
        rows,
    };
    Ok(Tensor::from_op(data, op, vec![logits.clone(), target.clone()]))
}

/// Binary cross-entropy between probabilities and 0/1 targets
///
/// Computes `-mean(t * ln(o) + (1 - t) * ln(1 - o))` over all elements.
/// `output` is expected to lie strictly inside `(0, 1)`, e.g. after a sigmoid.
pub fn binary_cross_entropy(output: &Tensor, target: &Tensor) -> Result<Tensor> {
    if output.shape() != target.shape() {
        return Err(Error::shape(format!(
            "binary_cross_entropy expects matching shapes, got {:?} and {:?}",
            output.shape(),
            target.shape()
        )));
    }
    if output.numel() == 0 {
        return Err(Error::value("binary_cross_entropy of an empty tensor"));
    }
    let (out_data, target_data) = (output.data().clone(), target.data().clone());
    let total: f32 = Zip::from(&out_data)
        .and(&target_data)
        .fold(0.0, |acc, &o, &t| acc + t * o.ln() + (1.0 - t) * (1.0 - o).ln());
    let data = ArrayD::from_elem(IxDyn(&[1]), -total / out_data.len() as f32);

    let op = BackwardOp::BinaryCrossEntropy {
        output: out_data,
        target: target_data,
    };
    Ok(Tensor::from_op(data, op, vec![output.clone(), target.clone()]))
}

/// Reshape to `shape`, keeping the element order
pub fn view(x: &Tensor, shape: &[usize]) -> Result<Tensor> {
    let data = x.storage().reshape(shape)?.into_array();
    Ok(Tensor::from_op(data, BackwardOp::View, vec![x.clone()]))
}
