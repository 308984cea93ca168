//! Shape and broadcast resolution
//!
//! Pure functions over shapes. Broadcasting follows the trailing-alignment
//! rule: shapes are compared from the last dimension backwards, and each pair
//! must be equal or contain a 1. The resolver also records, per operand, which
//! output axes were stretched or missing so backward can sum them away again.

use crate::error::{Error, Result};
use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn};

/// Result of resolving two operand shapes against each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastPlan {
    /// Output shape
    pub shape: Vec<usize>,
    /// Output axes along which the left operand was stretched or absent
    pub lhs_axes: Vec<usize>,
    /// Output axes along which the right operand was stretched or absent
    pub rhs_axes: Vec<usize>,
}

/// Size of `dims` at output axis `axis` once right-aligned to `rank`.
fn aligned_dim(dims: &[usize], rank: usize, axis: usize) -> Option<usize> {
    let offset = rank - dims.len();
    (axis >= offset).then(|| dims[axis - offset])
}

/// Resolve the broadcast output shape of two operands.
pub fn broadcast_shape(lhs: &[usize], rhs: &[usize]) -> Result<BroadcastPlan> {
    let rank = lhs.len().max(rhs.len());
    let mut shape = Vec::with_capacity(rank);
    let mut lhs_axes = Vec::new();
    let mut rhs_axes = Vec::new();

    for axis in 0..rank {
        let l = aligned_dim(lhs, rank, axis);
        let r = aligned_dim(rhs, rank, axis);
        let out = match (l, r) {
            (Some(a), Some(b)) if a == b => a,
            (Some(1), Some(b)) => b,
            (Some(a), Some(1)) => a,
            (Some(_), Some(_)) => {
                return Err(Error::Broadcast {
                    lhs: lhs.to_vec(),
                    rhs: rhs.to_vec(),
                })
            }
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => 1,
        };
        if l != Some(out) {
            lhs_axes.push(axis);
        }
        if r != Some(out) {
            rhs_axes.push(axis);
        }
        shape.push(out);
    }

    Ok(BroadcastPlan {
        shape,
        lhs_axes,
        rhs_axes,
    })
}

/// Shape left after reducing `dims`.
///
/// Reduced dims are removed, or kept with size 1 when `keepdim` is set.
pub fn reduce_shape(shape: &[usize], dims: &[usize], keepdim: bool) -> Result<Vec<usize>> {
    for (i, &dim) in dims.iter().enumerate() {
        if dim >= shape.len() {
            return Err(Error::value(format!(
                "dimension {dim} out of range for tensor of rank {}",
                shape.len()
            )));
        }
        if dims[..i].contains(&dim) {
            return Err(Error::value(format!("dimension {dim} appears more than once")));
        }
    }

    Ok(shape
        .iter()
        .enumerate()
        .filter_map(|(axis, &size)| match (dims.contains(&axis), keepdim) {
            (false, _) => Some(size),
            (true, true) => Some(1),
            (true, false) => None,
        })
        .collect())
}

/// Output shape of `lhs @ rhs`.
///
/// `lhs` is `(..., m, k)`; its leading dims act as a batch of rows against a
/// single `(k, n)` right operand.
pub fn matmul_shape(lhs: &[usize], rhs: &[usize]) -> Result<Vec<usize>> {
    if lhs.len() < 2 || rhs.len() != 2 {
        return Err(Error::shape(format!(
            "matmul expects (..., m, k) x (k, n), got {lhs:?} x {rhs:?}"
        )));
    }
    let k = lhs[lhs.len() - 1];
    if k != rhs[0] {
        return Err(Error::shape(format!(
            "matmul inner dimensions differ: {lhs:?} x {rhs:?}"
        )));
    }
    let mut shape = lhs[..lhs.len() - 1].to_vec();
    shape.push(rhs[1]);
    Ok(shape)
}

/// Broadcast `array` to `shape` without copying.
pub fn broadcast_to<'a>(array: &'a ArrayD<f32>, shape: &[usize]) -> Result<ArrayViewD<'a, f32>> {
    array.broadcast(IxDyn(shape)).ok_or_else(|| Error::Broadcast {
        lhs: array.shape().to_vec(),
        rhs: shape.to_vec(),
    })
}

/// Copy `array` into a new shape with the same element count.
pub fn reshape(array: &ArrayD<f32>, shape: &[usize]) -> Result<ArrayD<f32>> {
    ArrayD::from_shape_vec(IxDyn(shape), array.iter().copied().collect())
        .map_err(|e| Error::shape(format!("cannot reshape {:?} to {shape:?}: {e}", array.shape())))
}

/// Shrink a broadcast gradient back to an operand's shape.
///
/// `axes` are output axes the operand was stretched along (from
/// [`BroadcastPlan`]); they are summed with rank kept, then the result is
/// reshaped, which drops the leading axes the operand never had.
pub fn unbroadcast(grad: &ArrayD<f32>, axes: &[usize], shape: &[usize]) -> Result<ArrayD<f32>> {
    if axes.is_empty() && grad.shape() == shape {
        return Ok(grad.clone());
    }
    let mut reduced = grad.clone();
    for &axis in axes {
        reduced = reduced.sum_axis(Axis(axis)).insert_axis(Axis(axis));
    }
    reshape(&reduced, shape)
}

/// Re-expand a reduced gradient over the dims it was summed along.
pub fn expand_reduced(
    grad: &ArrayD<f32>,
    input_shape: &[usize],
    dims: &[usize],
) -> Result<ArrayD<f32>> {
    let kept = reduce_shape(input_shape, dims, true)?;
    let grad = reshape(grad, &kept)?;
    Ok(broadcast_to(&grad, input_shape)?.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_trailing_vector() {
        let plan = broadcast_shape(&[3, 2], &[2]).unwrap();
        assert_eq!(plan.shape, vec![3, 2]);
        assert!(plan.lhs_axes.is_empty());
        assert_eq!(plan.rhs_axes, vec![0]);
    }

    #[test]
    fn test_broadcast_stretched_and_absent_axes() {
        let plan = broadcast_shape(&[4, 1, 3], &[5, 1]).unwrap();
        assert_eq!(plan.shape, vec![4, 5, 3]);
        assert_eq!(plan.lhs_axes, vec![1]);
        assert_eq!(plan.rhs_axes, vec![0, 2]);
    }

    #[test]
    fn test_broadcast_is_symmetric_in_shape() {
        let a = broadcast_shape(&[2, 2], &[1]).unwrap();
        let b = broadcast_shape(&[1], &[2, 2]).unwrap();
        assert_eq!(a.shape, b.shape);
        assert_eq!(a.lhs_axes, b.rhs_axes);
    }

    #[test]
    fn test_broadcast_mismatch() {
        let err = broadcast_shape(&[3, 2], &[3]).unwrap_err();
        assert!(matches!(err, Error::Broadcast { .. }));
    }

    #[test]
    fn test_reduce_shape() {
        assert_eq!(reduce_shape(&[2, 3, 4], &[1], false).unwrap(), vec![2, 4]);
        assert_eq!(reduce_shape(&[2, 3, 4], &[1], true).unwrap(), vec![2, 1, 4]);
        assert_eq!(reduce_shape(&[2, 3], &[0, 1], false).unwrap(), Vec::<usize>::new());
        assert!(matches!(reduce_shape(&[2, 3], &[2], false), Err(Error::Value(_))));
        assert!(matches!(reduce_shape(&[2, 3], &[1, 1], false), Err(Error::Value(_))));
    }

    #[test]
    fn test_matmul_shape() {
        assert_eq!(matmul_shape(&[3, 2], &[2, 5]).unwrap(), vec![3, 5]);
        assert_eq!(matmul_shape(&[2, 2, 2], &[2, 4]).unwrap(), vec![2, 2, 4]);
        assert!(matches!(matmul_shape(&[3, 2], &[3, 5]), Err(Error::Shape(_))));
        assert!(matches!(matmul_shape(&[3], &[3, 5]), Err(Error::Shape(_))));
    }

    #[test]
    fn test_unbroadcast_sums_stretched_axes() {
        let grad = ArrayD::from_elem(IxDyn(&[3, 2]), 1.0f32);
        let plan = broadcast_shape(&[3, 2], &[2]).unwrap();
        let reduced = unbroadcast(&grad, &plan.rhs_axes, &[2]).unwrap();
        assert_eq!(reduced.shape(), &[2]);
        assert_eq!(reduced.iter().copied().collect::<Vec<_>>(), vec![3.0, 3.0]);
    }

    #[test]
    fn test_expand_reduced_restores_shape() {
        let grad = ArrayD::from_shape_vec(IxDyn(&[2]), vec![1.0f32, 2.0]).unwrap();
        let expanded = expand_reduced(&grad, &[2, 3], &[1]).unwrap();
        assert_eq!(expanded.shape(), &[2, 3]);
        assert_eq!(
            expanded.iter().copied().collect::<Vec<_>>(),
            vec![1.0, 1.0, 1.0, 2.0, 2.0, 2.0]
        );
    }
}
