//! Backward engine
//!
//! Orders the graph reachable from a root so that every node runs only after
//! all of its consumers have contributed to its gradient, then drives the
//! per-node backward rules.

use super::Tensor;
use crate::error::{Error, Result};
use ndarray::{ArrayD, IxDyn};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

const SECOND_BACKWARD: &str = "trying to backward through the graph a second time; \
     intermediate values were already freed by the previous backward pass";

/// Perform backward pass on a tensor
///
/// Without `upstream` the root must hold exactly one element and is seeded
/// with one. Gradients are added into leaf gradient slots; call
/// `zero_grad` between iterations to start from zero.
pub fn backward(root: &Tensor, upstream: Option<ArrayD<f32>>) -> Result<()> {
    let _span = tracing::debug_span!("backward", grad_fn = ?root.grad_fn()).entered();

    let seed = match upstream {
        Some(grad) => {
            if grad.shape() != root.shape().as_slice() {
                return Err(Error::shape(format!(
                    "upstream gradient of shape {:?} does not match output of shape {:?}",
                    grad.shape(),
                    root.shape()
                )));
            }
            grad
        }
        None => {
            if root.numel() != 1 {
                return Err(Error::shape(
                    "grad can only be implicitly created for scalar outputs",
                ));
            }
            ArrayD::ones(IxDyn(&root.shape()))
        }
    };

    if !root.requires_grad() {
        return Err(Error::graph(
            "element 0 of tensors does not require grad and does not have a grad_fn",
        ));
    }

    if root.is_leaf() {
        return root.accumulate_grad(seed);
    }

    let order = topological_order(root)?;
    tracing::debug!(nodes = order.len(), "running backward");

    let mut pending: HashMap<usize, ArrayD<f32>> = HashMap::new();
    pending.insert(root.id(), seed);

    for tensor in &order {
        let Some(node) = tensor.node() else {
            continue;
        };
        let Some(grad) = pending.remove(&tensor.id()) else {
            continue;
        };
        if tensor.retains_grad() {
            tensor.accumulate_grad(grad.clone())?;
        }

        let _node_span = tracing::trace_span!("node", op = node.name()).entered();
        for (input, input_grad) in node.run_backward(&grad)? {
            if input.is_leaf() {
                input.accumulate_grad(input_grad)?;
                continue;
            }
            match pending.entry(input.id()) {
                Entry::Occupied(mut slot) => *slot.get_mut() += &input_grad,
                Entry::Vacant(slot) => {
                    slot.insert(input_grad);
                }
            }
        }
    }

    Ok(())
}

/// Derived tensors reachable from `root`, consumers before producers.
///
/// Iterative depth-first post-order, reversed. Fails if any reachable node was
/// already released by an earlier backward pass.
fn topological_order(root: &Tensor) -> Result<Vec<Tensor>> {
    let mut order = Vec::new();
    let mut visited = HashSet::new();
    let mut stack = vec![(root.clone(), false)];

    while let Some((tensor, expanded)) = stack.pop() {
        if expanded {
            order.push(tensor);
            continue;
        }
        if !visited.insert(tensor.id()) {
            continue;
        }
        let Some(node) = tensor.node() else {
            continue;
        };
        let inputs = node.inputs().ok_or_else(|| Error::graph(SECOND_BACKWARD))?;
        stack.push((tensor, true));
        for input in inputs {
            if input.requires_grad() && !input.is_leaf() && !visited.contains(&input.id()) {
                stack.push((input, false));
            }
        }
    }

    order.reverse();
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::ops;

    #[test]
    fn test_order_puts_consumers_first() {
        let x = Tensor::from_vec(vec![1.0, 2.0], &[2], true).unwrap();
        let y = ops::exp(&x);
        let z = ops::mul(&y, &y).unwrap();
        let w = ops::add(&z, &y).unwrap();

        let order = topological_order(&w).unwrap();
        let ids: Vec<usize> = order.iter().map(Tensor::id).collect();
        assert_eq!(ids, vec![w.id(), z.id(), y.id()]);
    }

    #[test]
    fn test_released_graph_is_rejected_before_writing() {
        let x = Tensor::from_vec(vec![1.0, 2.0], &[2], true).unwrap();
        let y = ops::sum(&ops::exp(&x), None).unwrap();
        backward(&y, None).unwrap();
        let first = x.grad_vec().unwrap();

        let err = backward(&y, None).unwrap_err();
        assert!(matches!(err, Error::Graph(_)));
        assert_eq!(x.grad_vec().unwrap(), first);
    }

    #[test]
    fn test_leaf_root_accumulates() {
        let x = Tensor::scalar(3.0, true);
        backward(&x, None).unwrap();
        backward(&x, None).unwrap();
        assert_eq!(x.grad_vec().unwrap(), vec![2.0]);
    }

    #[test]
    fn test_root_without_grad_is_rejected() {
        let x = Tensor::scalar(3.0, false);
        assert!(matches!(backward(&x, None), Err(Error::Graph(_))));
    }
}
