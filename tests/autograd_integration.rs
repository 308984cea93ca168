//! Integration tests for autograd core functionality.
//!
//! Tests the tape-based automatic differentiation engine through the public
//! API: tensor construction, graph recording, backward and optimizer steps.

use gradtape::autograd::{
    add, binary_cross_entropy, broadcast_shape, cross_entropy, div, exp, matmul, mean, mse_loss,
    mul, neg, relu, softmax, sub, sum, tanh, view, Storage,
};
use gradtape::nn::{Dropout, Linear, Module, Sequential, Tanh};
use gradtape::optim::{Optimizer, SGD};
use gradtape::{backward, Error, Reduction, Tensor};
use ndarray::{ArrayD, IxDyn};

fn leaf(data: &[f32], shape: &[usize]) -> Tensor {
    Tensor::from_vec(data.to_vec(), shape, true).unwrap()
}

#[test]
fn test_tensor_creation_from_vec() {
    let t = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3], true).unwrap();
    assert_eq!(t.shape(), vec![2, 3]);
    assert_eq!(t.numel(), 6);
    assert!((t.get(&[1, 2]).unwrap() - 6.0).abs() < 1e-6);
    assert_eq!(t.storage().strides(), vec![3, 1]);
}

#[test]
fn test_tensor_creation_rejects_wrong_length() {
    let result = Tensor::from_vec(vec![1.0, 2.0, 3.0], &[2, 2], true);
    assert!(matches!(result, Err(Error::Shape(_))));
}

#[test]
fn test_tensor_zeros_and_ones() {
    let z = Tensor::zeros(&[5], true);
    assert!(z.to_vec().iter().all(|v| v.abs() < 1e-6));

    let o = Tensor::ones(&[2, 2], false);
    assert!(o.to_vec().iter().all(|v| (v - 1.0).abs() < 1e-6));
    assert!(!o.requires_grad());
}

#[test]
fn test_tensor_set_and_out_of_bounds() {
    let t = Tensor::zeros(&[2, 2], false);
    t.set(&[0, 1], 3.0).unwrap();
    assert_eq!(t.to_vec(), vec![0.0, 3.0, 0.0, 0.0]);
    assert!(matches!(t.get(&[2, 0]), Err(Error::Value(_))));
    assert!(matches!(t.get(&[0]), Err(Error::Shape(_))));
}

#[test]
fn test_storage_view_shares_values() {
    let s = Storage::from_vec(&[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
    let v = s.view(&[3, 2]).unwrap();
    assert_eq!(v.shape(), &[3, 2]);
    assert!((v[IxDyn(&[2, 1])] - 6.0).abs() < 1e-6);
    assert!(s.view(&[4]).is_err());
}

#[test]
fn test_broadcast_shape_rules() {
    let plan = broadcast_shape(&[2, 1, 3], &[4, 1]).unwrap();
    assert_eq!(plan.shape, vec![2, 4, 3]);
    assert!(matches!(
        broadcast_shape(&[3], &[4]),
        Err(Error::Broadcast { .. })
    ));
}

#[test]
fn test_requires_grad_toggle_only_on_leaves() {
    let x = leaf(&[1.0], &[1]);
    x.set_requires_grad(false).unwrap();
    assert!(!x.requires_grad());
    x.set_requires_grad(true).unwrap();

    let y = exp(&x);
    assert!(matches!(y.set_requires_grad(false), Err(Error::Graph(_))));
}

#[test]
fn test_retain_grad_requires_tracking() {
    let x = Tensor::from_vec(vec![1.0], &[1], false).unwrap();
    assert!(matches!(x.retain_grad(), Err(Error::Graph(_))));
}

#[test]
fn test_chain_rule_through_ops() {
    // y = sum(exp(a) * b - a / b)
    let a = leaf(&[0.0, 1.0], &[2]);
    let b = leaf(&[2.0, 4.0], &[2]);
    let prod = mul(&exp(&a), &b).unwrap();
    let ratio = div(&a, &b).unwrap();
    let y = sum(&sub(&prod, &ratio).unwrap(), None).unwrap();
    backward(&y, None).unwrap();

    let e = 1.0f32.exp();
    let ga = a.grad_vec().unwrap();
    assert!((ga[0] - (2.0 - 0.5)).abs() < 1e-5);
    assert!((ga[1] - (4.0 * e - 0.25)).abs() < 1e-4);

    let gb = b.grad_vec().unwrap();
    assert!((gb[0] - 1.0).abs() < 1e-5);
    assert!((gb[1] - (e + 1.0 / 16.0)).abs() < 1e-4);
}

#[test]
fn test_matmul_relu_mean() {
    let x = leaf(&[1.0, -1.0, 2.0, 0.5], &[2, 2]);
    let w = leaf(&[1.0, -1.0, 1.0, 1.0], &[2, 2]);
    let h = relu(&matmul(&x, &w).unwrap());
    // x @ w = [[0, -2], [2.5, -1.5]]
    assert_eq!(h.to_vec(), vec![0.0, 0.0, 2.5, 0.0]);

    let loss = mean(&h).unwrap();
    loss.backward().unwrap();
    // only the (1, 0) output is active
    assert_eq!(w.grad_vec().unwrap(), vec![0.5, 0.0, 0.125, 0.0]);
    assert_eq!(x.grad_vec().unwrap(), vec![0.0, 0.0, 0.25, 0.25]);
}

#[test]
fn test_softmax_cross_entropy_pipeline() {
    let logits = leaf(&[2.0, 1.0, 0.1], &[1, 3]);
    let target = Tensor::from_vec(vec![1.0, 0.0, 0.0], &[1, 3], false).unwrap();

    let probs = softmax(&logits, 1).unwrap();
    let total: f32 = probs.to_vec().iter().sum();
    assert!((total - 1.0).abs() < 1e-6);

    let loss = cross_entropy(&logits, &target).unwrap();
    let expected = -probs.to_vec()[0].ln();
    assert!((loss.item().unwrap() - expected).abs() < 1e-5);

    loss.backward().unwrap();
    let g = logits.grad_vec().unwrap();
    let p = probs.to_vec();
    assert!((g[0] - (p[0] - 1.0)).abs() < 1e-5);
    assert!((g[1] - p[1]).abs() < 1e-5);
    assert!((g[2] - p[2]).abs() < 1e-5);
}

#[test]
fn test_view_then_broadcast_add() {
    let x = leaf(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[6]);
    let b = leaf(&[10.0, 20.0, 30.0], &[3]);
    let y = add(&view(&x, &[2, 3]).unwrap(), &b).unwrap();
    assert_eq!(y.to_vec(), vec![11.0, 22.0, 33.0, 14.0, 25.0, 36.0]);

    sum(&y, None).unwrap().backward().unwrap();
    assert_eq!(x.grad_vec().unwrap(), vec![1.0; 6]);
    assert_eq!(b.grad_vec().unwrap(), vec![2.0, 2.0, 2.0]);
}

#[test]
fn test_explicit_upstream_gradient() {
    let x = leaf(&[1.0, 2.0], &[2]);
    let y = tanh(&x);
    let upstream = ArrayD::from_shape_vec(IxDyn(&[2]), vec![2.0, -1.0]).unwrap();
    backward(&y, Some(upstream)).unwrap();

    let g = x.grad_vec().unwrap();
    let t1 = 1.0f32.tanh();
    let t2 = 2.0f32.tanh();
    assert!((g[0] - 2.0 * (1.0 - t1 * t1)).abs() < 1e-6);
    assert!((g[1] + (1.0 - t2 * t2)).abs() < 1e-6);
}

#[test]
fn test_second_backward_fails_with_graph_error() {
    let x = leaf(&[1.0, 2.0], &[2]);
    let y = sum(&mul(&x, &x).unwrap(), None).unwrap();
    y.backward().unwrap();
    assert!(matches!(y.backward(), Err(Error::Graph(_))));
    assert_eq!(x.grad_vec().unwrap(), vec![2.0, 4.0]);
}

#[test]
fn test_training_loop_with_modules() {
    let w = leaf(&[0.1, 0.2, 0.3, 0.4], &[2, 2]);
    let b = leaf(&[0.1, 0.2], &[2]);
    let model = Sequential::new()
        .add(Linear::from_weights(w.clone(), Some(b.clone())).unwrap())
        .add(Tanh);

    let x = Tensor::from_vec(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6], &[3, 2], false).unwrap();
    let y = Tensor::from_vec(vec![-0.1, 0.2, -0.3, 0.4, -0.5, 0.6], &[3, 2], false).unwrap();

    let loss = mse_loss(&model.forward(&x).unwrap(), &y, Reduction::Sum).unwrap();
    assert!((loss.item().unwrap() - 1.058_740).abs() < 1e-5);
    loss.backward().unwrap();

    let gb = b.grad_vec().unwrap();
    assert!((gb[0] - 3.016_962).abs() < 1e-5);
    assert!((gb[1] + 5.3069e-5).abs() < 1e-6);

    let before = w.to_vec();
    let mut optimizer = SGD::new(model.parameters(), 0.1);
    optimizer.step();
    optimizer.zero_grad();

    let after = w.to_vec();
    assert!((after[0] - (before[0] - 0.1 * 1.0950)).abs() < 1e-3);
    assert_eq!(w.grad_vec().unwrap(), vec![0.0; 4]);
    assert_eq!(b.grad_vec().unwrap(), vec![0.0; 2]);
}

#[test]
fn test_discarded_long_graph_is_freed() {
    let x = leaf(&[0.5], &[1]);
    let mut acc = x.clone();
    for _ in 0..100_000 {
        acc = add(&acc, &x).unwrap();
    }
    drop(acc);

    // the leaf is still usable after the graph is gone
    let y = sum(&mul(&x, &x).unwrap(), None).unwrap();
    y.backward().unwrap();
    assert_eq!(x.grad_vec().unwrap(), vec![1.0]);
}

#[test]
fn test_sigmoid_like_classifier_with_binary_cross_entropy() {
    let logits = leaf(&[2.0, -1.0, 0.5], &[3]);
    let one = Tensor::ones(&[3], false);
    let probs = div(&one, &add(&one, &exp(&neg(&logits))).unwrap()).unwrap();
    let target = Tensor::from_vec(vec![1.0, 0.0, 1.0], &[3], false).unwrap();

    let loss = binary_cross_entropy(&probs, &target).unwrap();
    loss.backward().unwrap();

    // d/dz of BCE through a sigmoid is (sigmoid(z) - t) / n
    let expected: Vec<f32> = [2.0f32, -1.0, 0.5]
        .iter()
        .zip([1.0f32, 0.0, 1.0])
        .map(|(&z, t)| (1.0 / (1.0 + (-z).exp()) - t) / 3.0)
        .collect();
    for (g, e) in logits.grad_vec().unwrap().iter().zip(&expected) {
        assert!((g - e).abs() < 1e-5, "{g} vs {e}");
    }
}

#[test]
fn test_dropout_model_saves_and_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("weights.yaml");

    let mut model = Sequential::new()
        .add(Linear::new(3, 4, true))
        .add(Tanh)
        .add(Dropout::with_seed(0.5, 1).unwrap())
        .add(Linear::new(4, 2, true));
    model.eval();
    model.save(&path).unwrap();

    let mut copy = Sequential::new()
        .add(Linear::new(3, 4, true))
        .add(Tanh)
        .add(Dropout::new(0.5).unwrap())
        .add(Linear::new(4, 2, true));
    copy.eval();
    copy.load(&path).unwrap();

    let x = Tensor::from_vec(vec![0.1, -0.2, 0.3], &[1, 3], false).unwrap();
    let a = model.forward(&x).unwrap().to_vec();
    let b = copy.forward(&x).unwrap().to_vec();
    for (p, q) in a.iter().zip(&b) {
        assert!((p - q).abs() < 1e-5);
    }
}
