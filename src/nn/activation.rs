//! Parameter-free activation layers

use super::Module;
use crate::autograd::{relu, softmax, tanh};
use crate::error::Result;
use crate::Tensor;

/// Rectified linear unit
#[derive(Debug, Clone, Copy, Default)]
pub struct ReLU;

impl Module for ReLU {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        Ok(relu(input))
    }
}

/// Hyperbolic tangent
#[derive(Debug, Clone, Copy, Default)]
pub struct Tanh;

impl Module for Tanh {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        Ok(tanh(input))
    }
}

/// Softmax along `dim`
#[derive(Debug, Clone, Copy)]
pub struct Softmax {
    pub dim: usize,
}

impl Module for Softmax {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        softmax(input, self.dim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_activations_have_no_parameters() {
        assert!(ReLU.parameters().is_empty());
        assert!(Tanh.parameters().is_empty());
        assert!(Softmax { dim: 0 }.parameters().is_empty());
    }

    #[test]
    fn test_relu_and_tanh_forward() {
        let x = Tensor::from_vec(vec![-1.0, 0.5], &[2], true).unwrap();
        assert_eq!(ReLU.forward(&x).unwrap().to_vec(), vec![0.0, 0.5]);

        let y = Tanh.forward(&x).unwrap().to_vec();
        assert_abs_diff_eq!(y[0], (-1.0f32).tanh());
        assert_abs_diff_eq!(y[1], 0.5f32.tanh());
    }

    #[test]
    fn test_softmax_dim_is_checked() {
        let x = Tensor::from_vec(vec![1.0, 2.0], &[2], false).unwrap();
        assert!(Softmax { dim: 1 }.forward(&x).is_err());

        let p = Softmax { dim: 0 }.forward(&x).unwrap().to_vec();
        assert_abs_diff_eq!(p[0] + p[1], 1.0, epsilon = 1e-6);
    }
}
