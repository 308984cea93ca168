//! Fully connected layer

use super::Module;
use crate::autograd::{add, matmul};
use crate::error::{Error, Result};
use crate::Tensor;
use ndarray::{ArrayD, IxDyn};
use rand::Rng;

/// Affine layer computing `x @ W + b`
///
/// `W` has shape `(in_features, out_features)` and `b` has shape
/// `(out_features,)`. Inputs of shape `(..., in_features)` are supported.
pub struct Linear {
    weight: Tensor,
    bias: Option<Tensor>,
}

impl Linear {
    /// Create a layer with weights drawn uniformly from `±1/√in_features`
    pub fn new(in_features: usize, out_features: usize, bias: bool) -> Self {
        let mut rng = rand::rng();
        Self::with_rng(&mut rng, in_features, out_features, bias)
    }

    /// Same as [`Linear::new`] with a caller-supplied generator
    pub fn with_rng<R: Rng>(
        rng: &mut R,
        in_features: usize,
        out_features: usize,
        bias: bool,
    ) -> Self {
        let bound = 1.0 / (in_features.max(1) as f32).sqrt();
        let weight = ArrayD::from_shape_fn(IxDyn(&[in_features, out_features]), |_| {
            rng.random_range(-bound..bound)
        });
        Self {
            weight: Tensor::new(weight, true),
            bias: bias.then(|| Tensor::zeros(&[out_features], true)),
        }
    }

    /// Build a layer from existing parameters
    pub fn from_weights(weight: Tensor, bias: Option<Tensor>) -> Result<Self> {
        let shape = weight.shape();
        if shape.len() != 2 {
            return Err(Error::shape(format!(
                "linear weight must be 2-D, got {shape:?}"
            )));
        }
        if let Some(b) = &bias {
            if b.shape() != [shape[1]] {
                return Err(Error::shape(format!(
                    "linear bias of shape {:?} does not match {} outputs",
                    b.shape(),
                    shape[1]
                )));
            }
        }
        Ok(Self { weight, bias })
    }

    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    pub fn bias(&self) -> Option<&Tensor> {
        self.bias.as_ref()
    }

    pub fn in_features(&self) -> usize {
        self.weight.shape()[0]
    }

    pub fn out_features(&self) -> usize {
        self.weight.shape()[1]
    }
}

impl Module for Linear {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let out = matmul(input, &self.weight)?;
        match &self.bias {
            Some(b) => add(&out, b),
            None => Ok(out),
        }
    }

    fn parameters(&self) -> Vec<Tensor> {
        let mut params = vec![self.weight.clone()];
        params.extend(self.bias.clone());
        params
    }
}

impl std::fmt::Debug for Linear {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Linear")
            .field("in_features", &self.in_features())
            .field("out_features", &self.out_features())
            .field("bias", &self.bias.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::sum;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_init_within_bounds() {
        let layer = Linear::new(4, 3, true);
        assert_eq!(layer.weight().shape(), vec![4, 3]);
        assert!(layer.weight().data().iter().all(|w| w.abs() <= 0.5));
        assert_eq!(layer.bias().unwrap().to_vec(), vec![0.0; 3]);
        assert_eq!(layer.parameters().len(), 2);
    }

    #[test]
    fn test_seeded_init_is_deterministic() {
        let a = Linear::with_rng(&mut StdRng::seed_from_u64(7), 3, 2, false);
        let b = Linear::with_rng(&mut StdRng::seed_from_u64(7), 3, 2, false);
        assert_eq!(a.weight().to_vec(), b.weight().to_vec());
        assert_eq!(a.parameters().len(), 1);
    }

    #[test]
    fn test_forward_and_backward() {
        let w = Tensor::from_vec(vec![0.1, 0.2, 0.3, 0.4], &[2, 2], true).unwrap();
        let b = Tensor::from_vec(vec![0.1, 0.2], &[2], true).unwrap();
        let layer = Linear::from_weights(w.clone(), Some(b.clone())).unwrap();

        let x = Tensor::from_vec(vec![1.0, 2.0], &[1, 2], false).unwrap();
        let y = layer.forward(&x).unwrap();
        let values = y.to_vec();
        approx::assert_abs_diff_eq!(values[0], 0.8, epsilon = 1e-6);
        approx::assert_abs_diff_eq!(values[1], 1.2, epsilon = 1e-6);

        sum(&y, None).unwrap().backward().unwrap();
        assert_eq!(w.grad_vec().unwrap(), vec![1.0, 1.0, 2.0, 2.0]);
        assert_eq!(b.grad_vec().unwrap(), vec![1.0, 1.0]);
    }

    #[test]
    fn test_from_weights_rejects_bad_bias() {
        let w = Tensor::zeros(&[2, 3], true);
        let b = Tensor::zeros(&[2], true);
        assert!(Linear::from_weights(w, Some(b)).is_err());
        assert!(Linear::from_weights(Tensor::zeros(&[6], true), None).is_err());
    }
}
