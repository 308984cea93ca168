//! Dropout regularization

use super::Module;
use crate::autograd::mul;
use crate::error::{Error, Result};
use crate::Tensor;
use ndarray::{ArrayD, IxDyn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;

/// Zeroes each element with probability `p` while training
///
/// In training mode the input is multiplied by a fresh 0/1 mask on every
/// call. In evaluation mode it is scaled by `1 - p` instead, so the expected
/// activation matches what later layers saw during training. Layers start in
/// training mode.
pub struct Dropout {
    p: f32,
    training: bool,
    rng: RefCell<StdRng>,
}

impl Dropout {
    pub fn new(p: f32) -> Result<Self> {
        Self::with_rng(p, StdRng::from_os_rng())
    }

    /// Dropout with a reproducible mask sequence
    pub fn with_seed(p: f32, seed: u64) -> Result<Self> {
        Self::with_rng(p, StdRng::seed_from_u64(seed))
    }

    fn with_rng(p: f32, rng: StdRng) -> Result<Self> {
        if !(0.0..=1.0).contains(&p) {
            return Err(Error::value(format!(
                "dropout probability must be in [0, 1], got {p}"
            )));
        }
        Ok(Self {
            p,
            training: true,
            rng: RefCell::new(rng),
        })
    }

    /// Probability of zeroing an element
    pub fn p(&self) -> f32 {
        self.p
    }

    pub fn is_training(&self) -> bool {
        self.training
    }
}

impl Module for Dropout {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        if !self.training {
            return mul(input, &Tensor::scalar(1.0 - self.p, false));
        }
        let mask = {
            let mut rng = self.rng.borrow_mut();
            ArrayD::from_shape_fn(IxDyn(&input.shape()), |_| {
                if rng.random::<f32>() >= self.p {
                    1.0
                } else {
                    0.0
                }
            })
        };
        mul(input, &Tensor::new(mask, false))
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }
}

impl std::fmt::Debug for Dropout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dropout")
            .field("p", &self.p)
            .field("training", &self.training)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::sum;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_probability_is_checked() {
        assert!(matches!(Dropout::new(-0.1), Err(Error::Value(_))));
        assert!(matches!(Dropout::new(1.5), Err(Error::Value(_))));
        assert!(Dropout::new(0.0).is_ok());
        assert!(Dropout::new(1.0).is_ok());
    }

    #[test]
    fn test_training_mask_zeroes_or_keeps() {
        let layer = Dropout::with_seed(0.5, 7).unwrap();
        assert!(layer.is_training());
        let x = Tensor::ones(&[1000], true);
        let y = layer.forward(&x).unwrap().to_vec();

        assert!(y.iter().all(|&v| v == 0.0 || v == 1.0));
        let kept = y.iter().filter(|&&v| v == 1.0).count();
        assert!((350..650).contains(&kept), "kept {kept} of 1000");
    }

    #[test]
    fn test_training_gradient_follows_mask() {
        let layer = Dropout::with_seed(0.3, 11).unwrap();
        let x = Tensor::ones(&[64], true);
        let y = layer.forward(&x).unwrap();
        let kept = y.to_vec();
        sum(&y, None).unwrap().backward().unwrap();
        assert_eq!(x.grad_vec().unwrap(), kept);
    }

    #[test]
    fn test_eval_scales_by_keep_probability() {
        let mut layer = Dropout::with_seed(0.25, 0).unwrap();
        layer.eval();
        assert!(!layer.is_training());

        let x = Tensor::from_vec(vec![4.0, -8.0], &[2], true).unwrap();
        let y = layer.forward(&x).unwrap();
        assert_eq!(y.to_vec(), vec![3.0, -6.0]);

        sum(&y, None).unwrap().backward().unwrap();
        assert_eq!(x.grad_vec().unwrap(), vec![0.75, 0.75]);

        layer.train();
        assert!(layer.is_training());
    }

    #[test]
    fn test_extreme_probabilities() {
        let x = Tensor::from_vec(vec![1.0, 2.0, 3.0], &[3], false).unwrap();
        let keep_all = Dropout::with_seed(0.0, 1).unwrap();
        assert_eq!(keep_all.forward(&x).unwrap().to_vec(), vec![1.0, 2.0, 3.0]);

        let drop_all = Dropout::with_seed(1.0, 1).unwrap();
        assert_eq!(drop_all.forward(&x).unwrap().to_vec(), vec![0.0; 3]);

        let mut scaled = Dropout::with_seed(1.0, 1).unwrap();
        scaled.eval();
        assert_abs_diff_eq!(scaled.forward(&x).unwrap().to_vec()[2], 0.0);
    }

    #[test]
    fn test_has_no_parameters() {
        assert!(Dropout::new(0.5).unwrap().parameters().is_empty());
    }
}
