//! Stochastic Gradient Descent optimizer

use super::Optimizer;
use crate::Tensor;
use ndarray::ArrayD;

/// SGD optimizer with optional momentum
pub struct SGD {
    params: Vec<Tensor>,
    lr: f32,
    momentum: f32,
    velocities: Vec<Option<ArrayD<f32>>>,
}

impl SGD {
    /// Create a plain SGD optimizer over `params`
    pub fn new(params: Vec<Tensor>, lr: f32) -> Self {
        Self::with_momentum(params, lr, 0.0)
    }

    /// Create an SGD optimizer with momentum
    pub fn with_momentum(params: Vec<Tensor>, lr: f32, momentum: f32) -> Self {
        let velocities = params.iter().map(|_| None).collect();
        Self {
            params,
            lr,
            momentum,
            velocities,
        }
    }

    pub fn momentum(&self) -> f32 {
        self.momentum
    }
}

impl Optimizer for SGD {
    fn params(&self) -> &[Tensor] {
        &self.params
    }

    fn step(&mut self) {
        for (param, velocity) in self.params.iter().zip(self.velocities.iter_mut()) {
            let Some(grad) = param.grad() else {
                continue;
            };
            if self.momentum > 0.0 {
                // v = momentum * v - lr * grad
                let v = match velocity.take() {
                    Some(v) => v * self.momentum - &grad * self.lr,
                    None => &grad * (-self.lr),
                };
                *param.data_mut() += &v;
                *velocity = Some(v);
            } else {
                // p -= lr * grad
                param.data_mut().scaled_add(-self.lr, &grad);
            }
        }
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }
}
