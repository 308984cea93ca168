//! Adam optimizer

use super::Optimizer;
use crate::Tensor;
use ndarray::ArrayD;

/// Adam optimizer (Adaptive Moment Estimation)
pub struct Adam {
    params: Vec<Tensor>,
    lr: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    t: u64,
    m: Vec<Option<ArrayD<f32>>>, // First moment
    v: Vec<Option<ArrayD<f32>>>, // Second moment
}

impl Adam {
    /// Create a new Adam optimizer
    pub fn new(params: Vec<Tensor>, lr: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        let m = params.iter().map(|_| None).collect();
        let v = params.iter().map(|_| None).collect();
        Self {
            params,
            lr,
            beta1,
            beta2,
            epsilon,
            t: 0,
            m,
            v,
        }
    }

    /// Create Adam with default parameters
    pub fn default_params(params: Vec<Tensor>, lr: f32) -> Self {
        Self::new(params, lr, 0.9, 0.999, 1e-8)
    }
}

impl Optimizer for Adam {
    fn params(&self) -> &[Tensor] {
        &self.params
    }

    fn step(&mut self) {
        self.t += 1;

        // Bias correction factors
        let lr_t = self.lr
            * ((1.0 - self.beta2.powi(self.t as i32)).sqrt()
                / (1.0 - self.beta1.powi(self.t as i32)));

        for (i, param) in self.params.iter().enumerate() {
            let Some(grad) = param.grad() else {
                continue;
            };

            // m_t = β1 * m_{t-1} + (1 - β1) * g
            let m_t = match self.m[i].take() {
                Some(m) => m * self.beta1 + &grad * (1.0 - self.beta1),
                None => &grad * (1.0 - self.beta1),
            };

            // v_t = β2 * v_{t-1} + (1 - β2) * g²
            let grad_sq = &grad * &grad;
            let v_t = match self.v[i].take() {
                Some(v) => v * self.beta2 + &grad_sq * (1.0 - self.beta2),
                None => &grad_sq * (1.0 - self.beta2),
            };

            // θ_t = θ_{t-1} - lr_t * m_t / (√v_t + ε)
            let update = &m_t / &(v_t.mapv(f32::sqrt) + self.epsilon) * lr_t;
            *param.data_mut() -= &update;

            self.m[i] = Some(m_t);
            self.v[i] = Some(v_t);
        }
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }
}
