//! Optimizer trait

use crate::Tensor;

/// Trait for optimization algorithms
///
/// Parameters are registered when the optimizer is built. Since tensors are
/// shared handles, updates are visible to every clone of a parameter,
/// including the ones held by modules.
pub trait Optimizer {
    /// Registered parameters
    fn params(&self) -> &[Tensor];

    /// Perform a single optimization step
    ///
    /// Parameters without a gradient are left untouched.
    fn step(&mut self);

    /// Zero out all gradients
    fn zero_grad(&mut self) {
        for param in self.params() {
            param.zero_grad();
        }
    }

    /// Get learning rate
    fn lr(&self) -> f32;

    /// Set learning rate
    fn set_lr(&mut self, lr: f32);
}
