//! Neural network layers built on the autograd ops
//!
//! Layers own their parameters as shared tensor handles, so an optimizer
//! built from [`Module::parameters`] updates the same values the layer reads.

mod activation;
mod dropout;
mod linear;
mod sequential;
mod state;

pub use activation::{ReLU, Softmax, Tanh};
pub use dropout::Dropout;
pub use linear::Linear;
pub use sequential::Sequential;
pub use state::{load_parameters, save_parameters, ModuleState, ParameterState, StateFormat};

use crate::error::Result;
use crate::Tensor;
use std::path::Path;

/// A differentiable layer
pub trait Module {
    /// Run the layer, recording graph nodes for tracked inputs
    fn forward(&self, input: &Tensor) -> Result<Tensor>;

    /// Trainable parameters, in a stable order
    fn parameters(&self) -> Vec<Tensor> {
        Vec::new()
    }

    /// Switch between training and evaluation behaviour
    ///
    /// Only layers that behave differently, such as [`Dropout`], override it.
    fn set_training(&mut self, _training: bool) {}

    fn train(&mut self) {
        self.set_training(true);
    }

    fn eval(&mut self) {
        self.set_training(false);
    }

    /// Write the values of [`Module::parameters`] to `path`
    ///
    /// The format follows the extension: `.json`, `.yaml` or `.yml`.
    fn save(&self, path: &Path) -> Result<()> {
        save_parameters(&self.parameters(), path)
    }

    /// Overwrite the parameters in place with values saved by [`Module::save`]
    ///
    /// The saved parameter count and shapes must match this module.
    fn load(&self, path: &Path) -> Result<()> {
        load_parameters(&self.parameters(), path)
    }
}
