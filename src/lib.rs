//! # gradtape: reverse-mode automatic differentiation
//!
//! gradtape records operations on dense `f32` tensors into a dynamic graph and
//! computes gradients of a scalar result with respect to every leaf tensor
//! that asked for them.
//!
//! ## Architecture
//!
//! - **autograd**: Tensors, broadcasting, differentiable ops and the backward engine
//! - **nn**: Linear layers, activations, dropout, `Sequential` and parameter files
//! - **optim**: Optimizers (SGD, Adam)
//! - **config**: Declarative YAML training configuration and CLI arguments
//!
//! ## Example
//!
//! ```
//! use gradtape::autograd::{mul, sum};
//! use gradtape::Tensor;
//!
//! let x = Tensor::from_vec(vec![1.0, 2.0, 3.0], &[3], true)?;
//! let y = sum(&mul(&x, &x)?, None)?;
//! y.backward()?;
//! assert_eq!(x.grad_vec(), Some(vec![2.0, 4.0, 6.0]));
//! # Ok::<(), gradtape::Error>(())
//! ```

pub mod autograd;
pub mod config;
pub mod nn;
pub mod optim;

pub mod error;

// Re-export commonly used types
pub use autograd::{backward, Reduction, Tensor};
pub use error::{Error, Result};
