//! Tape-based autograd engine
//!
//! Provides reverse-mode automatic differentiation using a computational graph
//! recorded during the forward pass.

mod backward;
mod engine;
pub mod ops;
pub mod shape;
pub mod storage;
mod tensor;


pub use backward::{BackwardOp, Reduction};
pub use engine::backward;
pub use ops::*;
pub use shape::{broadcast_shape, reduce_shape, BroadcastPlan};
pub use storage::Storage;
pub use tensor::Tensor;
