//! Declarative YAML configuration
//!
//! Describes a small multilayer perceptron, inline training data and the
//! optimizer, then trains it with full-batch gradient descent.
//!
//! # Example
//!
//! ```yaml
//! model:
//!   layers: [2, 8, 1]
//!   activation: tanh
//!   dropout: 0.1
//!
//! data:
//!   inputs: [[0, 0], [0, 1], [1, 0], [1, 1]]
//!   targets: [[0], [1], [1], [0]]
//!
//! optimizer:
//!   name: adam
//!   lr: 0.05
//!
//! training:
//!   epochs: 500
//!   reduction: mean
//!   seed: 42
//! ```

mod builder;
mod cli;
mod schema;
mod train;
mod validate;


pub use builder::{build_dataset, build_model, build_optimizer, parameter_count};
pub use cli::{
    apply_overrides, parse_args, Cli, Command, InfoArgs, OutputFormat, TrainArgs, ValidateArgs,
};
pub use schema::{DataConfig, ModelSpec, OptimSpec, TrainSpec, TrainingParams};
pub use train::{
    load_config, parse_config, train, train_from_yaml, train_model, train_with_callback,
    TrainReport,
};
pub use validate::{validate_config, ValidationError};
