//! YAML schema definitions for declarative training configuration

use serde::{Deserialize, Serialize};

/// Complete training specification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainSpec {
    /// Model configuration
    pub model: ModelSpec,

    /// Data configuration
    pub data: DataConfig,

    /// Optimizer configuration
    pub optimizer: OptimSpec,

    /// Training hyperparameters
    #[serde(default)]
    pub training: TrainingParams,
}

/// Multilayer perceptron layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Layer widths, input first: `[2, 8, 1]` is one hidden layer of 8
    pub layers: Vec<usize>,

    /// Activation between linear layers: "relu" | "tanh"
    #[serde(default = "default_activation")]
    pub activation: String,

    /// Whether linear layers carry a bias
    #[serde(default = "default_true")]
    pub bias: bool,

    /// Dropout probability after each hidden activation; 0 disables it
    #[serde(default)]
    pub dropout: f32,
}

/// Inline training data, one row per sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub inputs: Vec<Vec<f32>>,
    pub targets: Vec<Vec<f32>>,
}

impl DataConfig {
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

/// Optimizer specification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimSpec {
    /// Optimizer name: "sgd" | "adam"
    pub name: String,

    /// Learning rate
    pub lr: f32,

    /// SGD momentum
    #[serde(default)]
    pub momentum: f32,

    #[serde(default = "default_beta1")]
    pub beta1: f32,

    #[serde(default = "default_beta2")]
    pub beta2: f32,

    #[serde(default = "default_eps")]
    pub eps: f32,
}

/// Training hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingParams {
    /// Number of epochs
    #[serde(default = "default_epochs")]
    pub epochs: usize,

    /// Loss reduction: "mean" | "sum"
    #[serde(default = "default_reduction")]
    pub reduction: String,

    /// Seed for weight initialization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            reduction: default_reduction(),
            seed: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_activation() -> String {
    "tanh".to_string()
}

fn default_beta1() -> f32 {
    0.9
}

fn default_beta2() -> f32 {
    0.999
}

fn default_eps() -> f32 {
    1e-8
}

fn default_epochs() -> usize {
    100
}

fn default_reduction() -> String {
    "mean".to_string()
}
