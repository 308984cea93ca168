//! Configuration validation

use super::schema::TrainSpec;
use crate::autograd::Reduction;

/// Validation error type
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("Model needs at least an input and an output width, got {0} layer(s)")]
    TooFewLayers(usize),

    #[error("Invalid layer width at position {0} (must be > 0)")]
    InvalidLayerWidth(usize),

    #[error("Invalid activation: {0} (must be one of: relu, tanh)")]
    InvalidActivation(String),

    #[error("Invalid learning rate: {0} (must be > 0.0)")]
    InvalidLearningRate(f32),

    #[error("Invalid dropout: {0} (must be in [0.0, 1.0))")]
    InvalidDropout(f32),

    #[error("Invalid momentum: {0} (must be in [0.0, 1.0))")]
    InvalidMomentum(f32),

    #[error("Invalid optimizer: {0} (must be one of: adam, sgd)")]
    InvalidOptimizer(String),

    #[error("Invalid epochs: {0} (must be > 0)")]
    InvalidEpochs(usize),

    #[error("Invalid reduction: {0} (must be one of: mean, sum)")]
    InvalidReduction(String),

    #[error("Training data is empty")]
    EmptyData,

    #[error("Sample count mismatch: {inputs} input rows, {targets} target rows")]
    SampleCountMismatch { inputs: usize, targets: usize },

    #[error("{field} row {row} has {found} values, expected {expected}")]
    RowWidth {
        field: &'static str,
        row: usize,
        expected: usize,
        found: usize,
    },
}

/// Validate a training specification
///
/// Checks:
/// - Numeric values are in valid ranges
/// - Enums match allowed values
/// - Data rows match the model's input and output widths
pub fn validate_config(spec: &TrainSpec) -> Result<(), ValidationError> {
    let layers = &spec.model.layers;
    if layers.len() < 2 {
        return Err(ValidationError::TooFewLayers(layers.len()));
    }
    if let Some(pos) = layers.iter().position(|&w| w == 0) {
        return Err(ValidationError::InvalidLayerWidth(pos));
    }

    if !["relu", "tanh"].contains(&spec.model.activation.as_str()) {
        return Err(ValidationError::InvalidActivation(
            spec.model.activation.clone(),
        ));
    }

    if !(0.0..1.0).contains(&spec.model.dropout) {
        return Err(ValidationError::InvalidDropout(spec.model.dropout));
    }

    // Validate learning rate
    if spec.optimizer.lr <= 0.0 || !spec.optimizer.lr.is_finite() {
        return Err(ValidationError::InvalidLearningRate(spec.optimizer.lr));
    }

    // Validate optimizer name
    let valid_optimizers = ["adam", "sgd"];
    if !valid_optimizers.contains(&spec.optimizer.name.as_str()) {
        return Err(ValidationError::InvalidOptimizer(
            spec.optimizer.name.clone(),
        ));
    }

    if !(0.0..1.0).contains(&spec.optimizer.momentum) {
        return Err(ValidationError::InvalidMomentum(spec.optimizer.momentum));
    }

    // Validate epochs
    if spec.training.epochs == 0 {
        return Err(ValidationError::InvalidEpochs(spec.training.epochs));
    }

    if spec.training.reduction.parse::<Reduction>().is_err() {
        return Err(ValidationError::InvalidReduction(
            spec.training.reduction.clone(),
        ));
    }

    validate_data(spec)
}

fn validate_data(spec: &TrainSpec) -> Result<(), ValidationError> {
    let data = &spec.data;
    if data.is_empty() {
        return Err(ValidationError::EmptyData);
    }
    if data.inputs.len() != data.targets.len() {
        return Err(ValidationError::SampleCountMismatch {
            inputs: data.inputs.len(),
            targets: data.targets.len(),
        });
    }

    let layers = &spec.model.layers;
    let in_width = layers[0];
    let out_width = layers[layers.len() - 1];
    for (field, rows, expected) in [
        ("inputs", &data.inputs, in_width),
        ("targets", &data.targets, out_width),
    ] {
        if let Some((row, values)) = rows.iter().enumerate().find(|(_, r)| r.len() != expected) {
            return Err(ValidationError::RowWidth {
                field,
                row,
                expected,
                found: values.len(),
            });
        }
    }
    Ok(())
}
