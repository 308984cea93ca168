//! Single-command training from YAML configuration

use super::builder::{build_dataset, build_model, build_optimizer, parameter_count};
use super::schema::TrainSpec;
use super::validate::validate_config;
use crate::autograd::{mse_loss, Reduction};
use crate::error::{Error, Result};
use crate::nn::{Module, Sequential};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Outcome of a training run
#[derive(Debug, Clone, Serialize)]
pub struct TrainReport {
    /// Loss before each epoch's update
    pub losses: Vec<f32>,
    /// Number of trainable scalars
    pub parameters: usize,
}

impl TrainReport {
    pub fn epochs(&self) -> usize {
        self.losses.len()
    }

    pub fn initial_loss(&self) -> Option<f32> {
        self.losses.first().copied()
    }

    pub fn final_loss(&self) -> Option<f32> {
        self.losses.last().copied()
    }
}

/// Train a model from YAML configuration file
///
/// Loads and validates the config, then runs [`train`] on it.
///
/// # Example
///
/// ```no_run
/// use gradtape::config::train_from_yaml;
///
/// let report = train_from_yaml("config.yaml")?;
/// println!("final loss: {:?}", report.final_loss());
/// # Ok::<(), gradtape::Error>(())
/// ```
pub fn train_from_yaml<P: AsRef<Path>>(config_path: P) -> Result<TrainReport> {
    let spec = load_config(config_path)?;
    train(&spec)
}

/// Run full-batch training described by `spec`
///
/// Each epoch runs forward, MSE loss, backward, an optimizer step and
/// `zero_grad`. The reported loss for an epoch is measured before its step.
pub fn train(spec: &TrainSpec) -> Result<TrainReport> {
    train_with_callback(spec, |_, _| {})
}

/// Same as [`train`], calling `on_epoch(epoch, loss)` after every epoch
pub fn train_with_callback<F>(spec: &TrainSpec, on_epoch: F) -> Result<TrainReport>
where
    F: FnMut(usize, f32),
{
    train_model(spec, on_epoch).map(|(_, report)| report)
}

/// Same as [`train_with_callback`], also returning the trained model
///
/// The model is switched to evaluation mode before it is returned.
pub fn train_model<F>(spec: &TrainSpec, mut on_epoch: F) -> Result<(Sequential, TrainReport)>
where
    F: FnMut(usize, f32),
{
    validate_config(spec).map_err(|e| Error::Config(format!("Invalid config: {e}")))?;

    let mut rng = match spec.training.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let mut model = build_model(&spec.model, &mut rng)?;
    model.train();
    let (inputs, targets) = build_dataset(&spec.data)?;
    let reduction: Reduction = spec.training.reduction.parse()?;
    let mut optimizer = build_optimizer(&spec.optimizer, model.parameters())?;

    let _span = tracing::info_span!(
        "train",
        optimizer = %spec.optimizer.name,
        epochs = spec.training.epochs
    )
    .entered();

    let mut losses = Vec::with_capacity(spec.training.epochs);
    for epoch in 0..spec.training.epochs {
        let prediction = model.forward(&inputs)?;
        let loss = mse_loss(&prediction, &targets, reduction)?;
        let value = loss.item()?;
        if !value.is_finite() {
            return Err(Error::Value(format!(
                "loss diverged to {value} at epoch {epoch}"
            )));
        }
        losses.push(value);
        tracing::debug!(epoch, loss = value, "epoch complete");

        loss.backward()?;
        optimizer.step();
        optimizer.zero_grad();
        on_epoch(epoch, value);
    }

    model.eval();
    let report = TrainReport {
        losses,
        parameters: parameter_count(&model),
    };
    Ok((model, report))
}

/// Load and validate a training spec from a YAML file
pub fn load_config<P: AsRef<Path>>(config_path: P) -> Result<TrainSpec> {
    let spec = parse_config(config_path)?;
    validate_config(&spec).map_err(|e| Error::Config(format!("Invalid config: {e}")))?;
    Ok(spec)
}

/// Read a training spec from a YAML file without validating it
///
/// Useful when the caller validates separately, for instance after applying
/// command-line overrides.
pub fn parse_config<P: AsRef<Path>>(config_path: P) -> Result<TrainSpec> {
    let yaml_content = fs::read_to_string(config_path.as_ref()).map_err(|e| {
        Error::Config(format!(
            "Failed to read config file {}: {}",
            config_path.as_ref().display(),
            e
        ))
    })?;

    serde_yaml::from_str(&yaml_content)
        .map_err(|e| Error::Config(format!("Failed to parse YAML config: {e}")))
}
