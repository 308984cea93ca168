//! Saving and restoring module parameters

use crate::error::{Error, Result};
use crate::Tensor;
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// On-disk encodings for parameter snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateFormat {
    Json,
    Yaml,
}

impl StateFormat {
    pub fn extension(&self) -> &str {
        match self {
            StateFormat::Json => "json",
            StateFormat::Yaml => "yaml",
        }
    }

    /// Detect format from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "json" => Some(StateFormat::Json),
            "yaml" | "yml" => Some(StateFormat::Yaml),
            _ => None,
        }
    }

    fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Error::Serialization("File has no extension".to_string()))?;
        Self::from_extension(ext)
            .ok_or_else(|| Error::Serialization(format!("Unsupported file extension: {ext}")))
    }
}

/// Shape and row-major values of one parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterState {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

/// Values of every parameter of a module, in [`Module::parameters`] order
///
/// [`Module::parameters`]: super::Module::parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleState {
    pub parameters: Vec<ParameterState>,
}

impl ModuleState {
    /// Snapshot the current values of `params`
    pub fn capture(params: &[Tensor]) -> Self {
        Self {
            parameters: params
                .iter()
                .map(|p| ParameterState {
                    shape: p.shape(),
                    data: p.to_vec(),
                })
                .collect(),
        }
    }

    /// Copy the snapshot into `params`
    ///
    /// Every count and shape is checked before any value is written, so a
    /// mismatch leaves the parameters untouched.
    pub fn restore(&self, params: &[Tensor]) -> Result<()> {
        if self.parameters.len() != params.len() {
            return Err(Error::shape(format!(
                "saved state has {} parameters, module has {}",
                self.parameters.len(),
                params.len()
            )));
        }
        let mut arrays = Vec::with_capacity(params.len());
        for (i, (saved, param)) in self.parameters.iter().zip(params).enumerate() {
            if saved.shape != param.shape() {
                return Err(Error::shape(format!(
                    "parameter {i}: saved shape {:?} does not match {:?}",
                    saved.shape,
                    param.shape()
                )));
            }
            let array = ArrayD::from_shape_vec(IxDyn(&saved.shape), saved.data.clone())
                .map_err(|e| Error::shape(format!("parameter {i}: {e}")))?;
            arrays.push(array);
        }
        for (param, array) in params.iter().zip(arrays) {
            param.data_mut().assign(&array);
        }
        Ok(())
    }
}

/// Write parameter values to `path`, encoded by its extension
pub fn save_parameters(params: &[Tensor], path: &Path) -> Result<()> {
    let state = ModuleState::capture(params);
    let data = match StateFormat::from_path(path)? {
        StateFormat::Json => serde_json::to_string_pretty(&state)
            .map_err(|e| Error::Serialization(format!("JSON serialization failed: {e}")))?,
        StateFormat::Yaml => serde_yaml::to_string(&state)
            .map_err(|e| Error::Serialization(format!("YAML serialization failed: {e}")))?,
    };
    fs::write(path, data)?;
    tracing::debug!(path = %path.display(), parameters = params.len(), "saved parameters");
    Ok(())
}

/// Read values written by [`save_parameters`] into `params`
pub fn load_parameters(params: &[Tensor], path: &Path) -> Result<()> {
    let format = StateFormat::from_path(path)?;
    let content = fs::read_to_string(path)?;
    let state: ModuleState = match format {
        StateFormat::Json => serde_json::from_str(&content)
            .map_err(|e| Error::Serialization(format!("JSON deserialization failed: {e}")))?,
        StateFormat::Yaml => serde_yaml::from_str(&content)
            .map_err(|e| Error::Serialization(format!("YAML deserialization failed: {e}")))?,
    };
    state.restore(params)?;
    tracing::debug!(path = %path.display(), parameters = params.len(), "loaded parameters");
    Ok(())
}
