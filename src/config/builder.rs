//! Build training components from configuration

use super::schema::{DataConfig, ModelSpec, OptimSpec};
use crate::error::{Error, Result};
use crate::nn::{Dropout, Linear, Module, ReLU, Sequential, Tanh};
use crate::optim::{Adam, Optimizer, SGD};
use crate::Tensor;
use rand::Rng;

/// Build optimizer from configuration over `params`
pub fn build_optimizer(spec: &OptimSpec, params: Vec<Tensor>) -> Result<Box<dyn Optimizer>> {
    match spec.name.as_str() {
        "sgd" => Ok(Box::new(SGD::with_momentum(params, spec.lr, spec.momentum))),
        "adam" => Ok(Box::new(Adam::new(
            params,
            spec.lr,
            spec.beta1,
            spec.beta2,
            spec.eps,
        ))),
        name => Err(Error::Config(format!(
            "Unknown optimizer: {name}. Supported: sgd, adam"
        ))),
    }
}

/// Build a multilayer perceptron from configuration
///
/// The activation, followed by dropout when it is enabled, sits between
/// consecutive linear layers; the last layer's output is left linear.
pub fn build_model<R: Rng>(spec: &ModelSpec, rng: &mut R) -> Result<Sequential> {
    let mut model = Sequential::new();
    let pairs: Vec<(usize, usize)> = spec.layers.windows(2).map(|w| (w[0], w[1])).collect();
    for (i, &(fan_in, fan_out)) in pairs.iter().enumerate() {
        model.push(Linear::with_rng(rng, fan_in, fan_out, spec.bias));
        if i + 1 < pairs.len() {
            match spec.activation.as_str() {
                "relu" => model.push(ReLU),
                "tanh" => model.push(Tanh),
                other => {
                    return Err(Error::Config(format!(
                        "Unknown activation: {other}. Supported: relu, tanh"
                    )))
                }
            }
            if spec.dropout > 0.0 {
                model.push(Dropout::with_seed(spec.dropout, rng.random())?);
            }
        }
    }
    Ok(model)
}

/// Stack inline rows into `(samples, width)` input and target tensors
pub fn build_dataset(data: &DataConfig) -> Result<(Tensor, Tensor)> {
    Ok((stack_rows(&data.inputs)?, stack_rows(&data.targets)?))
}

fn stack_rows(rows: &[Vec<f32>]) -> Result<Tensor> {
    let width = rows.first().map_or(0, Vec::len);
    let values: Vec<f32> = rows.iter().flatten().copied().collect();
    Tensor::from_vec(values, &[rows.len(), width], false)
}

/// Total number of trainable scalars in `model`
pub fn parameter_count(model: &dyn Module) -> usize {
    model.parameters().iter().map(Tensor::numel).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn optim(name: &str) -> OptimSpec {
        OptimSpec {
            name: name.to_string(),
            lr: 0.01,
            momentum: 0.5,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
        }
    }

    #[test]
    fn test_build_sgd_optimizer() {
        let p = Tensor::zeros(&[2], true);
        let optimizer = build_optimizer(&optim("sgd"), vec![p]).unwrap();
        assert!((optimizer.lr() - 0.01).abs() < 1e-6);
        assert_eq!(optimizer.params().len(), 1);
    }

    #[test]
    fn test_build_adam_optimizer() {
        let optimizer = build_optimizer(&optim("adam"), Vec::new()).unwrap();
        assert!((optimizer.lr() - 0.01).abs() < 1e-6);
    }

    #[test]
    fn test_optimizer_names_are_case_sensitive() {
        assert!(matches!(
            build_optimizer(&optim("Adam"), Vec::new()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_build_invalid_optimizer() {
        assert!(matches!(
            build_optimizer(&optim("rmsprop"), Vec::new()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_build_model_layout() {
        let spec = ModelSpec {
            layers: vec![2, 4, 3, 1],
            activation: "relu".to_string(),
            bias: true,
            dropout: 0.0,
        };
        let model = build_model(&spec, &mut StdRng::seed_from_u64(0)).unwrap();
        // three linear layers plus two activations
        assert_eq!(model.len(), 5);
        assert_eq!(parameter_count(&model), 2 * 4 + 4 + 4 * 3 + 3 + 3 + 1);

        let x = Tensor::zeros(&[5, 2], false);
        assert_eq!(model.forward(&x).unwrap().shape(), vec![5, 1]);
    }

    #[test]
    fn test_build_model_with_dropout() {
        let spec = ModelSpec {
            layers: vec![2, 4, 3, 1],
            activation: "tanh".to_string(),
            bias: false,
            dropout: 0.5,
        };
        let mut model = build_model(&spec, &mut StdRng::seed_from_u64(0)).unwrap();
        // dropout follows each of the two activations
        assert_eq!(model.len(), 7);
        assert_eq!(parameter_count(&model), 2 * 4 + 4 * 3 + 3);

        model.eval();
        let x = Tensor::from_vec(vec![0.3, -0.2], &[1, 2], false).unwrap();
        let first = model.forward(&x).unwrap().to_vec();
        assert_eq!(model.forward(&x).unwrap().to_vec(), first);
    }

    #[test]
    fn test_build_dataset() {
        let data = DataConfig {
            inputs: vec![vec![1.0, 2.0], vec![3.0, 4.0]],
            targets: vec![vec![1.0], vec![0.0]],
        };
        let (x, y) = build_dataset(&data).unwrap();
        assert_eq!(x.shape(), vec![2, 2]);
        assert_eq!(x.to_vec(), vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(y.shape(), vec![2, 1]);
        assert!(!x.requires_grad());
    }
}
