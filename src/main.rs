//! gradtape CLI
//!
//! Single-command training entry point for the gradtape library.
//!
//! # Usage
//!
//! ```bash
//! # Train from config
//! gradtape train config.yaml
//!
//! # Train with overrides
//! gradtape train config.yaml --epochs 10 --lr 0.001
//!
//! # Train and keep the parameters
//! gradtape train config.yaml --output weights.json
//!
//! # Validate config
//! gradtape validate config.yaml
//!
//! # Show config info
//! gradtape info config.yaml
//! ```

use clap::Parser;
use gradtape::config::{
    apply_overrides, build_model, load_config, parse_config, train_model, validate_config, Cli,
    Command, InfoArgs, OutputFormat, TrainArgs, ValidateArgs,
};
use gradtape::nn::Module;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Configure output based on verbose/quiet flags
    let log_level = if cli.quiet {
        LogLevel::Quiet
    } else if cli.verbose {
        LogLevel::Verbose
    } else {
        LogLevel::Normal
    };
    init_tracing(log_level);

    let result = match cli.command {
        Command::Train(args) => run_train(args, log_level),
        Command::Validate(args) => run_validate(args, log_level),
        Command::Info(args) => run_info(args, log_level),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum LogLevel {
    Quiet,
    Normal,
    Verbose,
}

fn log(level: LogLevel, required: LogLevel, msg: &str) {
    if level != LogLevel::Quiet && (level == required || required == LogLevel::Normal) {
        println!("{msg}");
    }
}

/// Library diagnostics go to stderr; `RUST_LOG` overrides the default filter.
fn init_tracing(level: LogLevel) {
    let default = match level {
        LogLevel::Quiet => "error",
        LogLevel::Normal => "warn",
        LogLevel::Verbose => "gradtape=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_train(args: TrainArgs, level: LogLevel) -> Result<(), String> {
    log(
        level,
        LogLevel::Normal,
        &format!("gradtape: Training from {}", args.config.display()),
    );

    // Validate after overrides
    let mut spec = parse_config(&args.config).map_err(|e| format!("Config error: {e}"))?;
    apply_overrides(&mut spec, &args);
    validate_config(&spec).map_err(|e| format!("Invalid config: {e}"))?;

    log(
        level,
        LogLevel::Verbose,
        &format!("  Layers: {:?} ({})", spec.model.layers, spec.model.activation),
    );
    log(
        level,
        LogLevel::Verbose,
        &format!(
            "  Optimizer: {} (lr={})",
            spec.optimizer.name, spec.optimizer.lr
        ),
    );
    log(
        level,
        LogLevel::Verbose,
        &format!("  Epochs: {}", spec.training.epochs),
    );

    if args.dry_run {
        log(
            level,
            LogLevel::Normal,
            "Dry run - config validated successfully",
        );
        return Ok(());
    }

    let log_every = args.log_every.max(1);
    let (model, report) = train_model(&spec, |epoch, loss| {
        if (epoch + 1) % log_every == 0 {
            log(
                level,
                LogLevel::Normal,
                &format!("Epoch {:>5}: loss={loss:.6}", epoch + 1),
            );
        }
    })
    .map_err(|e| format!("Training error: {e}"))?;

    if let (Some(first), Some(last)) = (report.initial_loss(), report.final_loss()) {
        log(
            level,
            LogLevel::Normal,
            &format!("Training complete! loss {first:.6} -> {last:.6}"),
        );
    }

    if let Some(output) = &args.output {
        model
            .save(output)
            .map_err(|e| format!("Failed to save parameters: {e}"))?;
        log(
            level,
            LogLevel::Normal,
            &format!("Saved parameters to {}", output.display()),
        );
    }
    Ok(())
}

fn run_validate(args: ValidateArgs, level: LogLevel) -> Result<(), String> {
    log(
        level,
        LogLevel::Normal,
        &format!("Validating config: {}", args.config.display()),
    );

    let spec = parse_config(&args.config).map_err(|e| format!("Config error: {e}"))?;
    validate_config(&spec).map_err(|e| format!("Validation failed: {e}"))?;

    log(level, LogLevel::Normal, "Configuration is valid");

    if args.detailed {
        println!();
        println!("Configuration Summary:");
        println!("  Layers: {:?}", spec.model.layers);
        println!("  Activation: {}", spec.model.activation);
        println!("  Bias: {}", spec.model.bias);
        if spec.model.dropout > 0.0 {
            println!("  Dropout: {}", spec.model.dropout);
        }
        println!();
        println!("  Samples: {}", spec.data.len());
        println!();
        println!("  Optimizer: {}", spec.optimizer.name);
        println!("  Learning rate: {}", spec.optimizer.lr);
        if spec.optimizer.momentum > 0.0 {
            println!("  Momentum: {}", spec.optimizer.momentum);
        }
        println!();
        println!("  Epochs: {}", spec.training.epochs);
        println!("  Reduction: {}", spec.training.reduction);
        if let Some(seed) = spec.training.seed {
            println!("  Seed: {seed}");
        }
    }

    Ok(())
}

fn run_info(args: InfoArgs, level: LogLevel) -> Result<(), String> {
    let spec = load_config(&args.config).map_err(|e| format!("Config error: {e}"))?;

    match args.format {
        OutputFormat::Text => {
            let mut rng = rand::rng();
            let model = build_model(&spec.model, &mut rng).map_err(|e| e.to_string())?;
            let parameters = gradtape::config::parameter_count(&model);

            log(level, LogLevel::Normal, "Configuration Info:");
            println!();
            println!("Layers: {:?}", spec.model.layers);
            println!("Parameters: {parameters}");
            println!(
                "Optimizer: {} (lr={})",
                spec.optimizer.name, spec.optimizer.lr
            );
            println!("Epochs: {}", spec.training.epochs);
            println!("Samples: {}", spec.data.len());
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&spec)
                .map_err(|e| format!("JSON serialization error: {e}"))?;
            println!("{json}");
        }
        OutputFormat::Yaml => {
            let yaml = serde_yaml::to_string(&spec)
                .map_err(|e| format!("YAML serialization error: {e}"))?;
            println!("{yaml}");
        }
    }

    Ok(())
}
