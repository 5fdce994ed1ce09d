//! # Petrel CLI
//!
//! Reads a TOML model description, reports the partition structure and
//! parameter linkage, and optionally prints the unconstrained parameter
//! vector with its log-Jacobian.
//!
//! ## Usage
//! ```bash
//! petrel --model model.toml
//! petrel --model model.toml --encode
//! ```

use std::fs;

use tracing::info;
use tracing_subscriber::EnvFilter;

use petrel::config::{Config, ModelSpec};
use petrel::error::Result;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let config = Config::parse_and_validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log.clone())),
        )
        .with_writer(std::io::stderr)
        .init();

    eprintln!("Petrel v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("Model: {:?}", config.model);

    let text = fs::read_to_string(&config.model)?;
    let spec = ModelSpec::from_toml(&text)?;
    let mut model = spec.build_model()?;
    info!(subsets = model.num_subsets(), sites = model.num_sites(), "model ready");

    println!("{}", model.describe());

    println!("Parameter names and values:");
    println!("{}", model.param_names("\t"));
    println!("{}", model.param_values("\t"));

    if config.encode {
        let (flat, log_jacobian) = model.encode_params()?;
        println!("\nUnconstrained parameter vector ({} entries):", flat.len());
        let joined = flat
            .iter()
            .map(|v| format!("{:.5}", v))
            .collect::<Vec<_>>()
            .join("\t");
        println!("{}", joined);
        println!("log-Jacobian: {:.5}", log_jacobian);
    }

    Ok(())
}
