//! Demo command - build a small dense network and run one prediction.

use std::time::{SystemTime, UNIX_EPOCH};

use clap::Args;
use console::style;
use tracing::info;

use mlpipe_core::{BackendSelector, RuntimeContext, run_dense_demo};

/// Arguments for the demo command.
#[derive(Args)]
pub struct DemoArgs {
    /// Seed for the random input (default: derived from the clock)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Backend preference order, overriding the configuration
    #[arg(short, long, value_delimiter = ',')]
    backend: Vec<String>,

    /// Print the full result as JSON
    #[arg(long)]
    json: bool,
}

pub async fn run(args: DemoArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = super::config::load(config_path)?;
    let backends = if args.backend.is_empty() {
        config.runtime.backends
    } else {
        args.backend
    };

    let mut ctx = RuntimeContext::new();
    let active = BackendSelector::from_names(&backends).initialize(&mut ctx)?;
    info!("Demo running on {}", active.name);

    let seed = args.seed.unwrap_or_else(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0)
    });

    let outcome = run_dense_demo(&mut ctx, seed)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{} {}", style("✓").green(), outcome);
        println!(
            "  backend: {}, seed: {}, tensors live: {}",
            active.name,
            seed,
            ctx.stats().live
        );
    }

    Ok(())
}
