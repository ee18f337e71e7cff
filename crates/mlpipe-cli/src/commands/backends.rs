//! Backends command - report compiled-in backends and which one comes up.

use clap::Args;
use console::style;
use serde::Serialize;

use mlpipe_core::mlcontext::{AccelerationProvider, HostAcceleration};
use mlpipe_core::{BackendSelector, RuntimeContext};

/// Arguments for the backends command.
#[derive(Args)]
pub struct BackendsArgs {
    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct BackendReport {
    available: Vec<&'static str>,
    preferred: Vec<String>,
    active: Option<String>,
    skipped: Vec<Skipped>,
    native_acceleration: bool,
}

#[derive(Debug, Serialize)]
struct Skipped {
    name: String,
    reason: String,
}

pub async fn run(args: BackendsArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = super::config::load(config_path)?;

    let mut ctx = RuntimeContext::new();
    let selection = BackendSelector::from_names(&config.runtime.backends).initialize(&mut ctx);

    let (active, skipped) = match selection {
        Ok(active) => (Some(active.name), active.skipped),
        Err(mlpipe_core::RuntimeError::NoBackendAvailable { attempts }) => (None, attempts),
        Err(e) => return Err(e.into()),
    };

    let report = BackendReport {
        available: mlpipe_core::backend::available(),
        preferred: config.runtime.backends.clone(),
        active,
        skipped: skipped
            .into_iter()
            .map(|(name, reason)| Skipped { name, reason })
            .collect(),
        native_acceleration: HostAcceleration.is_available(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Compiled-in backends: {}", report.available.join(", "));
    println!("Preference order:     {}", report.preferred.join(", "));
    match &report.active {
        Some(name) => println!("Active backend:       {}", style(name).green()),
        None => println!("Active backend:       {}", style("none").red()),
    }
    for skipped in &report.skipped {
        println!(
            "  {} {}: {}",
            style("✗").yellow(),
            skipped.name,
            skipped.reason
        );
    }
    println!(
        "Native acceleration:  {}",
        if report.native_acceleration {
            style("available").green()
        } else {
            style("unavailable").yellow()
        }
    );

    if report.active.is_none() {
        anyhow::bail!("No backend could be initialized");
    }

    Ok(())
}
