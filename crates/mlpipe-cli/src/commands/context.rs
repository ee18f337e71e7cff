//! Context command - probe for native acceleration and create a context.

use clap::Args;
use console::style;

use mlpipe_core::{ContextState, HostAcceleration, HostContextManager, SoftwareEmulation};

/// Arguments for the context command.
#[derive(Args)]
pub struct ContextArgs {
    /// Do not load the software fallback layer
    #[arg(long)]
    no_fallback: bool,
}

pub async fn run(args: ContextArgs) -> anyhow::Result<()> {
    let mut manager = HostContextManager::new(HostAcceleration);

    let probed = manager.probe().clone();
    println!(
        "Native acceleration: {}",
        match probed {
            ContextState::Supported => style("supported").green(),
            _ => style("unsupported").yellow(),
        }
    );

    if !args.no_fallback {
        manager.load_fallback(SoftwareEmulation);
    }
    println!("Status: {}", manager.status());

    let created = manager.create_context().await.map(|_| ());
    if let Err(e) = created {
        println!("Status: {}", style(manager.status()).red());
        return Err(e.into());
    }

    let context = manager.run_noop()?;
    println!(
        "{} {} (provider: {}, backend: {})",
        style("✓").green(),
        manager.status(),
        context.provider,
        context.backend
    );
    println!("No-op computation completed");

    Ok(())
}
