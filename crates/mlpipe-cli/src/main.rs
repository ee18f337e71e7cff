//! CLI application for mlpipe image classification.

mod commands;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{backends, classify, config, context, demo};

/// mlpipe - Classify images with a tensor pipeline
#[derive(Parser)]
#[command(name = "mlpipe")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify one or more images
    Classify(classify::ClassifyArgs),

    /// Run a prediction through a small dense network
    Demo(demo::DemoArgs),

    /// Show available compute backends
    Backends(backends::BackendsArgs),

    /// Probe for native acceleration and create a context
    Context(context::ContextArgs),

    /// Manage configuration
    Config(config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Classify(args) => classify::run(args, cli.config.as_deref()).await,
        Commands::Demo(args) => demo::run(args, cli.config.as_deref()).await,
        Commands::Backends(args) => backends::run(args, cli.config.as_deref()).await,
        Commands::Context(args) => context::run(args).await,
        Commands::Config(args) => config::run(args, cli.config.as_deref()).await,
    }
}
