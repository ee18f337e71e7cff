//! Config command - manage configuration.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use console::style;

use mlpipe_core::MlpipeConfig;

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Show current configuration
    Show,

    /// Initialize a new configuration file
    Init(InitArgs),

    /// Get a specific configuration value
    Get {
        /// Configuration key (e.g., "preprocessing.height")
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,
        /// New value (JSON, or a plain string)
        value: String,
    },

    /// Show configuration file path
    Path,
}

#[derive(Args)]
struct InitArgs {
    /// Output path for configuration file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Overwrite existing file
    #[arg(long)]
    force: bool,
}

pub async fn run(args: ConfigArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);

    match args.command {
        ConfigCommand::Show => show_config(&path),
        ConfigCommand::Init(init_args) => init_config(init_args, &path),
        ConfigCommand::Get { key } => get_config(&path, &key),
        ConfigCommand::Set { key, value } => set_config(&path, &key, &value),
        ConfigCommand::Path => show_path(&path),
    }
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mlpipe")
        .join("config.json")
}

/// Load the configuration used by the other commands.
///
/// An explicit path must exist; the default location falls back to
/// built-in defaults when no file has been created yet.
pub fn load(config_path: Option<&str>) -> anyhow::Result<MlpipeConfig> {
    match config_path {
        Some(path) => Ok(MlpipeConfig::from_file(Path::new(path))?),
        None => {
            let path = default_config_path();
            if path.exists() {
                Ok(MlpipeConfig::from_file(&path)?)
            } else {
                Ok(MlpipeConfig::default())
            }
        }
    }
}

fn load_or_default(path: &Path) -> anyhow::Result<MlpipeConfig> {
    if path.exists() {
        Ok(MlpipeConfig::from_file(path)?)
    } else {
        Ok(MlpipeConfig::default())
    }
}

fn show_config(path: &Path) -> anyhow::Result<()> {
    if !path.exists() {
        println!(
            "{} No config file found, showing defaults.",
            style("ℹ").blue()
        );
    }
    let config = load_or_default(path)?;

    println!("{}", serde_json::to_string_pretty(&config)?);

    Ok(())
}

fn init_config(args: InitArgs, path: &Path) -> anyhow::Result<()> {
    let output_path = args.output.unwrap_or_else(|| path.to_path_buf());

    if output_path.exists() && !args.force {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            output_path.display()
        );
    }

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let config = MlpipeConfig::default();
    config.save(&output_path)?;

    println!(
        "{} Created configuration file at {}",
        style("✓").green(),
        output_path.display()
    );

    Ok(())
}

fn get_config(path: &Path, key: &str) -> anyhow::Result<()> {
    let config = load_or_default(path)?;
    let json = serde_json::to_value(&config)?;

    let parts: Vec<&str> = key.split('.').collect();
    let current = json
        .pointer(&pointer(&parts))
        .ok_or_else(|| anyhow::anyhow!("Configuration key not found: {}", key))?;

    println!("{}", serde_json::to_string_pretty(current)?);

    Ok(())
}

fn set_config(path: &Path, key: &str, value: &str) -> anyhow::Result<()> {
    let config = load_or_default(path)?;

    let parsed_value: serde_json::Value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));

    let mut json = serde_json::to_value(&config)?;

    let parts: Vec<&str> = key.split('.').collect();
    let (last, parents) = parts
        .split_last()
        .ok_or_else(|| anyhow::anyhow!("Empty configuration key"))?;

    let current = json
        .pointer_mut(&pointer(parents))
        .ok_or_else(|| anyhow::anyhow!("Configuration path not found: {}", key))?;

    match current {
        serde_json::Value::Object(obj) => {
            if !obj.contains_key(*last) {
                anyhow::bail!("Configuration key not found: {}", key);
            }
            obj.insert((*last).to_string(), parsed_value.clone());
        }
        serde_json::Value::Array(items) => {
            let slot = last
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get_mut(i))
                .ok_or_else(|| anyhow::anyhow!("Configuration key not found: {}", key))?;
            *slot = parsed_value.clone();
        }
        _ => anyhow::bail!("Cannot set value at non-object path"),
    }

    let config: MlpipeConfig = serde_json::from_value(json)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    config.save(path)?;

    println!(
        "{} Set {} = {}",
        style("✓").green(),
        key,
        serde_json::to_string(&parsed_value)?
    );

    Ok(())
}

fn show_path(path: &Path) -> anyhow::Result<()> {
    println!("Configuration file: {}", path.display());

    if path.exists() {
        println!("Status: {}", style("exists").green());
    } else {
        println!("Status: {}", style("not created").yellow());
        println!();
        println!("Run 'mlpipe config init' to create a configuration file.");
    }

    Ok(())
}

/// Dotted key to a JSON pointer: `model.layers.0` becomes `/model/layers/0`.
fn pointer(parts: &[&str]) -> String {
    parts.iter().map(|p| format!("/{}", p)).collect()
}
