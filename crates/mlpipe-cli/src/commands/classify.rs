//! Classify command - run the image classifier over one or more files.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{debug, error, warn};

use mlpipe_core::{ClassificationPipeline, ClassificationResult};

/// Arguments for the classify command.
#[derive(Args)]
pub struct ClassifyArgs {
    /// Input images or glob patterns
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Backend preference order, overriding the configuration
    #[arg(short, long, value_delimiter = ',')]
    backend: Vec<String>,

    /// Continue on error
    #[arg(long)]
    continue_on_error: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output
    Csv,
    /// One line per file
    Text,
}

/// Outcome for a single input file.
#[derive(Debug, Serialize)]
struct FileResult {
    path: PathBuf,
    #[serde(flatten)]
    result: Option<ClassificationResult>,
    error: Option<String>,
    processing_time_ms: u64,
}

pub async fn run(args: ClassifyArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = super::config::load(config_path)?;
    if !args.backend.is_empty() {
        config.runtime.backends = args.backend.clone();
    }

    let files = expand_inputs(&args.inputs)?;
    if files.is_empty() {
        anyhow::bail!("No matching files found for: {}", args.inputs.join(", "));
    }

    let mut pipeline = ClassificationPipeline::new(config)?;
    debug!("Using backend: {}", pipeline.backend().name);
    pipeline.load_model()?;

    let pb = if files.len() > 1 {
        let pb = ProgressBar::new(files.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} images")?
                .progress_chars("=>-"),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let mut results = Vec::with_capacity(files.len());
    for path in files {
        let file_start = Instant::now();
        let outcome = classify_file(&mut pipeline, &path).await;
        let processing_time_ms = file_start.elapsed().as_millis() as u64;

        match outcome {
            Ok(result) => results.push(FileResult {
                path,
                result: Some(result),
                error: None,
                processing_time_ms,
            }),
            Err(e) => {
                let error_msg = e.to_string();
                if args.continue_on_error {
                    warn!("Failed to classify {}: {}", path.display(), error_msg);
                    results.push(FileResult {
                        path,
                        result: None,
                        error: Some(error_msg),
                        processing_time_ms,
                    });
                } else {
                    error!("Failed to classify {}: {}", path.display(), error_msg);
                    pb.abandon();
                    anyhow::bail!("Classification failed for {}: {}", path.display(), error_msg);
                }
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    let content = match args.format {
        OutputFormat::Json => serde_json::to_string_pretty(&results)?,
        OutputFormat::Csv => format_csv(&results)?,
        OutputFormat::Text => format_text(&results),
    };

    match &args.output {
        Some(path) => {
            fs::write(path, &content)?;
            eprintln!(
                "{} Results written to {}",
                style("✓").green(),
                path.display()
            );
        }
        None => print!("{}", content),
    }

    let failed = results.iter().filter(|r| r.error.is_some()).count();
    debug!(
        "Classified {} files in {:?} ({} failed, {} tensors live)",
        results.len(),
        start.elapsed(),
        failed,
        pipeline.stats().live
    );
    if failed > 0 {
        eprintln!(
            "{} {} of {} files failed",
            style("!").yellow(),
            failed,
            results.len()
        );
    }

    Ok(())
}

async fn classify_file(
    pipeline: &mut ClassificationPipeline,
    path: &Path,
) -> anyhow::Result<ClassificationResult> {
    let bytes = tokio::fs::read(path).await?;
    Ok(pipeline.classify_bytes(&bytes)?)
}

/// Expand glob patterns; plain paths are passed through unchanged.
fn expand_inputs(inputs: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.contains(['*', '?', '[']) {
            let before = files.len();
            files.extend(glob(input)?.filter_map(|r| r.ok()).filter(|p| p.is_file()));
            if files.len() == before {
                warn!("Pattern matched no files: {}", input);
            }
        } else {
            files.push(PathBuf::from(input));
        }
    }
    Ok(files)
}

fn format_csv(results: &[FileResult]) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "path",
        "status",
        "label",
        "index",
        "confidence",
        "processing_time_ms",
        "error",
    ])?;

    for result in results {
        let path = result.path.display().to_string();
        let time = result.processing_time_ms.to_string();
        match &result.result {
            Some(r) => wtr.write_record([
                path.as_str(),
                "success",
                &r.label,
                &r.index.to_string(),
                &format!("{:.4}", r.confidence),
                &time,
                "",
            ])?,
            None => wtr.write_record([
                path.as_str(),
                "error",
                "",
                "",
                "",
                &time,
                result.error.as_deref().unwrap_or(""),
            ])?,
        }
    }

    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

fn format_text(results: &[FileResult]) -> String {
    let mut output = String::new();
    for result in results {
        match (&result.result, &result.error) {
            (Some(r), _) => output.push_str(&format!("{}: {}\n", result.path.display(), r)),
            (None, error) => output.push_str(&format!(
                "{}: error: {}\n",
                result.path.display(),
                error.as_deref().unwrap_or("unknown error")
            )),
        }
    }
    output
}
