use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use docket_assemble::drafting::TemplateBackend;
use docket_assemble::matter::Matter;
use docket_assemble::observability::log_snapshot;
use docket_assemble::pipeline::{Pipeline, PipelineResult, RunOptions};
use docket_assemble::presets::{generate_preset, render_preset};
use docket_assemble::snapshot::{FsSnapshotStore, NullSnapshotStore, SnapshotStore};
use docket_assemble::stages;
use docket_assemble::step::{StepStatus, StepSummary};
use docket_assemble::validation::{validate_matter, validate_selection};
use serde_json::to_writer_pretty;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, prelude::*};

fn main() -> Result<()> {
    configure_tracing()?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            matter,
            steps,
            continue_on_error,
            print_metrics,
            summary_json,
            metrics_prometheus,
            snapshot_dir,
            output_dir,
        } => run_matter(
            matter,
            steps,
            continue_on_error,
            print_metrics,
            summary_json,
            metrics_prometheus,
            snapshot_dir,
            output_dir,
        ),
        Commands::ListStages => list_stages(),
        Commands::Validate { matter, steps } => validate_cmd(matter, steps),
        Commands::Matter { action } => matter_command(action),
    }
}

fn configure_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|err| anyhow!(err.to_string()))?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_matter(
    matter_path: PathBuf,
    steps: Vec<String>,
    continue_on_error: bool,
    print_metrics: bool,
    summary_json: Option<PathBuf>,
    metrics_prometheus: Option<PathBuf>,
    snapshot_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
) -> Result<()> {
    let mut matter = Matter::load(&matter_path)?;
    if let Some(dir) = output_dir {
        matter.output.directory = dir;
    }

    let report = validate_matter(&matter);
    for warning in &report.warnings {
        warn!(file = %matter_path.display(), "{warning}");
    }
    if !report.is_ok() {
        for error_msg in &report.errors {
            error!(file = %matter_path.display(), "{error_msg}");
        }
        bail!(
            "Matter validation failed with {} error(s)",
            report.errors.len()
        );
    }

    let store: Arc<dyn SnapshotStore> = match snapshot_dir {
        Some(dir) => Arc::new(FsSnapshotStore::new(dir)),
        None => Arc::new(NullSnapshotStore),
    };
    let pipeline = stages::default_pipeline(Arc::new(matter), Arc::new(TemplateBackend), store)?;
    let metrics_handle = pipeline.metrics();

    let options = RunOptions {
        steps: (!steps.is_empty()).then_some(steps),
        continue_on_error,
        on_step_complete: Some(Box::new(|summary: &StepSummary| {
            println!(
                "\x1b[32mok\x1b[0m {} {} ({:.1} ms)",
                summary.stage_key, summary.label, summary.duration_ms
            );
            Ok(())
        })),
    };

    let mut progress = |line: &str| println!("   · {line}");
    let result = pipeline.run(options, &mut progress)?;

    println!();
    print_summary_table(&pipeline, &result);

    if let Some(path) = summary_json {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create summary directory: {}", parent.display())
            })?;
        }
        let file = File::create(&path)
            .with_context(|| format!("Failed to create summary file: {}", path.display()))?;
        to_writer_pretty(file, &result)
            .with_context(|| format!("Failed to write summary JSON: {}", path.display()))?;
        info!(summary = %path.display(), "Run summary written");
    }

    if print_metrics {
        log_snapshot(&metrics_handle.snapshot());
    }
    if let Some(path) = metrics_prometheus {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create metrics directory: {}", parent.display())
            })?;
        }
        fs::write(&path, metrics_handle.snapshot().to_prometheus())
            .with_context(|| format!("Failed to write Prometheus metrics: {}", path.display()))?;
        info!(metrics = %path.display(), "Prometheus metrics written");
    }

    if result.success {
        println!("\x1b[32mAssembly completed\x1b[0m");
        Ok(())
    } else {
        match (&result.stopped_at, &result.reason) {
            (Some(stopped_at), Some(reason)) => {
                bail!("Run halted at '{stopped_at}': {reason}")
            }
            _ => bail!(
                "Run completed with {} failed stage(s)",
                result.aggregate.failed
            ),
        }
    }
}

fn print_summary_table(pipeline: &Pipeline, result: &PipelineResult) {
    for key in pipeline.stage_keys() {
        match result.summaries.get(key) {
            Some(summary) => {
                let status = match summary.status {
                    StepStatus::Completed => "completed",
                    StepStatus::Skipped => "skipped",
                    StepStatus::Failed => "FAILED",
                };
                match &summary.error {
                    Some(error_msg) => {
                        println!("{status:>9}  {key} ({:.1} ms): {error_msg}", summary.duration_ms)
                    }
                    None => println!("{status:>9}  {key} ({:.1} ms)", summary.duration_ms),
                }
            }
            None => println!("{:>9}  {key}", "-"),
        }
    }
    println!(
        "{} stage(s): {} completed, {} skipped, {} failed, {} words drafted",
        result.aggregate.total_stages,
        result.aggregate.completed,
        result.aggregate.skipped,
        result.aggregate.failed,
        result.aggregate.total_extra_metric
    );
}

fn list_stages() -> Result<()> {
    let pipeline = reference_pipeline()?;
    println!("Available stages:");
    for (position, stage) in pipeline.stages().iter().enumerate() {
        let requires = stage.requires();
        if requires.is_empty() {
            println!("{:>2}. {:<10} {}", position + 1, stage.key(), stage.label());
        } else {
            println!(
                "{:>2}. {:<10} {} (requires: {})",
                position + 1,
                stage.key(),
                stage.label(),
                requires.join(", ")
            );
        }
        println!("    aliases: {}", pipeline.aliases_for(stage.key()).join(", "));
    }
    Ok(())
}

fn validate_cmd(matter_path: PathBuf, steps: Vec<String>) -> Result<()> {
    let matter = Matter::load(&matter_path)?;
    let mut report = validate_matter(&matter);

    if !steps.is_empty() {
        let pipeline = stages::default_pipeline(
            Arc::new(matter),
            Arc::new(TemplateBackend),
            Arc::new(NullSnapshotStore),
        )?;
        report.merge(validate_selection(&pipeline, &steps));
    }

    for warning in &report.warnings {
        warn!(file = %matter_path.display(), "{warning}");
    }

    if report.is_ok() {
        info!(file = %matter_path.display(), "Matter validation passed");
        Ok(())
    } else {
        for error_msg in &report.errors {
            error!(file = %matter_path.display(), "{error_msg}");
        }
        Err(anyhow!(
            "Matter validation failed with {} error(s)",
            report.errors.len()
        ))
    }
}

fn matter_command(command: MatterCommands) -> Result<()> {
    match command {
        MatterCommands::New { preset, output } => {
            let destination =
                output.unwrap_or_else(|| PathBuf::from(format!("matters/{preset}.yaml")));
            let generated = generate_preset(&preset, &destination)?;
            info!(
                preset = %preset,
                path = %generated.display(),
                "Preset matter generated"
            );
            Ok(())
        }
    }
}

// The stage set is fixed; any well-formed matter yields the same registry.
fn reference_pipeline() -> Result<Pipeline> {
    let matter: Matter = serde_yaml::from_str(&render_preset("demand-letter")?)
        .context("Failed to parse built-in preset matter")?;
    let pipeline = stages::default_pipeline(
        Arc::new(matter),
        Arc::new(TemplateBackend),
        Arc::new(NullSnapshotStore),
    )?;
    Ok(pipeline)
}

#[derive(Parser)]
#[command(
    name = "docket-assemble",
    version,
    about = "Sequential document-assembly pipeline for legal matters"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Run {
        matter: PathBuf,
        #[arg(long, value_delimiter = ',')]
        steps: Vec<String>,
        #[arg(long)]
        continue_on_error: bool,
        #[arg(long)]
        print_metrics: bool,
        #[arg(long = "summary-json")]
        summary_json: Option<PathBuf>,
        #[arg(long = "metrics-prometheus")]
        metrics_prometheus: Option<PathBuf>,
        #[arg(long = "snapshot-dir")]
        snapshot_dir: Option<PathBuf>,
        #[arg(long = "output-dir")]
        output_dir: Option<PathBuf>,
    },
    ListStages,
    Validate {
        matter: PathBuf,
        #[arg(long, value_delimiter = ',')]
        steps: Vec<String>,
    },
    Matter {
        #[command(subcommand)]
        action: MatterCommands,
    },
}

#[derive(Subcommand)]
enum MatterCommands {
    New {
        #[arg(long)]
        preset: String,
        #[arg(long)]
        output: Option<PathBuf>,
    },
}
