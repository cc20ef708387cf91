use anyhow::{Context, Result, bail};
use clap::Parser;
use hawkeye_vision::config::DefectGranularity;
use hawkeye_vision::{
    ArtifactKind, BatchProcessor, BatchSummary, ImageInput, ImageOutcome, InspectionConfig,
};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "tif"];

#[derive(Parser)]
#[command(name = "hawkeye_tester")]
#[command(about = "Inspects tray photos and writes result records, overlays and a batch summary")]
struct Cli {
    /// Image files or directories of images
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Calibration profile (TOML)
    #[arg(short, long)]
    config: PathBuf,

    /// Directory for result records and overlays
    #[arg(short, long, default_value = "inspection_output")]
    output: PathBuf,

    /// Worker count; defaults to the profile value or the number of CPUs
    #[arg(long)]
    workers: Option<usize>,

    /// Render overlay images regardless of the profile
    #[arg(long)]
    overlays: bool,

    /// One defect record per offending pin or shaft
    #[arg(long)]
    per_instance: bool,
}

#[derive(Serialize)]
struct BatchRecord<'a> {
    summary: BatchSummary,
    outcomes: &'a [ImageOutcome],
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = InspectionConfig::load(&cli.config)
        .with_context(|| format!("loading calibration profile {}", cli.config.display()))?;
    if cli.workers.is_some() {
        config.workers = cli.workers;
    }
    if cli.overlays {
        config.report.render_overlays = true;
    }
    if cli.per_instance {
        config.report.granularity = DefectGranularity::PerInstance;
    }

    let paths = collect_images(&cli.inputs)?;
    if paths.is_empty() {
        bail!("no images found in the given inputs");
    }
    let mut inputs = Vec::with_capacity(paths.len());
    for path in &paths {
        let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        inputs.push(ImageInput {
            name: path.display().to_string(),
            bytes,
        });
    }

    let processor = BatchProcessor::new(config)?;
    let outcomes = processor.process_batch(inputs).await?;
    processor.shutdown().await;

    fs::create_dir_all(&cli.output).with_context(|| format!("creating {}", cli.output.display()))?;
    for outcome in &outcomes {
        write_outcome(&cli.output, outcome)?;
    }

    let summary = BatchSummary::from_outcomes(&outcomes);
    let record = BatchRecord {
        summary,
        outcomes: &outcomes,
    };
    let summary_path = cli.output.join("batch_summary.json");
    fs::write(&summary_path, serde_json::to_vec_pretty(&record)?)
        .with_context(|| format!("writing {}", summary_path.display()))?;

    info!(
        total = summary.total_captures,
        valid = summary.valid_captures,
        invalid = summary.invalid_captures,
        errored = summary.errored_captures,
        defects = summary.total_defects,
        quality_score = summary.quality_score,
        "batch summary written to {}",
        summary_path.display()
    );
    Ok(())
}

/// Expands directories (one level) into their image files, sorted by path.
fn collect_images(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found = Vec::new();
            let entries =
                fs::read_dir(input).with_context(|| format!("listing {}", input.display()))?;
            for entry in entries {
                let path = entry?.path();
                if path.is_file() && is_image(&path) {
                    found.push(path);
                }
            }
            found.sort();
            paths.extend(found);
        } else {
            paths.push(input.clone());
        }
    }
    Ok(paths)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Writes `<image_id>/result.json` and any rendered overlays for one image.
fn write_outcome(output: &Path, outcome: &ImageOutcome) -> Result<()> {
    let dir = output.join(outcome.image_id().as_str());
    fs::create_dir_all(&dir)?;
    fs::write(dir.join("result.json"), serde_json::to_vec_pretty(outcome)?)?;

    match outcome.report() {
        Some(report) => {
            if let Some(overlays) = &report.overlays {
                for kind in ArtifactKind::ALL {
                    let path = output.join(outcome.image_id().artifact_name(kind));
                    fs::write(&path, overlays.get(kind))
                        .with_context(|| format!("writing {}", path.display()))?;
                }
            }
            info!(
                image = outcome.name(),
                defects = report.result.defects_count,
                valid = report.result.is_valid,
                "inspected"
            );
        }
        None => warn!(image = outcome.name(), "not inspected"),
    }
    Ok(())
}
