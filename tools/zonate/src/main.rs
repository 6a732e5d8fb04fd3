//! Train a zonation model from point sets and apply it to every epoch grid.
//!
//! Outputs in `--output`: model.json, quality.json, response_curves.json and
//! one risk_{epoch}.json per `--epoch name=grid.json`.

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::{
    fs,
    path::{Path, PathBuf},
};
use zonation_core::{
    sample_background, EnvGrid, FeatureMatrix, PipelineConfig, PointSet, QualityReport, Schema,
    ZonationError, ZonationPipeline,
};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "zonate", about = "Train a SOM risk-zonation model and map risk tiers per epoch")]
struct Args {
    /// Pipeline config JSON. Missing fields take their defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Presence point set JSON.
    #[arg(short, long)]
    presence: PathBuf,

    /// True-absence point set JSON.
    #[arg(short, long)]
    absence: Option<PathBuf>,

    /// Background point set JSON. Without it, background cells are sampled
    /// from the first epoch grid.
    #[arg(short, long)]
    background: Option<PathBuf>,

    /// Epoch grid as `name=path`; repeatable. The first one also supplies
    /// point features that the point sets lack.
    #[arg(short, long = "epoch", value_parser = parse_epoch)]
    epochs: Vec<(String, PathBuf)>,

    /// Output directory.
    #[arg(short, long, default_value = "data/zonation")]
    output: PathBuf,

    /// Steps per response curve.
    #[arg(long, default_value_t = 50)]
    curve_steps: usize,
}

fn parse_epoch(s: &str) -> std::result::Result<(String, PathBuf), String> {
    match s.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected name=path, got '{s}'")),
    }
}

// ── Output types ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct TrainingSummary<'a> {
    quality: &'a QualityReport,
    presence: usize,
    pseudo_absences: usize,
    absences: usize,
    /// Mean quantization error after each SOM iteration.
    history: &'a [f64],
    /// Training rows per tier, tier 1 first.
    rows_per_tier: Vec<usize>,
}

#[derive(Serialize)]
struct EpochSummary<'a> {
    epoch: &'a str,
    coverage: f64,
    /// Index 0 counts no-data cells.
    tier_counts: Vec<usize>,
}

// ── I/O helpers ───────────────────────────────────────────────────────────────

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
    info!("Wrote {}", path.display());
    Ok(())
}

fn load_grid(path: &Path) -> Result<EnvGrid> {
    let grid: EnvGrid = read_json(path)?;
    grid.validate().with_context(|| format!("invalid grid {}", path.display()))?;
    Ok(grid)
}

/// Point features from the records' own values, or extracted from `grid`
/// when the records do not carry the predictors.
fn point_features(
    points: &PointSet,
    schema: &Schema,
    grid: Option<&EnvGrid>,
    what: &str,
) -> Result<FeatureMatrix> {
    match (points.features(schema), grid) {
        (Ok(f), _) => Ok(f),
        (Err(ZonationError::SchemaMismatch { .. }), Some(grid)) => {
            info!("{what}: predictors not in records, extracting from grid");
            Ok(grid.extract(&points.coords(), schema)?)
        }
        (Err(e), _) => Err(anyhow::Error::new(e).context(format!("{what} features"))),
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config: PipelineConfig = match &args.config {
        Some(path) => read_json(path)?,
        None => PipelineConfig::default(),
    };

    let mut epochs = Vec::with_capacity(args.epochs.len());
    for (name, path) in &args.epochs {
        epochs.push((name.clone(), load_grid(path)?));
    }
    let first_grid = epochs.first().map(|(_, g)| g);

    let schema = if !config.predictors.is_empty() {
        Schema::new(config.predictors.iter().cloned())?
    } else if let Some(grid) = first_grid {
        grid.schema()?
    } else {
        bail!("no predictors configured and no epoch grid to take them from");
    };
    info!("Predictors: {}", schema.names().join(", "));

    let presence_points: PointSet = read_json(&args.presence)?;
    let presence = point_features(&presence_points, &schema, first_grid, "presence")?;

    let background = match (&args.background, first_grid) {
        (Some(path), _) => {
            let points: PointSet = read_json(path)?;
            point_features(&points, &schema, first_grid, "background")?
        }
        (None, Some(grid)) => {
            let (cells, raw) = sample_background(grid, config.background_samples, config.seed)?;
            info!("Sampled {} background cells from epoch '{}'", cells.len(), epochs[0].0);
            raw.align_to(&schema)?
        }
        (None, None) => {
            bail!("need --background or at least one --epoch to sample background from")
        }
    };

    let absence = match &args.absence {
        Some(path) => {
            let points: PointSet = read_json(path)?;
            Some(point_features(&points, &schema, first_grid, "absence")?)
        }
        None => None,
    };

    let pipeline = ZonationPipeline::new(config);
    let outcome = pipeline
        .train(&presence, Some(&background), absence.as_ref())
        .context("training failed")?;
    let model = &outcome.model;

    fs::create_dir_all(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;
    model.save(args.output.join("model.json"))?;

    let mut rows_per_tier = vec![0usize; model.num_tiers() as usize];
    for &node in &outcome.bmus {
        rows_per_tier[model.tiers().tier_of(node) as usize - 1] += 1;
    }
    let n_presence = outcome.labels.iter().filter(|&&l| l == 1).count();
    write_json(
        &args.output.join("quality.json"),
        &TrainingSummary {
            quality: &outcome.quality,
            presence: n_presence,
            pseudo_absences: outcome.pseudo_absence_count,
            absences: outcome.labels.len() - n_presence - outcome.pseudo_absence_count,
            history: &outcome.history,
            rows_per_tier,
        },
    )?;

    let curves = schema
        .names()
        .iter()
        .map(|name| model.response_curve(name, args.curve_steps))
        .collect::<zonation_core::Result<Vec<_>>>()?;
    write_json(&args.output.join("response_curves.json"), &curves)?;

    if epochs.is_empty() {
        warn!("No epoch grids given; model trained but no risk maps written");
    }
    let mut summaries = Vec::with_capacity(epochs.len());
    for (name, grid) in &epochs {
        let risk = pipeline
            .apply(model, grid)
            .with_context(|| format!("applying model to epoch '{name}'"))?;
        write_json(&args.output.join(format!("risk_{name}.json")), &risk)?;
        summaries.push(EpochSummary {
            epoch: name,
            coverage: risk.coverage(),
            tier_counts: risk.tier_counts(model.num_tiers()),
        });
    }
    if !summaries.is_empty() {
        write_json(&args.output.join("epochs.json"), &summaries)?;
    }

    Ok(())
}
