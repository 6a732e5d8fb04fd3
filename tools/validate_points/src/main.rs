//! Score held-out labelled points against a saved zonation model, per epoch.
//! Output: one JSON object mapping epoch name → validation report.

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use serde::de::DeserializeOwned;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};
use zonation_core::{validate_points, EnvGrid, PointSet, RiskTier, ValidationReport, ZonationModel};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "validate_points",
    about = "Validate risk tiers against held-out presence/absence points"
)]
struct Args {
    /// Model JSON written by zonate.
    #[arg(short, long, default_value = "data/zonation/model.json")]
    model: PathBuf,

    /// Labelled point set JSON (label 1 presence, 0 absence).
    #[arg(short, long)]
    points: PathBuf,

    /// Epoch grid as `name=path`; repeatable.
    #[arg(short, long = "epoch", value_parser = parse_epoch, required = true)]
    epochs: Vec<(String, PathBuf)>,

    /// Lowest tier counted as a positive prediction.
    #[arg(short, long, default_value_t = 2)]
    threshold: RiskTier,

    /// Output JSON path.
    #[arg(short, long, default_value = "data/zonation/validation.json")]
    output: PathBuf,
}

fn parse_epoch(s: &str) -> std::result::Result<(String, PathBuf), String> {
    match s.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected name=path, got '{s}'")),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn load_grid(path: &Path) -> Result<EnvGrid> {
    let grid: EnvGrid = read_json(path)?;
    grid.validate().with_context(|| format!("invalid grid {}", path.display()))?;
    Ok(grid)
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let model = ZonationModel::load(&args.model)
        .with_context(|| format!("loading model {}", args.model.display()))?;
    let points: PointSet = read_json(&args.points)?;
    info!(
        "Validating {} points against a {}-tier model over {} epoch(s)",
        points.len(),
        model.num_tiers(),
        args.epochs.len()
    );

    let mut reports: BTreeMap<String, ValidationReport> = BTreeMap::new();
    for (name, path) in &args.epochs {
        let grid = load_grid(path)?;
        let report = validate_points(&model, &grid, &points, args.threshold)
            .with_context(|| format!("validating epoch '{name}'"))?;
        info!(
            "{name}: {} scored, {} skipped, sensitivity {}, specificity {}, TSS {}",
            report.scored,
            report.skipped,
            fmt_rate(report.sensitivity),
            fmt_rate(report.specificity),
            fmt_rate(report.true_skill),
        );
        reports.insert(name.clone(), report);
    }

    if let Some(parent) = args.output.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    fs::write(&args.output, serde_json::to_string_pretty(&reports)?)
        .with_context(|| format!("writing {}", args.output.display()))?;
    info!("Wrote {}", args.output.display());
    Ok(())
}

fn fmt_rate(v: Option<f64>) -> String {
    v.map_or_else(|| "n/a".to_string(), |x| format!("{x:.3}"))
}
