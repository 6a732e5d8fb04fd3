//! Diagnostic visualizer: renders a risk-tier grid JSON to a PNG debug image.
//! Not a cartographic layer; north is up, no-data is grey.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use zonation_core::{RiskGrid, RiskTier};

#[derive(Parser, Debug)]
#[command(name = "visualize", about = "Render a risk-tier grid to PNG")]
struct Args {
    /// Risk grid JSON written by zonate.
    #[arg(short, long)]
    input: PathBuf,

    /// Output PNG path. Defaults to the input path with a .png extension.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Pixels per grid cell.
    #[arg(short, long, default_value_t = 4)]
    scale: u32,

    /// Number of tiers in the palette. Defaults to the highest tier present.
    #[arg(short = 'k', long)]
    tiers: Option<RiskTier>,
}

// ── Colour helpers ────────────────────────────────────────────────────────────

const NO_DATA: [u8; 3] = [160, 160, 160];

/// Tier → green (lowest) through yellow to red (highest).
fn tier_color(tier: RiskTier, num_tiers: RiskTier) -> [u8; 3] {
    let t = if num_tiers <= 1 {
        1.0
    } else {
        (tier.saturating_sub(1) as f32 / (num_tiers - 1) as f32).clamp(0.0, 1.0)
    };
    if t < 0.5 {
        let u = t * 2.0;
        [(40.0 + 215.0 * u) as u8, (160.0 + 60.0 * u) as u8, 60]
    } else {
        let u = (t - 0.5) * 2.0;
        [(255.0 - 35.0 * u) as u8, (220.0 - 180.0 * u) as u8, (60.0 - 20.0 * u) as u8]
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let text = fs::read_to_string(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let grid: RiskGrid = serde_json::from_str(&text)
        .with_context(|| format!("parsing {}", args.input.display()))?;
    grid.validate().with_context(|| format!("invalid risk grid {}", args.input.display()))?;
    if args.scale == 0 {
        bail!("--scale must be at least 1");
    }

    let num_tiers = args
        .tiers
        .or_else(|| grid.cells.iter().flatten().copied().max())
        .unwrap_or(1);

    let s = args.scale;
    let mut img = image::RgbImage::new(grid.width as u32 * s, grid.height as u32 * s);
    for r in 0..grid.height {
        // Row 0 is the southern edge; image row 0 is the top.
        let y0 = (grid.height - 1 - r) as u32 * s;
        for c in 0..grid.width {
            let rgb = grid.get(r, c).map_or(NO_DATA, |t| tier_color(t, num_tiers));
            let x0 = c as u32 * s;
            for dy in 0..s {
                for dx in 0..s {
                    img.put_pixel(x0 + dx, y0 + dy, image::Rgb(rgb));
                }
            }
        }
    }

    let out = args.output.unwrap_or_else(|| args.input.with_extension("png"));
    img.save(&out).with_context(|| format!("saving {}", out.display()))?;
    info!("Wrote {} ({} tiers)", out.display(), num_tiers);
    Ok(())
}
