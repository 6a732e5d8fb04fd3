//! Risk-tier raster aligned 1:1 with an environmental grid.

use serde::{Deserialize, Serialize};

use crate::cluster::RiskTier;
use crate::error::{invalid, Result};
use crate::grid::EnvGrid;
use crate::points::LatLon;

/// Sentinel written for no-data cells when exporting a numeric raster.
pub const DEFAULT_NODATA: f32 = -9999.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskGrid {
    pub width: usize,
    pub height: usize,
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
    /// Row-major, row 0 at `min_lat`. `None` is no data.
    pub cells: Vec<Option<RiskTier>>,
}

impl RiskGrid {
    /// A grid with the shape and bounds of `env`, filled from `cells`.
    pub fn like(env: &EnvGrid, cells: Vec<Option<RiskTier>>) -> Result<Self> {
        if cells.len() != env.n_cells() {
            return Err(invalid(format!(
                "{} tiers for a grid of {} cells",
                cells.len(),
                env.n_cells()
            )));
        }
        Ok(Self {
            width: env.width,
            height: env.height,
            min_lon: env.min_lon,
            max_lon: env.max_lon,
            min_lat: env.min_lat,
            max_lat: env.max_lat,
            cells,
        })
    }

    /// Unit-bounds grid, mostly for tests and synthetic inputs.
    pub fn from_cells(width: usize, height: usize, cells: Vec<Option<RiskTier>>) -> Result<Self> {
        if cells.len() != width * height {
            return Err(invalid(format!("{} cells for a {width}x{height} grid", cells.len())));
        }
        Ok(Self { width, height, min_lon: 0.0, max_lon: 1.0, min_lat: 0.0, max_lat: 1.0, cells })
    }

    /// Check shape and bounds. Call after deserializing.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(invalid("risk grid has zero cells"));
        }
        if self.cells.len() != self.width * self.height {
            return Err(invalid(format!(
                "{} cells for a {}x{} risk grid",
                self.cells.len(),
                self.width,
                self.height
            )));
        }
        if !(self.max_lon > self.min_lon && self.max_lat > self.min_lat) {
            return Err(invalid("risk grid bounds are empty or inverted"));
        }
        Ok(())
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Option<RiskTier> {
        self.cells[row * self.width + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, tier: Option<RiskTier>) {
        self.cells[row * self.width + col] = tier;
    }

    /// Tier of the cell containing `p`; None outside the grid, on no data,
    /// or when the grid fails `validate`.
    pub fn sample(&self, p: LatLon) -> Option<RiskTier> {
        if self.validate().is_err() {
            return None;
        }
        if !(p.lon >= self.min_lon
            && p.lon <= self.max_lon
            && p.lat >= self.min_lat
            && p.lat <= self.max_lat)
        {
            return None;
        }
        let dx = (self.max_lon - self.min_lon) / self.width as f64;
        let dy = (self.max_lat - self.min_lat) / self.height as f64;
        let col = (((p.lon - self.min_lon) / dx).floor() as usize).min(self.width - 1);
        let row = (((p.lat - self.min_lat) / dy).floor() as usize).min(self.height - 1);
        self.get(row, col)
    }

    /// Single-band numeric raster for the grid writer.
    pub fn to_raster(&self, nodata: f32) -> Vec<f32> {
        self.cells
            .iter()
            .map(|c| c.map_or(nodata, |t| t as f32))
            .collect()
    }

    /// Cell count per tier; index 0 counts no-data cells.
    pub fn tier_counts(&self, num_tiers: RiskTier) -> Vec<usize> {
        let mut counts = vec![0usize; num_tiers as usize + 1];
        for c in &self.cells {
            match c {
                Some(t) if (*t as usize) < counts.len() => counts[*t as usize] += 1,
                Some(_) => {}
                None => counts[0] += 1,
            }
        }
        counts
    }

    /// Fraction of cells carrying a tier.
    pub fn coverage(&self) -> f64 {
        if self.cells.is_empty() {
            return 0.0;
        }
        self.cells.iter().filter(|c| c.is_some()).count() as f64 / self.cells.len() as f64
    }
}
