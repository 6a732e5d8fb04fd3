//! Multi-band environmental grid as produced by the grid loader.
//!
//! Bands are aligned by predictor name. Values are f32, row-major, row 0 at
//! `min_lat`. No-data cells hold NaN and serialize as JSON `null`.

use serde::{Deserialize, Serialize};

use crate::error::{invalid, Result, ZonationError};
use crate::features::{FeatureMatrix, Schema};
use crate::points::LatLon;

fn null_as_nan_vec<'de, D: serde::Deserializer<'de>>(
    d: D,
) -> std::result::Result<Vec<f32>, D::Error> {
    let v: Vec<Option<f32>> = Vec::deserialize(d)?;
    Ok(v.into_iter().map(|x| x.unwrap_or(f32::NAN)).collect())
}

/// One named predictor layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub name: String,
    #[serde(deserialize_with = "null_as_nan_vec")]
    pub data: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvGrid {
    pub width: usize,
    pub height: usize,
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
    pub bands: Vec<Band>,
}

impl EnvGrid {
    /// Build a grid and check that every band covers `width × height` cells
    /// and band names form a valid schema.
    pub fn new(
        width: usize,
        height: usize,
        min_lon: f64,
        max_lon: f64,
        min_lat: f64,
        max_lat: f64,
        bands: Vec<Band>,
    ) -> Result<Self> {
        let grid = Self { width, height, min_lon, max_lon, min_lat, max_lat, bands };
        grid.validate()?;
        Ok(grid)
    }

    /// Check shape, bounds and band names. Call after deserializing.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(invalid("grid has zero cells"));
        }
        if !(self.max_lon > self.min_lon && self.max_lat > self.min_lat) {
            return Err(invalid("grid bounds are empty or inverted"));
        }
        self.schema()?;
        let n = self.n_cells();
        for band in &self.bands {
            if band.data.len() != n {
                return Err(invalid(format!(
                    "band '{}' has {} cells, grid has {n}",
                    band.name,
                    band.data.len()
                )));
            }
        }
        Ok(())
    }

    pub fn schema(&self) -> Result<Schema> {
        Schema::new(self.bands.iter().map(|b| b.name.clone()))
    }

    pub fn n_cells(&self) -> usize {
        self.width * self.height
    }

    #[inline]
    pub fn cell_index(&self, row: usize, col: usize) -> usize {
        row * self.width + col
    }

    pub fn cell_size(&self) -> (f64, f64) {
        (
            (self.max_lon - self.min_lon) / self.width as f64,
            (self.max_lat - self.min_lat) / self.height as f64,
        )
    }

    /// Centre coordinate of a cell.
    pub fn cell_center(&self, row: usize, col: usize) -> LatLon {
        let (dx, dy) = self.cell_size();
        LatLon::new(
            self.min_lat + (row as f64 + 0.5) * dy,
            self.min_lon + (col as f64 + 0.5) * dx,
        )
    }

    /// `(row, col)` of the cell containing `p`, or None outside the bounds.
    /// Points on the max edge belong to the last row/column.
    pub fn cell_at(&self, p: LatLon) -> Option<(usize, usize)> {
        if !(p.lon >= self.min_lon
            && p.lon <= self.max_lon
            && p.lat >= self.min_lat
            && p.lat <= self.max_lat)
        {
            return None;
        }
        let (dx, dy) = self.cell_size();
        let col = (((p.lon - self.min_lon) / dx).floor() as usize).min(self.width - 1);
        let row = (((p.lat - self.min_lat) / dy).floor() as usize).min(self.height - 1);
        Some((row, col))
    }

    /// Band index of each `schema` predictor; a name with no band is a `SchemaMismatch`.
    fn band_order(&self, schema: &Schema) -> Result<Vec<usize>> {
        let own = self.schema()?;
        let order: Option<Vec<usize>> = schema.names().iter().map(|n| own.index_of(n)).collect();
        order.ok_or_else(|| ZonationError::SchemaMismatch {
            expected: schema.names().to_vec(),
            found: own.names().to_vec(),
        })
    }

    /// Every cell as a feature row, aligned by name to `schema`.
    pub fn features(&self, schema: &Schema) -> Result<FeatureMatrix> {
        let order = self.band_order(schema)?;
        let mut data = Vec::with_capacity(self.n_cells() * order.len());
        for cell in 0..self.n_cells() {
            data.extend(order.iter().map(|&b| self.bands[b].data[cell] as f64));
        }
        FeatureMatrix::new(schema.clone(), data)
    }

    /// Features at point locations. Points outside the grid get a missing row.
    pub fn extract(&self, points: &[LatLon], schema: &Schema) -> Result<FeatureMatrix> {
        let order = self.band_order(schema)?;
        let mut data = Vec::with_capacity(points.len() * order.len());
        for &p in points {
            match self.cell_at(p) {
                Some((r, c)) => {
                    let cell = self.cell_index(r, c);
                    data.extend(order.iter().map(|&b| self.bands[b].data[cell] as f64));
                }
                None => data.extend(std::iter::repeat(f64::NAN).take(order.len())),
            }
        }
        FeatureMatrix::new(schema.clone(), data)
    }

    /// Indices of cells where every band in `schema` is finite.
    pub fn valid_cells(&self, schema: &Schema) -> Result<Vec<usize>> {
        let order = self.band_order(schema)?;
        Ok((0..self.n_cells())
            .filter(|&cell| order.iter().all(|&b| self.bands[b].data[cell].is_finite()))
            .collect())
    }
}
