//! Per-feature standardization fitted once on the merged training set.
//!
//! `ScalingParameters` are immutable after `fit`; the same instance scales
//! training rows, raster cells, validation points and response-curve inputs.

use serde::{Deserialize, Serialize};

use crate::error::{invalid, Result};
use crate::features::{FeatureMatrix, Schema};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingParameters {
    schema: Schema,
    /// Training mean per feature (raw units).
    center: Vec<f64>,
    /// Training sample standard deviation per feature (raw units).
    scale: Vec<f64>,
    /// Training minimum per feature (raw units).
    min: Vec<f64>,
    /// Training maximum per feature (raw units).
    max: Vec<f64>,
}

impl ScalingParameters {
    /// Fit center (mean) and scale (sample standard deviation, n − 1) per column.
    ///
    /// Rows with a missing value are ignored. Fails with `InvalidInput` if fewer
    /// than two complete rows remain or a column has zero variance.
    pub fn fit(samples: &FeatureMatrix) -> Result<Self> {
        let rows = samples.complete_indices();
        if rows.len() < 2 {
            return Err(invalid(format!(
                "scaling needs at least 2 complete samples, got {}",
                rows.len()
            )));
        }
        let n = rows.len() as f64;
        let dim = samples.dim();
        let mut center = vec![0.0; dim];
        let mut scale = vec![0.0; dim];
        let mut min = vec![f64::INFINITY; dim];
        let mut max = vec![f64::NEG_INFINITY; dim];

        for j in 0..dim {
            let mean = rows.iter().map(|&i| samples.get(i, j)).sum::<f64>() / n;
            let var = rows
                .iter()
                .map(|&i| {
                    let d = samples.get(i, j) - mean;
                    d * d
                })
                .sum::<f64>()
                / (n - 1.0);
            let sd = var.sqrt();
            if !(sd.is_finite() && sd > 0.0) {
                return Err(invalid(format!(
                    "predictor '{}' has zero variance; drop constant columns before fitting",
                    samples.schema().names()[j]
                )));
            }
            for &i in &rows {
                let v = samples.get(i, j);
                min[j] = min[j].min(v);
                max[j] = max[j].max(v);
            }
            center[j] = mean;
            scale[j] = sd;
        }

        Ok(Self { schema: samples.schema().clone(), center, scale, min, max })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn center(&self) -> &[f64] {
        &self.center
    }

    pub fn scale(&self) -> &[f64] {
        &self.scale
    }

    /// Training range `(min, max)` of one feature, raw units.
    pub fn range(&self, feature: usize) -> (f64, f64) {
        (self.min[feature], self.max[feature])
    }

    /// `(x − center) / scale`, elementwise. Missing values stay missing.
    pub fn transform(&self, batch: &FeatureMatrix) -> Result<FeatureMatrix> {
        self.schema.ensure_matches(batch.schema())?;
        let dim = self.center.len();
        let data = batch
            .data()
            .iter()
            .enumerate()
            .map(|(k, &x)| {
                let j = k % dim;
                (x - self.center[j]) / self.scale[j]
            })
            .collect();
        FeatureMatrix::new(self.schema.clone(), data)
    }

    /// Scale a single raw vector in place.
    pub fn transform_row(&self, row: &mut [f64]) {
        for (j, v) in row.iter_mut().enumerate() {
            *v = (*v - self.center[j]) / self.scale[j];
        }
    }

    /// `x · scale + center`, elementwise.
    pub fn inverse_transform(&self, batch: &FeatureMatrix) -> Result<FeatureMatrix> {
        self.schema.ensure_matches(batch.schema())?;
        let dim = self.center.len();
        let data = batch
            .data()
            .iter()
            .enumerate()
            .map(|(k, &z)| {
                let j = k % dim;
                z * self.scale[j] + self.center[j]
            })
            .collect();
        FeatureMatrix::new(self.schema.clone(), data)
    }

    pub(crate) fn is_consistent(&self) -> bool {
        let d = self.schema.len();
        self.center.len() == d
            && self.scale.len() == d
            && self.min.len() == d
            && self.max.len() == d
            && self.scale.iter().all(|s| s.is_finite() && *s > 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn batch(rows: &[Vec<f64>]) -> FeatureMatrix {
        FeatureMatrix::from_rows(Schema::new(["a", "b"]).unwrap(), rows).unwrap()
    }

    #[test]
    fn fit_uses_sample_standard_deviation() {
        let m = batch(&[vec![1.0, 10.0], vec![2.0, 20.0], vec![3.0, 30.0]]);
        let p = ScalingParameters::fit(&m).unwrap();
        assert_abs_diff_eq!(p.center()[0], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p.center()[1], 20.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p.scale()[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p.scale()[1], 10.0, epsilon = 1e-12);
        assert_eq!(p.range(1), (10.0, 30.0));
    }

    #[test]
    fn fit_rejects_constant_column_and_tiny_batches() {
        let constant = batch(&[vec![1.0, 5.0], vec![2.0, 5.0], vec![3.0, 5.0]]);
        assert!(ScalingParameters::fit(&constant).is_err());
        let single = batch(&[vec![1.0, 5.0], vec![f64::NAN, 6.0]]);
        assert!(ScalingParameters::fit(&single).is_err());
    }

    #[test]
    fn round_trip_reproduces_scaled_batch() {
        let m = batch(&[vec![0.3, -4.0], vec![1.7, 2.5], vec![9.1, 0.0], vec![-2.2, 8.8]]);
        let p = ScalingParameters::fit(&m).unwrap();
        let z = p.transform(&m).unwrap();
        let back = p.transform(&p.inverse_transform(&z).unwrap()).unwrap();
        for (a, b) in z.data().iter().zip(back.data()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-10);
        }
    }

    #[test]
    fn inverse_of_scaled_center_returns_center() {
        let m = batch(&[vec![1.0, 4.0], vec![5.0, 6.0], vec![3.0, 11.0]]);
        let p = ScalingParameters::fit(&m).unwrap();
        let centers = batch(&[p.center().to_vec()]);
        let z = p.transform(&centers).unwrap();
        assert_abs_diff_eq!(z.row(0)[0], 0.0, epsilon = 1e-12);
        let raw = p.inverse_transform(&z).unwrap();
        assert_abs_diff_eq!(raw.row(0)[0], p.center()[0], epsilon = 1e-12);
        assert_abs_diff_eq!(raw.row(0)[1], p.center()[1], epsilon = 1e-12);
    }

    #[test]
    fn transform_keeps_missing_and_checks_schema() {
        let m = batch(&[vec![1.0, 4.0], vec![5.0, 6.0]]);
        let p = ScalingParameters::fit(&m).unwrap();
        let z = p.transform(&batch(&[vec![f64::NAN, 4.0]])).unwrap();
        assert!(z.row(0)[0].is_nan());

        let other = FeatureMatrix::from_rows(Schema::new(["b", "a"]).unwrap(), &[vec![1.0, 2.0]])
            .unwrap();
        assert!(p.transform(&other).is_err());
    }
}
