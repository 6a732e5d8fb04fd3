//! Pseudo-absence selection from a background pool.
//!
//! A background row is trusted as an absence only when its nearest presence
//! in raw (unscaled) feature space is farther than the distance threshold.

use log::debug;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{insufficient, invalid, Result};
use crate::features::{squared_euclidean, FeatureMatrix};
use crate::grid::EnvGrid;
use crate::parallel::map_indices;

/// Default raw-unit distance a background row must exceed.
pub const DEFAULT_DISTANCE_THRESHOLD: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PseudoAbsenceSampler {
    pub distance_threshold: f64,
}

impl Default for PseudoAbsenceSampler {
    fn default() -> Self {
        Self { distance_threshold: DEFAULT_DISTANCE_THRESHOLD }
    }
}

impl PseudoAbsenceSampler {
    pub fn new(distance_threshold: f64) -> Self {
        Self { distance_threshold }
    }

    /// Indices (into `background`) of rows accepted as pseudo-absences.
    ///
    /// Rows with a missing value on either side are ignored. Fails with
    /// `InsufficientData` if either side has no complete row.
    pub fn select(
        &self,
        presence: &FeatureMatrix,
        background: &FeatureMatrix,
    ) -> Result<Vec<usize>> {
        presence.schema().ensure_matches(background.schema())?;
        if !(self.distance_threshold.is_finite() && self.distance_threshold >= 0.0) {
            return Err(invalid(format!(
                "distance threshold must be a non-negative number, got {}",
                self.distance_threshold
            )));
        }
        let presence = presence.complete_rows();
        if presence.is_empty() {
            return Err(insufficient("no complete presence rows"));
        }
        let candidates = background.complete_indices();
        if candidates.is_empty() {
            return Err(insufficient("no complete background rows"));
        }

        let threshold_sq = self.distance_threshold * self.distance_threshold;
        let nearest_sq = map_indices(candidates.len(), |k| {
            nearest_squared_distance(&presence, background.row(candidates[k]))
        });
        let accepted: Vec<usize> = candidates
            .iter()
            .zip(&nearest_sq)
            .filter(|(_, d)| **d > threshold_sq)
            .map(|(&i, _)| i)
            .collect();

        debug!(
            "pseudo-absence: {} of {} background rows accepted (threshold {})",
            accepted.len(),
            candidates.len(),
            self.distance_threshold
        );
        Ok(accepted)
    }
}

fn nearest_squared_distance(set: &FeatureMatrix, x: &[f64]) -> f64 {
    set.rows()
        .map(|row| squared_euclidean(row, x))
        .fold(f64::INFINITY, f64::min)
}

/// Draw `n` distinct random cells with complete predictor values from `grid`.
///
/// Returns the cell indices (sorted) and their raw features in `grid`'s own
/// band order. If fewer than `n` valid cells exist, all of them are returned.
pub fn sample_background(
    grid: &EnvGrid,
    n: usize,
    seed: u64,
) -> Result<(Vec<usize>, FeatureMatrix)> {
    let schema = grid.schema()?;
    let valid = grid.valid_cells(&schema)?;
    if valid.is_empty() {
        return Err(insufficient("grid has no cell with complete predictor values"));
    }
    let mut rng = StdRng::seed_from_u64(seed ^ 0xB4C6_0A3E_91D2_7F55);
    let mut picked: Vec<usize> = if n >= valid.len() {
        valid
    } else {
        sample(&mut rng, valid.len(), n).into_iter().map(|k| valid[k]).collect()
    };
    picked.sort_unstable();

    let all = grid.features(&schema)?;
    Ok((picked.clone(), all.select(&picked)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Schema;
    use crate::grid::Band;

    fn batch(rows: &[Vec<f64>]) -> FeatureMatrix {
        FeatureMatrix::from_rows(Schema::new(["a", "b"]).unwrap(), rows).unwrap()
    }

    #[test]
    fn accepts_only_distant_background() {
        let presence = batch(&[vec![0.0, 0.0], vec![1.0, 1.0]]);
        let background = batch(&[
            vec![0.1, 0.0],  // 0.1 from a presence → rejected
            vec![0.5, 0.5],  // ~0.707 → accepted
            vec![f64::NAN, 3.0],
            vec![1.0, 1.2],  // on the threshold → rejected
            vec![5.0, 5.0],
        ]);
        let sampler = PseudoAbsenceSampler::default();
        assert_eq!(sampler.select(&presence, &background).unwrap(), vec![1, 4]);
    }

    #[test]
    fn empty_sides_are_insufficient() {
        let sampler = PseudoAbsenceSampler::default();
        let good = batch(&[vec![0.0, 0.0]]);
        let missing = batch(&[vec![f64::NAN, 0.0]]);
        assert!(matches!(
            sampler.select(&missing, &good),
            Err(crate::error::ZonationError::InsufficientData(_))
        ));
        assert!(matches!(
            sampler.select(&good, &missing),
            Err(crate::error::ZonationError::InsufficientData(_))
        ));
    }

    #[test]
    fn background_sampling_is_seeded_and_skips_nodata() {
        let data: Vec<f32> =
            (0..100).map(|i| if i % 10 == 0 { f32::NAN } else { i as f32 }).collect();
        let grid = EnvGrid::new(10, 10, 0.0, 1.0, 0.0, 1.0, vec![Band { name: "a".into(), data }])
            .unwrap();
        let (cells_a, feats_a) = sample_background(&grid, 20, 7).unwrap();
        let (cells_b, _) = sample_background(&grid, 20, 7).unwrap();
        assert_eq!(cells_a, cells_b);
        assert_eq!(cells_a.len(), 20);
        assert!(cells_a.iter().all(|c| c % 10 != 0));
        assert!(feats_a.data().iter().all(|v| v.is_finite()));

        let (all, _) = sample_background(&grid, 1_000, 7).unwrap();
        assert_eq!(all.len(), 90);
    }
}
