//! Pipeline orchestrator: training stages in order, then per-epoch application.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::cluster::{RiskTier, RiskTierClusterer};
use crate::error::{insufficient, Result};
use crate::features::FeatureMatrix;
use crate::grid::EnvGrid;
use crate::model::ZonationModel;
use crate::points::{ABSENCE, PRESENCE};
use crate::pseudo_absence::{PseudoAbsenceSampler, DEFAULT_DISTANCE_THRESHOLD};
use crate::quality::{evaluate, QualityReport};
use crate::raster::RiskGrid;
use crate::scaler::ScalingParameters;
use crate::smooth::{smooth, DEFAULT_WINDOW};
use crate::som::{SomConfig, SomTrainer};

// ── Configuration ─────────────────────────────────────────────────────────────

/// Everything a zonation run needs besides its data.
/// Missing fields in a config file take the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub seed: u64,
    /// Predictors to train on. Empty means every band of the first epoch grid.
    pub predictors: Vec<String>,
    /// Default 6 × 6.
    pub som_rows: usize,
    pub som_cols: usize,
    /// Default 100.
    pub iterations: usize,
    /// Default (0.05, 0.01).
    pub learning_rate: (f64, f64),
    /// Default None: from the 2/3 node-distance quantile down to 0.
    pub radius: Option<(f64, f64)>,
    /// Default 3.
    pub num_tiers: usize,
    /// Predictor whose prototype mean orders the tiers.
    pub ordering_feature: String,
    /// Default 0.2, raw predictor units.
    pub pseudo_absence_threshold: f64,
    /// Background cells drawn from the first epoch grid when no background
    /// point set is supplied. Default 1000.
    pub background_samples: usize,
    /// Majority-filter window; None disables smoothing. Default 3.
    pub smoothing_window: Option<usize>,
    /// Lowest tier counted as a positive prediction in validation. Default 2.
    pub validation_threshold: RiskTier,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            predictors: Vec::new(),
            som_rows: 6,
            som_cols: 6,
            iterations: 100,
            learning_rate: (0.05, 0.01),
            radius: None,
            num_tiers: 3,
            ordering_feature: "suitability".to_string(),
            pseudo_absence_threshold: DEFAULT_DISTANCE_THRESHOLD,
            background_samples: 1000,
            smoothing_window: Some(DEFAULT_WINDOW),
            validation_threshold: 2,
        }
    }
}

impl PipelineConfig {
    pub fn som_config(&self) -> SomConfig {
        SomConfig {
            rows: self.som_rows,
            cols: self.som_cols,
            iterations: self.iterations,
            learning_rate: self.learning_rate,
            radius: self.radius,
            seed: self.seed,
        }
    }
}

// ── Outputs ───────────────────────────────────────────────────────────────────

/// Full output of a training run.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub model: ZonationModel,
    pub quality: QualityReport,
    /// BMU per merged training row: presences, then pseudo-absences, then absences.
    pub bmus: Vec<usize>,
    /// 1 presence, 0 pseudo- or true absence, aligned with `bmus`.
    pub labels: Vec<u8>,
    /// Mean quantization error after each SOM iteration.
    pub history: Vec<f64>,
    pub pseudo_absence_count: usize,
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

pub struct ZonationPipeline {
    config: PipelineConfig,
}

impl ZonationPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Train a frozen model.
    ///
    /// The schema is taken from `presence`; `background` and `absence` are
    /// aligned to it by name. Rows with missing predictors are dropped.
    pub fn train(
        &self,
        presence: &FeatureMatrix,
        background: Option<&FeatureMatrix>,
        absence: Option<&FeatureMatrix>,
    ) -> Result<TrainingOutcome> {
        let cfg = &self.config;
        let schema = presence.schema();

        // Stage 1: labelled training set.
        let presence = presence.complete_rows();
        if presence.is_empty() {
            return Err(insufficient("no presence record has complete predictors"));
        }
        let pseudo = match background {
            Some(bg) => {
                let bg = bg.align_to(schema)?;
                let accepted = PseudoAbsenceSampler::new(cfg.pseudo_absence_threshold)
                    .select(&presence, &bg)?;
                bg.select(&accepted)
            }
            None => FeatureMatrix::empty(schema.clone()),
        };
        let absence = match absence {
            Some(a) => a.align_to(schema)?.complete_rows(),
            None => FeatureMatrix::empty(schema.clone()),
        };
        if pseudo.is_empty() && absence.is_empty() {
            warn!("training set has no pseudo-absences or absences; presences only");
        }
        info!(
            "training set: {} presence, {} pseudo-absence, {} absence",
            presence.n_rows(),
            pseudo.n_rows(),
            absence.n_rows()
        );

        let merged = FeatureMatrix::concat(&[&presence, &pseudo, &absence])?;
        let labels: Vec<u8> = std::iter::repeat(PRESENCE)
            .take(presence.n_rows())
            .chain(std::iter::repeat(ABSENCE).take(pseudo.n_rows() + absence.n_rows()))
            .collect();

        // Stage 2: scaling, fitted once.
        let scaling = ScalingParameters::fit(&merged)?;
        let scaled = scaling.transform(&merged)?;

        // Stage 3: SOM.
        let som = SomTrainer::new(cfg.som_config()).train(&scaled)?;

        // Stage 4: tiers.
        let tiers = RiskTierClusterer::new(cfg.num_tiers, cfg.ordering_feature.clone())
            .assign_tiers(&som.codebook, schema)?;

        // Stage 5: diagnostics.
        let quality = evaluate(&som.codebook, &scaled, &som.bmus)?;
        info!(
            "quality: QE {:.4}, TE {:?}, silhouette {:?}, Davies-Bouldin {:?}",
            quality.quantization_error,
            quality.topographic_error,
            quality.silhouette,
            quality.separation_index
        );

        let model = ZonationModel::new(scaling, som.codebook, tiers)?;
        Ok(TrainingOutcome {
            model,
            quality,
            bmus: som.bmus,
            labels,
            history: som.history,
            pseudo_absence_count: pseudo.n_rows(),
        })
    }

    /// Apply `model` to an epoch grid with the configured smoothing window.
    pub fn apply(&self, model: &ZonationModel, grid: &EnvGrid) -> Result<RiskGrid> {
        apply_to_grid(model, grid, self.config.smoothing_window)
    }
}

/// Predict every cell of `grid`, then smooth with `window` if given.
///
/// The one operation run per epoch; bands are matched to the model's
/// predictors by name.
pub fn apply_to_grid(
    model: &ZonationModel,
    grid: &EnvGrid,
    window: Option<usize>,
) -> Result<RiskGrid> {
    grid.validate()?;
    let raw = grid.features(model.schema())?;
    let tiers = model.predict_raw(&raw)?;
    let risk = RiskGrid::like(grid, tiers)?;
    let risk = match window {
        Some(w) => smooth(&risk, w)?,
        None => risk,
    };
    info!(
        "risk grid {}x{}: {:.1}% cells with a tier",
        risk.width,
        risk.height,
        risk.coverage() * 100.0
    );
    Ok(risk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Schema;
    use crate::grid::Band;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn schema() -> Schema {
        Schema::new(["suitability", "settlement"]).unwrap()
    }

    /// 50 presences at high suitability/settlement, 200 uniform background
    /// rows, 30 absences at low suitability.
    fn scenario() -> (FeatureMatrix, FeatureMatrix, FeatureMatrix) {
        let mut rng = StdRng::seed_from_u64(7);
        let mut draw = |n: usize, s: (f64, f64), p: (f64, f64)| -> FeatureMatrix {
            let rows: Vec<Vec<f64>> = (0..n)
                .map(|_| vec![rng.gen_range(s.0..s.1), rng.gen_range(p.0..p.1)])
                .collect();
            FeatureMatrix::from_rows(schema(), &rows).unwrap()
        };
        let presence = draw(50, (0.6, 1.0), (0.5, 1.0));
        let background = draw(200, (0.0, 1.0), (0.0, 1.0));
        let absence = draw(30, (0.0, 0.3), (0.0, 0.6));
        (presence, background, absence)
    }

    fn config() -> PipelineConfig {
        PipelineConfig { iterations: 50, ..PipelineConfig::default() }
    }

    #[test]
    fn scenario_training() {
        let (presence, background, absence) = scenario();
        let out = ZonationPipeline::new(config())
            .train(&presence, Some(&background), Some(&absence))
            .unwrap();

        assert!(out.pseudo_absence_count > 0 && out.pseudo_absence_count < 200);
        assert_eq!(out.labels.len(), 50 + out.pseudo_absence_count + 30);
        assert_eq!(out.bmus.len(), out.labels.len());
        assert_eq!(out.model.codebook().n_nodes(), 36);
        assert_eq!(out.model.num_tiers(), 3);

        // Quantization error settles as learning rate and radius decay.
        assert_eq!(out.history.len(), 50);
        let checkpoints: Vec<f64> = out.history.iter().skip(9).step_by(10).copied().collect();
        for w in checkpoints.windows(2) {
            assert!(w[1] <= w[0] * 1.02, "QE rose between checkpoints: {checkpoints:?}");
        }
        assert!(out.history[49] < out.history[0]);

        let te = out.quality.topographic_error.unwrap();
        assert!((0.0..=1.0).contains(&te));

        let risk_at = |s: f64, p: f64| -> f64 {
            let rows: Vec<Vec<f64>> = (0..10).map(|k| vec![s + 0.005 * k as f64, p]).collect();
            let batch = FeatureMatrix::from_rows(schema(), &rows).unwrap();
            let tiers = out.model.predict_raw(&batch).unwrap();
            tiers.iter().map(|t| t.unwrap() as f64).sum::<f64>() / tiers.len() as f64
        };
        let high = risk_at(0.9, 0.85);
        let low = risk_at(0.05, 0.2);
        assert!(high > low, "mean tier high {high} vs low {low}");
    }

    #[test]
    fn training_is_deterministic() {
        let (presence, background, absence) = scenario();
        let pipeline = ZonationPipeline::new(PipelineConfig { iterations: 10, ..config() });
        let a = pipeline.train(&presence, Some(&background), Some(&absence)).unwrap();
        let b = pipeline.train(&presence, Some(&background), Some(&absence)).unwrap();
        assert_eq!(a.model, b.model);
        assert_eq!(a.bmus, b.bmus);
        assert_eq!(a.history, b.history);
    }

    #[test]
    fn single_node_map_still_trains() {
        let (presence, background, absence) = scenario();
        let cfg =
            PipelineConfig { som_rows: 1, som_cols: 1, num_tiers: 1, iterations: 5, ..config() };
        let out = ZonationPipeline::new(cfg)
            .train(&presence, Some(&background), Some(&absence))
            .unwrap();
        assert_eq!(out.model.codebook().n_nodes(), 1);
        assert!(out.bmus.iter().all(|&b| b == 0));
        assert_eq!(out.quality.topographic_error, None);
        assert_eq!(out.quality.silhouette, None);
        assert!(out.quality.quantization_error.is_finite());
    }

    #[test]
    fn missing_presence_is_insufficient() {
        let presence = FeatureMatrix::from_rows(schema(), &[vec![f64::NAN, 1.0]]).unwrap();
        let (_, background, _) = scenario();
        let err = ZonationPipeline::new(config()).train(&presence, Some(&background), None);
        assert!(matches!(err, Err(crate::error::ZonationError::InsufficientData(_))));
    }

    #[test]
    fn background_with_other_schema_rejected() {
        let (presence, _, _) = scenario();
        let rain = Schema::new(["rain", "settlement"]).unwrap();
        let other = FeatureMatrix::from_rows(rain, &[vec![0.1, 0.2]]).unwrap();
        let err = ZonationPipeline::new(config()).train(&presence, Some(&other), None);
        assert!(matches!(err, Err(crate::error::ZonationError::SchemaMismatch { .. })));
    }

    #[test]
    fn apply_covers_grid_and_keeps_no_data() {
        let (presence, background, absence) = scenario();
        let pipeline = ZonationPipeline::new(PipelineConfig { iterations: 10, ..config() });
        let model = pipeline.train(&presence, Some(&background), Some(&absence)).unwrap().model;

        // 8×8 grid with a gradient in both predictors; bands listed in reverse order.
        let (w, h) = (8usize, 8usize);
        let mut suit = Vec::with_capacity(w * h);
        let mut settle = Vec::with_capacity(w * h);
        for r in 0..h {
            for c in 0..w {
                suit.push(c as f32 / (w - 1) as f32);
                settle.push(r as f32 / (h - 1) as f32);
            }
        }
        // One isolated hole, kept as no data through smoothing.
        suit[3 * w + 3] = f32::NAN;
        let grid = EnvGrid::new(
            w,
            h,
            0.0,
            8.0,
            0.0,
            8.0,
            vec![
                Band { name: "settlement".into(), data: settle },
                Band { name: "suitability".into(), data: suit },
            ],
        )
        .unwrap();

        let raw = apply_to_grid(&model, &grid, None).unwrap();
        assert_eq!(raw.cells.len(), w * h);
        assert_eq!(raw.get(3, 3), None);
        assert_eq!(raw.cells.iter().filter(|c| c.is_none()).count(), 1);

        let smoothed = pipeline.apply(&model, &grid).unwrap();
        assert_eq!(smoothed.get(3, 3), None);
        assert_eq!(smoothed.cells.iter().filter(|c| c.is_none()).count(), 1);
        assert_eq!((smoothed.width, smoothed.height), (w, h));
        assert_eq!(smoothed.max_lat, 8.0);
        assert!(smoothed.cells.iter().flatten().all(|&t| (1..=3).contains(&t)));
    }

    #[test]
    fn partial_config_takes_defaults() {
        let cfg: PipelineConfig = serde_json::from_str(r#"{"seed": 9, "num_tiers": 4}"#).unwrap();
        assert_eq!(cfg.seed, 9);
        assert_eq!(cfg.num_tiers, 4);
        assert_eq!(cfg.som_rows, 6);
        assert_eq!(cfg.smoothing_window, Some(3));
    }
}
