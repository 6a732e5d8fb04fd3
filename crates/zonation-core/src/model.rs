//! The frozen zonation model and its nearest-prototype tier predictor.
//!
//! `ZonationModel` bundles everything later epochs need: predictor schema,
//! scaling parameters, hex codebook and node → tier table. It is an immutable
//! value passed explicitly to every prediction, so several models can be held
//! side by side.

use std::fs;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::cluster::{RiskTier, TierAssignment};
use crate::error::{invalid, Result};
use crate::features::{FeatureMatrix, Schema};
use crate::parallel::map_indices;
use crate::scaler::ScalingParameters;
use crate::som::Codebook;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZonationModel {
    scaling: ScalingParameters,
    codebook: Codebook,
    tiers: TierAssignment,
}

/// Tier response to one predictor swept across its training range while
/// the others sit at their training mean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseCurve {
    pub feature: String,
    /// Raw predictor values, ascending.
    pub values: Vec<f64>,
    pub tiers: Vec<Option<RiskTier>>,
}

impl ZonationModel {
    pub fn new(
        scaling: ScalingParameters,
        codebook: Codebook,
        tiers: TierAssignment,
    ) -> Result<Self> {
        let model = Self { scaling, codebook, tiers };
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<()> {
        if !self.scaling.is_consistent() {
            return Err(invalid("scaling parameters do not match their schema"));
        }
        if self.scaling.schema().len() != self.codebook.dim() {
            return Err(invalid(format!(
                "schema has {} predictors, prototypes have {}",
                self.scaling.schema().len(),
                self.codebook.dim()
            )));
        }
        if self.codebook.weights().len() != self.codebook.n_nodes() * self.codebook.dim() {
            return Err(invalid("prototype table does not match the grid"));
        }
        if !self.tiers.is_consistent(self.codebook.n_nodes()) {
            return Err(invalid("node → tier table is not total over the grid"));
        }
        Ok(())
    }

    pub fn schema(&self) -> &Schema {
        self.scaling.schema()
    }

    pub fn scaling(&self) -> &ScalingParameters {
        &self.scaling
    }

    pub fn codebook(&self) -> &Codebook {
        &self.codebook
    }

    pub fn tiers(&self) -> &TierAssignment {
        &self.tiers
    }

    pub fn num_tiers(&self) -> RiskTier {
        self.tiers.num_tiers()
    }

    /// Tier of one scaled row; None if any value is missing.
    #[inline]
    pub fn predict_row(&self, scaled: &[f64]) -> Option<RiskTier> {
        if scaled.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let (node, _) = self.codebook.best_match(scaled);
        Some(self.tiers.tier_of(node))
    }

    /// Tier per row of an already-scaled batch.
    pub fn predict(&self, scaled: &FeatureMatrix) -> Result<Vec<Option<RiskTier>>> {
        self.schema().ensure_matches(scaled.schema())?;
        Ok(map_indices(scaled.n_rows(), |i| self.predict_row(scaled.row(i))))
    }

    /// Align a raw batch to the model schema by name, scale it, predict.
    pub fn predict_raw(&self, raw: &FeatureMatrix) -> Result<Vec<Option<RiskTier>>> {
        let aligned = raw.align_to(self.schema())?;
        let scaled = self.scaling.transform(&aligned)?;
        self.predict(&scaled)
    }

    /// Sweep `feature` over `steps` evenly spaced values between its training
    /// min and max, all other predictors at their training mean.
    pub fn response_curve(&self, feature: &str, steps: usize) -> Result<ResponseCurve> {
        let j = self
            .schema()
            .index_of(feature)
            .ok_or_else(|| invalid(format!("'{feature}' is not a model predictor")))?;
        if steps < 2 {
            return Err(invalid("a response curve needs at least 2 steps"));
        }
        let (lo, hi) = self.scaling.range(j);
        let values: Vec<f64> = (0..steps)
            .map(|s| lo + (hi - lo) * s as f64 / (steps - 1) as f64)
            .collect();

        let center = self.scaling.center();
        let mut raw = Vec::with_capacity(steps * center.len());
        for &v in &values {
            let mut row = center.to_vec();
            row[j] = v;
            raw.extend(row);
        }
        let batch = FeatureMatrix::new(self.schema().clone(), raw)?;
        let tiers = self.predict_raw(&batch)?;
        Ok(ResponseCurve { feature: feature.to_string(), values, tiers })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and re-validate a persisted model.
    pub fn from_json(json: &str) -> Result<Self> {
        let model: ZonationModel = serde_json::from_str(json)?;
        model.validate()?;
        Ok(model)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.to_json()?)?;
        info!("saved zonation model to {}", path.display());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::RiskTierClusterer;
    use crate::som::{SomConfig, SomTrainer};

    /// Small trained model over a 2-predictor gradient.
    fn model() -> (ZonationModel, FeatureMatrix) {
        let schema = Schema::new(["suit", "pop"]).unwrap();
        let rows: Vec<Vec<f64>> = (0..60)
            .map(|i| {
                let t = i as f64 / 59.0;
                vec![t, 100.0 * (1.0 - t) + (i % 7) as f64]
            })
            .collect();
        let raw = FeatureMatrix::from_rows(schema.clone(), &rows).unwrap();
        let scaling = ScalingParameters::fit(&raw).unwrap();
        let scaled = scaling.transform(&raw).unwrap();
        let cfg = SomConfig { rows: 3, cols: 3, iterations: 15, ..SomConfig::default() };
        let som = SomTrainer::new(cfg)
            .train(&scaled)
            .unwrap();
        let tiers = RiskTierClusterer::new(3, "suit").assign_tiers(&som.codebook, &schema).unwrap();
        (ZonationModel::new(scaling, som.codebook, tiers).unwrap(), raw)
    }

    #[test]
    fn prototypes_predict_their_own_tier() {
        let (m, _) = model();
        let cb = m.codebook();
        let protos = FeatureMatrix::new(m.schema().clone(), cb.weights().to_vec()).unwrap();
        let tiers = m.predict(&protos).unwrap();
        for node in 0..cb.n_nodes() {
            assert_eq!(tiers[node], Some(m.tiers().tier_of(node)));
        }
    }

    #[test]
    fn missing_value_yields_no_data() {
        let (m, _) = model();
        let batch = FeatureMatrix::from_rows(
            m.schema().clone(),
            &[vec![f64::NAN, 0.0], vec![0.0, f64::INFINITY], vec![0.0, 0.0]],
        )
        .unwrap();
        let tiers = m.predict(&batch).unwrap();
        assert_eq!(tiers[0], None);
        assert_eq!(tiers[1], None);
        assert!(tiers[2].is_some());
    }

    #[test]
    fn raw_prediction_aligns_columns_by_name() {
        let (m, raw) = model();
        let swapped_rows: Vec<Vec<f64>> = raw.rows().map(|r| vec![r[1], r[0]]).collect();
        let swapped =
            FeatureMatrix::from_rows(Schema::new(["pop", "suit"]).unwrap(), &swapped_rows).unwrap();
        assert_eq!(m.predict_raw(&raw).unwrap(), m.predict_raw(&swapped).unwrap());
        // Scaled predictions demand the exact schema.
        assert!(m.predict(&swapped).is_err());
    }

    #[test]
    fn response_curve_spans_training_range() {
        let (m, _) = model();
        let curve = m.response_curve("suit", 11).unwrap();
        assert_eq!(curve.values.len(), 11);
        assert!((curve.values[0] - 0.0).abs() < 1e-12);
        assert!((curve.values[10] - 1.0).abs() < 1e-12);
        assert!(curve.tiers.iter().all(|t| t.is_some()));
        assert!(m.response_curve("rain", 5).is_err());
    }

    #[test]
    fn json_round_trip_preserves_predictions() {
        let (m, raw) = model();
        let restored = ZonationModel::from_json(&m.to_json().unwrap()).unwrap();
        assert_eq!(restored, m);
        assert_eq!(restored.predict_raw(&raw).unwrap(), m.predict_raw(&raw).unwrap());
    }

    #[test]
    fn corrupted_tier_table_rejected() {
        let (m, _) = model();
        let mut value: serde_json::Value = serde_json::from_str(&m.to_json().unwrap()).unwrap();
        value["tiers"]["node_to_tier"][0] = serde_json::json!(9);
        assert!(ZonationModel::from_json(&value.to_string()).is_err());
    }
}
