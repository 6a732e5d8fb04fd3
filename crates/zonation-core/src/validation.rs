//! Predictive validity of tiers against labelled held-out points.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::cluster::RiskTier;
use crate::error::{invalid, Result};
use crate::grid::EnvGrid;
use crate::model::ZonationModel;
use crate::points::{PointSet, ABSENCE, PRESENCE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_positive: usize,
    pub false_positive: usize,
    pub true_negative: usize,
    pub false_negative: usize,
}

impl ConfusionMatrix {
    pub fn total(&self) -> usize {
        self.true_positive + self.false_positive + self.true_negative + self.false_negative
    }

    pub fn sensitivity(&self) -> Option<f64> {
        ratio(self.true_positive, self.true_positive + self.false_negative)
    }

    pub fn specificity(&self) -> Option<f64> {
        ratio(self.true_negative, self.true_negative + self.false_positive)
    }

    /// True skill statistic, sensitivity + specificity − 1.
    pub fn true_skill(&self) -> Option<f64> {
        Some(self.sensitivity()? + self.specificity()? - 1.0)
    }

    pub fn accuracy(&self) -> Option<f64> {
        ratio(self.true_positive + self.true_negative, self.total())
    }
}

fn ratio(num: usize, den: usize) -> Option<f64> {
    (den > 0).then(|| num as f64 / den as f64)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierRate {
    pub tier: RiskTier,
    pub presences: usize,
    pub absences: usize,
    /// Share of presences among points in the tier; None when the tier is empty.
    pub presence_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Lowest tier counted as a predicted positive.
    pub threshold: RiskTier,
    pub scored: usize,
    /// Points whose prediction was no data.
    pub skipped: usize,
    pub tiers: Vec<TierRate>,
    pub confusion: ConfusionMatrix,
    pub sensitivity: Option<f64>,
    pub specificity: Option<f64>,
    pub true_skill: Option<f64>,
    pub accuracy: Option<f64>,
}

/// Score predicted tiers against 0/1 labels.
pub fn validate(
    predicted: &[Option<RiskTier>],
    labels: &[u8],
    num_tiers: RiskTier,
    threshold: RiskTier,
) -> Result<ValidationReport> {
    if predicted.len() != labels.len() {
        return Err(invalid(format!(
            "{} predictions for {} labels",
            predicted.len(),
            labels.len()
        )));
    }
    if threshold < 1 || threshold > num_tiers {
        return Err(invalid(format!("threshold tier {threshold} outside 1..={num_tiers}")));
    }

    let mut tiers: Vec<TierRate> = (1..=num_tiers)
        .map(|tier| TierRate { tier, presences: 0, absences: 0, presence_rate: None })
        .collect();
    let mut confusion = ConfusionMatrix::default();
    let mut skipped = 0;

    for (i, (&pred, &label)) in predicted.iter().zip(labels).enumerate() {
        let Some(tier) = pred else {
            skipped += 1;
            continue;
        };
        if tier < 1 || tier > num_tiers {
            return Err(invalid(format!("prediction {i} has tier {tier} outside 1..={num_tiers}")));
        }
        let positive = tier >= threshold;
        let slot = &mut tiers[tier as usize - 1];
        match label {
            PRESENCE => {
                slot.presences += 1;
                if positive {
                    confusion.true_positive += 1;
                } else {
                    confusion.false_negative += 1;
                }
            }
            ABSENCE => {
                slot.absences += 1;
                if positive {
                    confusion.false_positive += 1;
                } else {
                    confusion.true_negative += 1;
                }
            }
            other => return Err(invalid(format!("label {i} is {other}, expected 0 or 1"))),
        }
    }
    for t in &mut tiers {
        t.presence_rate = ratio(t.presences, t.presences + t.absences);
    }
    if skipped > 0 {
        warn!("{skipped} of {} validation points fell on no-data cells", predicted.len());
    }

    Ok(ValidationReport {
        threshold,
        scored: predicted.len() - skipped,
        skipped,
        tiers,
        confusion,
        sensitivity: confusion.sensitivity(),
        specificity: confusion.specificity(),
        true_skill: confusion.true_skill(),
        accuracy: confusion.accuracy(),
    })
}

/// Extract one epoch's predictors at the held-out point locations and score
/// the model's tiers against their labels. Points outside the grid or on
/// no-data cells are skipped.
pub fn validate_points(
    model: &ZonationModel,
    grid: &EnvGrid,
    points: &PointSet,
    threshold: RiskTier,
) -> Result<ValidationReport> {
    grid.validate()?;
    let labels = points.labels()?;
    let raw = grid.extract(&points.coords(), model.schema())?;
    let predicted = model.predict_raw(&raw)?;
    let report = validate(&predicted, &labels, model.num_tiers(), threshold)?;
    debug!(
        "validation: {} scored, TSS {:?}, accuracy {:?}",
        report.scored, report.true_skill, report.accuracy
    );
    Ok(report)
}
