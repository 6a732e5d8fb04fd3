//! Read-only diagnostics of a trained map.
//!
//! - Quantization error: mean distance from each sample to its BMU prototype.
//! - Topographic error: share of samples whose two nearest prototypes are not
//!   grid neighbours.
//! - Silhouette: cohesion vs. separation with BMU index as cluster label.
//! - Separation index: Davies–Bouldin ratio of scatter to centroid distance.
//!
//! None of these touch prototypes, assignments or tiers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{invalid, Result};
use crate::features::{euclidean, FeatureMatrix};
use crate::parallel::map_indices;
use crate::som::Codebook;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub quantization_error: f64,
    /// None on a single-node map.
    pub topographic_error: Option<f64>,
    /// None when all samples share one BMU.
    pub silhouette: Option<f64>,
    /// None when all samples share one BMU.
    pub separation_index: Option<f64>,
}

/// All four diagnostics over scaled training rows and their BMUs.
pub fn evaluate(
    codebook: &Codebook,
    samples: &FeatureMatrix,
    bmus: &[usize],
) -> Result<QualityReport> {
    Ok(QualityReport {
        quantization_error: quantization_error(codebook, samples, bmus)?,
        topographic_error: topographic_error(codebook, samples).ok(),
        silhouette: silhouette(samples, bmus).ok(),
        separation_index: davies_bouldin(samples, bmus).ok(),
    })
}

fn check_labels(samples: &FeatureMatrix, labels: &[usize]) -> Result<()> {
    if samples.is_empty() {
        return Err(invalid("no samples to evaluate"));
    }
    if labels.len() != samples.n_rows() {
        return Err(invalid(format!(
            "{} assignments for {} samples",
            labels.len(),
            samples.n_rows()
        )));
    }
    Ok(())
}

pub fn quantization_error(
    codebook: &Codebook,
    samples: &FeatureMatrix,
    bmus: &[usize],
) -> Result<f64> {
    check_labels(samples, bmus)?;
    if samples.dim() != codebook.dim() {
        return Err(invalid("sample and prototype dimensions differ"));
    }
    let mut total = 0.0;
    for (x, &node) in samples.rows().zip(bmus) {
        if node >= codebook.n_nodes() {
            return Err(invalid(format!("assignment {node} is not a map node")));
        }
        total += euclidean(codebook.prototype(node), x);
    }
    Ok(total / samples.n_rows() as f64)
}

pub fn topographic_error(codebook: &Codebook, samples: &FeatureMatrix) -> Result<f64> {
    if samples.is_empty() {
        return Err(invalid("no samples to evaluate"));
    }
    if codebook.n_nodes() < 2 {
        return Err(invalid("topographic error needs at least 2 map nodes"));
    }
    let topo = codebook.topology();
    let broken = samples
        .rows()
        .filter(|x| {
            let (first, second) = codebook.two_best(x);
            !topo.are_adjacent(first, second)
        })
        .count();
    Ok(broken as f64 / samples.n_rows() as f64)
}

/// Map arbitrary labels onto `0..k` in ascending label order.
fn compact(labels: &[usize]) -> (Vec<usize>, usize) {
    let mut ids: BTreeMap<usize, usize> = labels.iter().map(|&l| (l, 0)).collect();
    for (k, v) in ids.values_mut().enumerate() {
        *v = k;
    }
    let k = ids.len();
    (labels.iter().map(|l| ids[l]).collect(), k)
}

/// Mean silhouette coefficient. Samples alone in their cluster score 0.
pub fn silhouette(samples: &FeatureMatrix, labels: &[usize]) -> Result<f64> {
    check_labels(samples, labels)?;
    let (ids, k) = compact(labels);
    if k < 2 {
        return Err(invalid("silhouette needs at least 2 clusters"));
    }
    let mut sizes = vec![0usize; k];
    for &c in &ids {
        sizes[c] += 1;
    }
    let n = samples.n_rows();

    let scores = map_indices(n, |i| {
        let own = ids[i];
        if sizes[own] == 1 {
            return 0.0;
        }
        let mut sums = vec![0.0f64; k];
        let xi = samples.row(i);
        for j in 0..n {
            if j != i {
                sums[ids[j]] += euclidean(xi, samples.row(j));
            }
        }
        let a = sums[own] / (sizes[own] - 1) as f64;
        let b = (0..k)
            .filter(|&c| c != own)
            .map(|c| sums[c] / sizes[c] as f64)
            .fold(f64::INFINITY, f64::min);
        let denom = a.max(b);
        if denom > 0.0 {
            (b - a) / denom
        } else {
            0.0
        }
    });
    Ok(scores.iter().sum::<f64>() / n as f64)
}

/// Davies–Bouldin index. Pairs of coincident centroids are skipped.
pub fn davies_bouldin(samples: &FeatureMatrix, labels: &[usize]) -> Result<f64> {
    check_labels(samples, labels)?;
    let (ids, k) = compact(labels);
    if k < 2 {
        return Err(invalid("separation index needs at least 2 clusters"));
    }
    let dim = samples.dim();
    let mut centroids = vec![0.0f64; k * dim];
    let mut sizes = vec![0usize; k];
    for (x, &c) in samples.rows().zip(&ids) {
        sizes[c] += 1;
        for (acc, v) in centroids[c * dim..(c + 1) * dim].iter_mut().zip(x) {
            *acc += v;
        }
    }
    for c in 0..k {
        for v in &mut centroids[c * dim..(c + 1) * dim] {
            *v /= sizes[c] as f64;
        }
    }
    let centroid = |c: usize| &centroids[c * dim..(c + 1) * dim];

    let mut scatter = vec![0.0f64; k];
    for (x, &c) in samples.rows().zip(&ids) {
        scatter[c] += euclidean(x, centroid(c));
    }
    for c in 0..k {
        scatter[c] /= sizes[c] as f64;
    }

    let mut total = 0.0;
    for i in 0..k {
        let mut worst = 0.0f64;
        for j in 0..k {
            if i == j {
                continue;
            }
            let d = euclidean(centroid(i), centroid(j));
            if d > 0.0 {
                worst = worst.max((scatter[i] + scatter[j]) / d);
            }
        }
        total += worst;
    }
    Ok(total / k as f64)
}
