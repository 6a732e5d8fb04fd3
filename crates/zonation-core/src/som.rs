//! Self-organizing map training on a hexagonal grid.
//!
//! Online (per-sample) competitive learning. Each iteration presents every
//! training row once in a seeded shuffled order; the BMU and the nodes within
//! the current radius move toward the sample with a Gaussian neighbourhood
//! weight. Learning rate and radius both decay linearly over the total number
//! of presentations. Updates are strictly sequential, which keeps a run
//! bit-for-bit reproducible for a given seed.

use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{invalid, Result};
use crate::features::{euclidean, squared_euclidean, FeatureMatrix};
use crate::topology::HexTopology;

/// SOM hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SomConfig {
    pub rows: usize,
    pub cols: usize,
    /// Number of passes over the training set. No early stopping.
    pub iterations: usize,
    /// Learning rate `(start, end)`, linear decay.
    pub learning_rate: (f64, f64),
    /// Neighbourhood radius `(start, end)` in grid units, linear decay.
    /// `None` starts at the 2/3 quantile of node distances and ends at 0.
    #[serde(default)]
    pub radius: Option<(f64, f64)>,
    pub seed: u64,
}

impl Default for SomConfig {
    fn default() -> Self {
        Self {
            rows: 6,
            cols: 6,
            iterations: 100,
            learning_rate: (0.05, 0.01),
            radius: None,
            seed: 42,
        }
    }
}

/// Frozen prototype vectors laid out on a hex grid.
///
/// Provides the nearest-prototype search shared by training, prediction and
/// the quality diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Codebook {
    topology: HexTopology,
    dim: usize,
    /// Row-major `n_nodes × dim`, scaled feature space.
    weights: Vec<f64>,
}

impl Codebook {
    pub fn new(topology: HexTopology, dim: usize, weights: Vec<f64>) -> Result<Self> {
        if dim == 0 {
            return Err(invalid("prototype dimension must be positive"));
        }
        if weights.len() != topology.n_nodes() * dim {
            return Err(invalid(format!(
                "{} prototype values do not match {} nodes × {dim} features",
                weights.len(),
                topology.n_nodes()
            )));
        }
        if weights.iter().any(|w| !w.is_finite()) {
            return Err(invalid("prototype contains a non-finite value"));
        }
        Ok(Self { topology, dim, weights })
    }

    pub fn topology(&self) -> &HexTopology {
        &self.topology
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn n_nodes(&self) -> usize {
        self.topology.n_nodes()
    }

    #[inline]
    pub fn prototype(&self, node: usize) -> &[f64] {
        &self.weights[node * self.dim..(node + 1) * self.dim]
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Nearest node and its Euclidean distance. Ties go to the lowest index.
    #[inline]
    pub fn best_match(&self, x: &[f64]) -> (usize, f64) {
        let mut best = 0;
        let mut best_d = f64::INFINITY;
        for node in 0..self.n_nodes() {
            let d = squared_euclidean(self.prototype(node), x);
            if d < best_d {
                best_d = d;
                best = node;
            }
        }
        (best, best_d.sqrt())
    }

    /// First and second nearest nodes (ties to the lower index). Needs ≥2 nodes.
    pub fn two_best(&self, x: &[f64]) -> (usize, usize) {
        let (mut first, mut second) = (usize::MAX, usize::MAX);
        let (mut d1, mut d2) = (f64::INFINITY, f64::INFINITY);
        for node in 0..self.n_nodes() {
            let d = squared_euclidean(self.prototype(node), x);
            if d < d1 {
                second = first;
                d2 = d1;
                first = node;
                d1 = d;
            } else if d < d2 {
                second = node;
                d2 = d;
            }
        }
        (first, second)
    }

    /// Mean distance between each row and its nearest prototype.
    pub fn mean_quantization_error(&self, samples: &FeatureMatrix) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        samples.rows().map(|x| self.best_match(x).1).sum::<f64>() / samples.n_rows() as f64
    }
}

/// Output of one training run.
#[derive(Debug, Clone)]
pub struct TrainedSom {
    pub codebook: Codebook,
    /// BMU of every training row against the frozen prototypes.
    pub bmus: Vec<usize>,
    /// Mean quantization error after each iteration.
    pub history: Vec<f64>,
}

pub struct SomTrainer {
    config: SomConfig,
}

impl SomTrainer {
    pub fn new(config: SomConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SomConfig {
        &self.config
    }

    /// Train on scaled, complete feature rows.
    pub fn train(&self, samples: &FeatureMatrix) -> Result<TrainedSom> {
        let cfg = &self.config;
        let topology = HexTopology::new(cfg.rows, cfg.cols)?;
        let n = samples.n_rows();
        let dim = samples.dim();
        if n == 0 {
            return Err(invalid("SOM training set is empty"));
        }
        if samples.data().iter().any(|v| !v.is_finite()) {
            return Err(invalid("SOM training rows must not contain missing values"));
        }
        if cfg.iterations == 0 {
            return Err(invalid("SOM needs at least one iteration"));
        }
        let (lr_start, lr_end) = cfg.learning_rate;
        if !(lr_start.is_finite()
            && lr_end.is_finite()
            && lr_end >= 0.0
            && lr_start >= lr_end
            && lr_start > 0.0)
        {
            return Err(invalid(format!(
                "learning rate schedule ({lr_start}, {lr_end}) must decay from a positive start"
            )));
        }
        let (r_start, r_end) = cfg.radius.unwrap_or((topology.default_radius(), 0.0));
        if !(r_start.is_finite() && r_end.is_finite() && r_end >= 0.0 && r_start >= r_end) {
            return Err(invalid(format!(
                "radius schedule ({r_start}, {r_end}) must decay and stay non-negative"
            )));
        }

        let n_nodes = topology.n_nodes();
        let mut rng = StdRng::seed_from_u64(cfg.seed ^ 0x50A1_3C7E_D2B9_4F68);

        // Prototypes start as training rows.
        let init_rows: Vec<usize> = if n >= n_nodes {
            sample(&mut rng, n, n_nodes).into_vec()
        } else {
            (0..n_nodes).map(|_| rng.gen_range(0..n)).collect()
        };
        let mut weights = Vec::with_capacity(n_nodes * dim);
        for &i in &init_rows {
            weights.extend_from_slice(samples.row(i));
        }
        let mut codebook = Codebook::new(topology, dim, weights)?;

        info!(
            "Training SOM: {} samples, {}x{} hex grid, {} features, {} iterations",
            n, cfg.rows, cfg.cols, dim, cfg.iterations
        );

        let grid_dist = topology.distance_matrix();
        let total = (cfg.iterations * n) as f64;
        let mut step = 0usize;
        let mut order: Vec<usize> = (0..n).collect();
        let mut history = Vec::with_capacity(cfg.iterations);

        for iteration in 0..cfg.iterations {
            order.shuffle(&mut rng);
            for &i in &order {
                let frac = step as f64 / total;
                let alpha = lr_start + (lr_end - lr_start) * frac;
                let radius = r_start + (r_end - r_start) * frac;
                let x = samples.row(i);
                let (bmu, _) = codebook.best_match(x);

                for node in 0..n_nodes {
                    let h = neighbourhood(grid_dist[bmu * n_nodes + node], radius);
                    if h == 0.0 {
                        continue;
                    }
                    let w = &mut codebook.weights[node * dim..(node + 1) * dim];
                    for (wk, &xk) in w.iter_mut().zip(x) {
                        *wk += alpha * h * (xk - *wk);
                    }
                }
                step += 1;
            }
            let qe = codebook.mean_quantization_error(samples);
            debug!("SOM iteration {}: mean quantization error {qe:.5}", iteration + 1);
            history.push(qe);
        }

        let bmus: Vec<usize> = samples.rows().map(|x| codebook.best_match(x).0).collect();
        info!(
            "SOM training complete: final quantization error {:.5}",
            history.last().copied().unwrap_or(f64::NAN)
        );
        Ok(TrainedSom { codebook, bmus, history })
    }
}

/// Gaussian neighbourhood weight truncated at `radius`; the BMU always gets 1.
#[inline]
fn neighbourhood(grid_distance: f64, radius: f64) -> f64 {
    if grid_distance == 0.0 {
        1.0
    } else if grid_distance > radius || radius <= 0.0 {
        0.0
    } else {
        (-grid_distance * grid_distance / (2.0 * radius * radius)).exp()
    }
}

/// Euclidean distance between a row and a node's prototype.
pub fn distance_to_node(codebook: &Codebook, x: &[f64], node: usize) -> f64 {
    euclidean(codebook.prototype(node), x)
}
