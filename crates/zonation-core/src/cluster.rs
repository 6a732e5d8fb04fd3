//! Grouping of SOM prototypes into ordered risk tiers.
//!
//! Agglomerative clustering with average linkage (UPGMA) on Euclidean
//! prototype distances, stopped at exactly `num_tiers` groups. Group ids are
//! then replaced by the rank of each group's mean ordering feature, so tier 1
//! is always the lowest-risk group regardless of merge order.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{invalid, Result};
use crate::features::{euclidean, Schema};
use crate::som::Codebook;

/// Ordered risk label, `1..=num_tiers`.
pub type RiskTier = u8;

/// Frozen node → tier lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierAssignment {
    node_to_tier: Vec<RiskTier>,
    num_tiers: RiskTier,
    ordering_feature: String,
    /// Mean of the ordering feature over each tier's prototypes (scaled units), tier 1 first.
    tier_means: Vec<f64>,
}

impl TierAssignment {
    pub fn tier_of(&self, node: usize) -> RiskTier {
        self.node_to_tier[node]
    }

    pub fn node_to_tier(&self) -> &[RiskTier] {
        &self.node_to_tier
    }

    pub fn num_tiers(&self) -> RiskTier {
        self.num_tiers
    }

    pub fn ordering_feature(&self) -> &str {
        &self.ordering_feature
    }

    pub fn tier_means(&self) -> &[f64] {
        &self.tier_means
    }

    /// Nodes carrying `tier`, ascending.
    pub fn nodes_in(&self, tier: RiskTier) -> Vec<usize> {
        (0..self.node_to_tier.len()).filter(|&n| self.node_to_tier[n] == tier).collect()
    }

    pub(crate) fn is_consistent(&self, n_nodes: usize) -> bool {
        self.node_to_tier.len() == n_nodes
            && self.num_tiers >= 1
            && self.tier_means.len() == self.num_tiers as usize
            && self.node_to_tier.iter().all(|&t| t >= 1 && t <= self.num_tiers)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskTierClusterer {
    pub num_tiers: usize,
    /// Predictor whose prototype mean orders the tiers (higher → riskier).
    pub ordering_feature: String,
}

impl RiskTierClusterer {
    pub fn new(num_tiers: usize, ordering_feature: impl Into<String>) -> Self {
        Self { num_tiers, ordering_feature: ordering_feature.into() }
    }

    pub fn assign_tiers(&self, codebook: &Codebook, schema: &Schema) -> Result<TierAssignment> {
        let n = codebook.n_nodes();
        let k = self.num_tiers;
        if k == 0 || k > n || k > RiskTier::MAX as usize {
            return Err(invalid(format!("cannot cut {n} prototypes into {k} tiers")));
        }
        if schema.len() != codebook.dim() {
            return Err(invalid(format!(
                "schema has {} predictors, prototypes have {}",
                schema.len(),
                codebook.dim()
            )));
        }
        let feature = schema.index_of(&self.ordering_feature).ok_or_else(|| {
            invalid(format!("ordering feature '{}' is not a predictor", self.ordering_feature))
        })?;

        let groups = average_linkage(codebook, k);

        // Rank groups by mean ordering feature; equal means fall back to the lowest member node.
        let mut ranked: Vec<(f64, usize, &Vec<usize>)> = groups
            .iter()
            .map(|members| {
                let mean = members.iter().map(|&m| codebook.prototype(m)[feature]).sum::<f64>()
                    / members.len() as f64;
                (mean, members[0], members)
            })
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut node_to_tier = vec![0 as RiskTier; n];
        let mut tier_means = Vec::with_capacity(k);
        for (rank, (mean, _, members)) in ranked.iter().enumerate() {
            let tier = (rank + 1) as RiskTier;
            for &m in members.iter() {
                node_to_tier[m] = tier;
            }
            tier_means.push(*mean);
        }
        debug!("risk tiers by mean '{}': {:?}", self.ordering_feature, tier_means);

        Ok(TierAssignment {
            node_to_tier,
            num_tiers: k as RiskTier,
            ordering_feature: self.ordering_feature.clone(),
            tier_means,
        })
    }
}

/// Merge prototypes bottom-up until `k` groups remain. Each group's members
/// are sorted ascending. Among equally close pairs the lowest `(i, j)` merges first.
fn average_linkage(codebook: &Codebook, k: usize) -> Vec<Vec<usize>> {
    let n = codebook.n_nodes();
    let mut dist = vec![0.0f64; n * n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d = euclidean(codebook.prototype(i), codebook.prototype(j));
            dist[i * n + j] = d;
            dist[j * n + i] = d;
        }
    }

    let mut members: Vec<Option<Vec<usize>>> = (0..n).map(|i| Some(vec![i])).collect();
    let mut active = n;

    while active > k {
        let mut best = (usize::MAX, usize::MAX);
        let mut best_d = f64::INFINITY;
        for i in 0..n {
            if members[i].is_none() {
                continue;
            }
            for j in (i + 1)..n {
                if members[j].is_none() {
                    continue;
                }
                let d = dist[i * n + j];
                if d < best_d {
                    best_d = d;
                    best = (i, j);
                }
            }
        }

        let (i, j) = best;
        let size_i = members[i].as_ref().map_or(0, Vec::len) as f64;
        let size_j = members[j].as_ref().map_or(0, Vec::len) as f64;

        // Lance–Williams update for average linkage.
        for m in 0..n {
            if m == i || m == j || members[m].is_none() {
                continue;
            }
            let d = (size_i * dist[i * n + m] + size_j * dist[j * n + m]) / (size_i + size_j);
            dist[i * n + m] = d;
            dist[m * n + i] = d;
        }

        let moved = members[j].take().unwrap_or_default();
        if let Some(group) = members[i].as_mut() {
            group.extend(moved);
            group.sort_unstable();
        }
        active -= 1;
    }

    members.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::HexTopology;

    fn codebook(rows: usize, cols: usize, protos: &[[f64; 2]]) -> Codebook {
        let topo = HexTopology::new(rows, cols).unwrap();
        Codebook::new(topo, 2, protos.iter().flat_map(|p| p.iter().copied()).collect()).unwrap()
    }

    fn schema() -> Schema {
        Schema::new(["suit", "pop"]).unwrap()
    }

    #[test]
    fn separated_groups_are_ordered_by_feature_mean() {
        // Three tight groups at suit = 5, -5, 0 (node order scrambles the risk order).
        let cb = codebook(
            2,
            3,
            &[[5.0, 0.0], [-5.0, 0.0], [0.0, 0.1], [5.1, 0.0], [-5.1, 0.0], [0.1, 0.0]],
        );
        let tiers = RiskTierClusterer::new(3, "suit").assign_tiers(&cb, &schema()).unwrap();
        assert_eq!(tiers.node_to_tier(), &[3, 1, 2, 3, 1, 2]);
        assert_eq!(tiers.num_tiers(), 3);
        let means = tiers.tier_means();
        assert!(means[0] < means[1] && means[1] < means[2]);
        assert_eq!(tiers.nodes_in(1), vec![1, 4]);
    }

    #[test]
    fn every_node_gets_exactly_one_tier() {
        let protos: Vec<[f64; 2]> = (0..36)
            .map(|i| [(i as f64 * 0.37).sin() * 3.0, (i as f64 * 0.11).cos()])
            .collect();
        let cb = codebook(6, 6, &protos);
        for k in 1..=6 {
            let tiers = RiskTierClusterer::new(k, "suit").assign_tiers(&cb, &schema()).unwrap();
            assert!(tiers.is_consistent(36));
            for t in 1..=k as RiskTier {
                assert!(!tiers.nodes_in(t).is_empty(), "tier {t} of {k} empty");
            }
            assert!(tiers.tier_means().windows(2).all(|w| w[0] <= w[1]));
        }
    }

    #[test]
    fn ordering_by_other_feature_changes_labels() {
        let cb = codebook(1, 2, &[[1.0, 9.0], [9.0, 1.0]]);
        let by_suit = RiskTierClusterer::new(2, "suit").assign_tiers(&cb, &schema()).unwrap();
        let by_pop = RiskTierClusterer::new(2, "pop").assign_tiers(&cb, &schema()).unwrap();
        assert_eq!(by_suit.node_to_tier(), &[1, 2]);
        assert_eq!(by_pop.node_to_tier(), &[2, 1]);
    }

    #[test]
    fn invalid_requests_rejected() {
        let cb = codebook(1, 2, &[[1.0, 9.0], [9.0, 1.0]]);
        assert!(RiskTierClusterer::new(0, "suit").assign_tiers(&cb, &schema()).is_err());
        assert!(RiskTierClusterer::new(3, "suit").assign_tiers(&cb, &schema()).is_err());
        assert!(RiskTierClusterer::new(2, "rain").assign_tiers(&cb, &schema()).is_err());
    }
}
