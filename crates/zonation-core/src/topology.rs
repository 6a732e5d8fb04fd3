//! Hexagonal SOM grid geometry.
//!
//! Nodes are numbered row-major. Odd rows are shifted half a unit to the right
//! and rows are √3/2 apart, so every pair of grid neighbours sits exactly one
//! unit apart: interior nodes have 6 neighbours, edge nodes fewer.

use serde::{Deserialize, Serialize};

use crate::error::{invalid, Result};

const ROW_SPACING: f64 = 0.866_025_403_784_438_6; // √3 / 2
const ADJACENCY_EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HexTopology {
    rows: usize,
    cols: usize,
}

impl HexTopology {
    pub fn new(rows: usize, cols: usize) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(invalid(format!("SOM grid {rows}x{cols} has no nodes")));
        }
        Ok(Self { rows, cols })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn n_nodes(&self) -> usize {
        self.rows * self.cols
    }

    /// `(row, col)` of a node index.
    #[inline]
    pub fn node_coord(&self, node: usize) -> (usize, usize) {
        (node / self.cols, node % self.cols)
    }

    /// Planar position of a node's centre.
    #[inline]
    pub fn position(&self, node: usize) -> (f64, f64) {
        let (r, c) = self.node_coord(node);
        let shift = if r % 2 == 1 { 0.5 } else { 0.0 };
        (c as f64 + shift, r as f64 * ROW_SPACING)
    }

    /// Euclidean distance between node centres; 1.0 for grid neighbours.
    #[inline]
    pub fn grid_distance(&self, a: usize, b: usize) -> f64 {
        let (xa, ya) = self.position(a);
        let (xb, yb) = self.position(b);
        ((xa - xb).powi(2) + (ya - yb).powi(2)).sqrt()
    }

    pub fn are_adjacent(&self, a: usize, b: usize) -> bool {
        a != b && self.grid_distance(a, b) <= 1.0 + ADJACENCY_EPS
    }

    /// Grid neighbours of `node`, ascending index.
    pub fn neighbors(&self, node: usize) -> Vec<usize> {
        let (r, c) = self.node_coord(node);
        let r0 = r.saturating_sub(1);
        let r1 = (r + 1).min(self.rows - 1);
        let c0 = c.saturating_sub(1);
        let c1 = (c + 1).min(self.cols - 1);
        let mut out = Vec::with_capacity(6);
        for nr in r0..=r1 {
            for nc in c0..=c1 {
                let other = nr * self.cols + nc;
                if self.are_adjacent(node, other) {
                    out.push(other);
                }
            }
        }
        out
    }

    /// Full `n_nodes × n_nodes` matrix of grid distances, row-major.
    pub fn distance_matrix(&self) -> Vec<f64> {
        let n = self.n_nodes();
        let mut d = vec![0.0; n * n];
        for a in 0..n {
            for b in (a + 1)..n {
                let v = self.grid_distance(a, b);
                d[a * n + b] = v;
                d[b * n + a] = v;
            }
        }
        d
    }

    /// Starting neighbourhood radius: the 2/3 quantile of all node-to-node
    /// grid distances (linear interpolation between order statistics).
    pub fn default_radius(&self) -> f64 {
        let mut d = self.distance_matrix();
        d.sort_by(|a, b| a.total_cmp(b));
        let pos = (d.len() - 1) as f64 * (2.0 / 3.0);
        let lo = pos.floor() as usize;
        let hi = pos.ceil() as usize;
        let t = pos - lo as f64;
        d[lo] * (1.0 - t) + d[hi] * t
    }
}
