//! Majority (modal) filter over a risk-tier raster.
//!
//! For every cell with a tier, the most frequent tier among the non-missing
//! cells of a square window centred on it (clipped at the grid edge, centre
//! included). Ties go to the lowest tier. No-data cells stay no data.

use crate::cluster::RiskTier;
use crate::error::{invalid, Result};
use crate::parallel::map_indices;
use crate::raster::RiskGrid;

pub const DEFAULT_WINDOW: usize = 3;

/// Apply the majority filter with an odd `window_size` ≥ 1.
pub fn smooth(grid: &RiskGrid, window_size: usize) -> Result<RiskGrid> {
    if window_size == 0 || window_size % 2 == 0 {
        return Err(invalid(format!(
            "smoothing window must be odd and positive, got {window_size}"
        )));
    }
    grid.validate()?;
    let half = window_size / 2;
    let (w, h) = (grid.width, grid.height);

    let rows: Vec<Vec<Option<RiskTier>>> = map_indices(h, |r| {
        let r0 = r.saturating_sub(half);
        let r1 = (r + half).min(h - 1);
        (0..w)
            .map(|c| {
                if grid.get(r, c).is_none() {
                    return None;
                }
                let c0 = c.saturating_sub(half);
                let c1 = (c + half).min(w - 1);
                let mut counts = [0u32; 256];
                for wr in r0..=r1 {
                    for wc in c0..=c1 {
                        if let Some(t) = grid.get(wr, wc) {
                            counts[t as usize] += 1;
                        }
                    }
                }
                modal(&counts)
            })
            .collect()
    });

    let mut out = grid.clone();
    out.cells = rows.into_iter().flatten().collect();
    Ok(out)
}

/// Lowest tier with the highest count; None when all counts are zero.
fn modal(counts: &[u32; 256]) -> Option<RiskTier> {
    let mut best: Option<(RiskTier, u32)> = None;
    for (t, &n) in counts.iter().enumerate() {
        if n > 0 && best.map_or(true, |(_, b)| n > b) {
            best = Some((t as RiskTier, n));
        }
    }
    best.map(|(t, _)| t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(w: usize, h: usize, cells: &[Option<RiskTier>]) -> RiskGrid {
        RiskGrid::from_cells(w, h, cells.to_vec()).unwrap()
    }

    #[test]
    fn uniform_region_unchanged() {
        let g = grid(4, 4, &[Some(2); 16]);
        assert_eq!(smooth(&g, 3).unwrap(), g);
        assert_eq!(smooth(&g, 5).unwrap(), g);
    }

    #[test]
    fn isolated_cell_removed() {
        let mut cells = vec![Some(1); 25];
        cells[12] = Some(3);
        let out = smooth(&grid(5, 5, &cells), 3).unwrap();
        assert!(out.cells.iter().all(|&c| c == Some(1)));
    }

    #[test]
    fn ties_go_to_lowest_tier() {
        // 2x1 grid: each window holds one 3 and one 2.
        let out = smooth(&grid(2, 1, &[Some(3), Some(2)]), 3).unwrap();
        assert_eq!(out.cells, vec![Some(2), Some(2)]);
    }

    #[test]
    fn no_data_cells_stay_missing() {
        let mut cells = vec![None; 25];
        cells[0] = Some(1);
        let out = smooth(&grid(5, 5, &cells), 3).unwrap();
        assert_eq!(out.get(0, 0), Some(1));
        assert_eq!(out.get(1, 1), None);
        assert_eq!(out.get(4, 4), None);
        assert_eq!(out.get(2, 2), None);
    }

    #[test]
    fn mask_edge_does_not_grow() {
        // Left column masked, rest tier 1.
        let cells = vec![None, Some(1), Some(1), None, Some(1), Some(1), None, Some(1), Some(1)];
        let out = smooth(&grid(3, 3, &cells), 3).unwrap();
        assert_eq!(out.cells, cells);
    }

    #[test]
    fn neighbours_vote_only_where_centre_has_data() {
        // Centre tier 3 surrounded by tier 2 and holes: neighbours still win.
        let cells = vec![None, Some(2), None, Some(2), Some(3), Some(2), None, Some(2), None];
        let out = smooth(&grid(3, 3, &cells), 3).unwrap();
        assert_eq!(out.get(1, 1), Some(2));
        assert_eq!(out.get(0, 0), None);
        assert_eq!(out.get(2, 2), None);
    }

    #[test]
    fn window_one_is_identity() {
        let g = grid(3, 1, &[Some(1), None, Some(2)]);
        assert_eq!(smooth(&g, 1).unwrap(), g);
    }

    #[test]
    fn even_window_rejected() {
        assert!(smooth(&grid(2, 2, &[None; 4]), 2).is_err());
        assert!(smooth(&grid(2, 2, &[None; 4]), 0).is_err());
    }
}
