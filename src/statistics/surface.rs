//! Binned cost surfaces for the ratio inversions.

use serde::{Deserialize, Serialize};

use crate::constants::{SURFACE_X_DIM, SURFACE_Y_DIM};

/// One grid cell: running mean of every cost recorded in it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SurfaceCell {
    pub mean_cost: f64,
    pub count: u64,
}

impl SurfaceCell {
    fn record(&mut self, cost: f64) {
        self.count += 1;
        self.mean_cost += (cost - self.mean_cost) / self.count as f64;
    }

    fn merge(&mut self, other: &SurfaceCell) {
        if other.count == 0 {
            return;
        }
        let total = self.count + other.count;
        self.mean_cost = (self.mean_cost * self.count as f64
            + other.mean_cost * other.count as f64)
            / total as f64;
        self.count = total;
    }
}

/// Fixed 32x32 histogram of optimizer evaluations over a 2-D parameter
/// box. Each evaluation lands in the cell covering its (x, y) coordinates
/// and updates that cell's running mean cost; the populated grid is what a
/// client renders as a misfit heat map.
///
/// Coordinates outside the box are clamped into the edge cells, so late
/// bound-narrowing never silently drops samples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostSurface {
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
    x_dim: usize,
    y_dim: usize,
    cells: Vec<SurfaceCell>,
}

impl CostSurface {
    /// Surface over `[x_min, x_max] x [y_min, y_max]` with the standard
    /// 32x32 resolution.
    pub fn new(x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> Self {
        Self {
            x_min,
            x_max,
            y_min,
            y_max,
            x_dim: SURFACE_X_DIM,
            y_dim: SURFACE_Y_DIM,
            cells: vec![SurfaceCell::default(); SURFACE_X_DIM * SURFACE_Y_DIM],
        }
    }

    pub fn x_dim(&self) -> usize {
        self.x_dim
    }

    pub fn y_dim(&self) -> usize {
        self.y_dim
    }

    pub fn record(&mut self, x: f64, y: f64, cost: f64) {
        let xi = self.bin(x, self.x_min, self.x_max, self.x_dim);
        let yi = self.bin(y, self.y_min, self.y_max, self.y_dim);
        self.cells[yi * self.x_dim + xi].record(cost);
    }

    pub fn cell(&self, xi: usize, yi: usize) -> &SurfaceCell {
        &self.cells[yi * self.x_dim + xi]
    }

    /// Populated cells as `(xi, yi, cell)`.
    pub fn populated(&self) -> impl Iterator<Item = (usize, usize, &SurfaceCell)> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, c)| c.count > 0)
            .map(move |(i, c)| (i % self.x_dim, i / self.x_dim, c))
    }

    pub fn total_count(&self) -> u64 {
        self.cells.iter().map(|c| c.count).sum()
    }

    /// Fold another surface over the same box into this one.
    pub fn merge(&mut self, other: &CostSurface) {
        debug_assert_eq!(self.cells.len(), other.cells.len());
        for (mine, theirs) in self.cells.iter_mut().zip(&other.cells) {
            mine.merge(theirs);
        }
    }

    fn bin(&self, value: f64, min: f64, max: f64, dim: usize) -> usize {
        if max <= min {
            return 0;
        }
        let t = (value - min) / (max - min);
        ((t * dim as f64) as isize).clamp(0, dim as isize - 1) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_running_mean_matches_arithmetic_mean() {
        let mut surface = CostSurface::new(0.0, 1.0, 0.0, 1.0);
        for cost in [2.0, 4.0, 9.0] {
            surface.record(0.5, 0.5, cost);
        }
        let (_, _, cell) = surface.populated().next().unwrap();
        assert_eq!(cell.count, 3);
        assert!((cell.mean_cost - 5.0).abs() < 1e-12);
    }

    #[test]
    fn out_of_range_samples_clamp_to_edges() {
        let mut surface = CostSurface::new(0.0, 1.0, 0.0, 1.0);
        surface.record(-5.0, 2.0, 1.0);
        let (xi, yi, _) = surface.populated().next().unwrap();
        assert_eq!(xi, 0);
        assert_eq!(yi, SURFACE_Y_DIM - 1);
    }

    #[test]
    fn merge_combines_counts_and_means() {
        let mut a = CostSurface::new(0.0, 1.0, 0.0, 1.0);
        let mut b = CostSurface::new(0.0, 1.0, 0.0, 1.0);
        a.record(0.1, 0.1, 2.0);
        b.record(0.1, 0.1, 4.0);
        b.record(0.1, 0.1, 6.0);
        a.merge(&b);
        let (_, _, cell) = a.populated().next().unwrap();
        assert_eq!(cell.count, 3);
        assert!((cell.mean_cost - 4.0).abs() < 1e-12);
        assert_eq!(a.total_count(), 3);
    }

    #[test]
    fn distinct_coordinates_land_in_distinct_cells() {
        let mut surface = CostSurface::new(0.0, 32.0, 0.0, 32.0);
        surface.record(0.5, 0.5, 1.0);
        surface.record(31.5, 31.5, 2.0);
        assert_eq!(surface.populated().count(), 2);
    }
}
