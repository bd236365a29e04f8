use crate::config::Config;
use crate::guard::Measure;
use crate::layout;
use crate::sanitize::clamp;
use crate::tree::{NodeId, Tree};

/// One in-flight boundary drag between two adjacent columns.
///
/// Press snapshots the pair (pixel widths, bases, pixel minima); every move
/// rewrites only those two columns from the snapshot, so sibling columns
/// and the pair's combined share stay untouched; release renormalizes the
/// whole row to clear accumulated float drift.
#[derive(Debug, Clone)]
pub struct ResizeDrag {
    row: NodeId,
    left: NodeId,
    right: NodeId,
    left_px: f64,
    left_min_px: f64,
    right_min_px: f64,
    pair_px: f64,
    pair_basis: f64,
}

impl ResizeDrag {
    /// Start dragging the boundary between columns `boundary` and
    /// `boundary + 1` of `row`. `None` when the boundary does not exist or
    /// the row has no rendered width yet.
    pub fn begin(
        tree: &Tree,
        row: NodeId,
        boundary: usize,
        measure: &dyn Measure,
        config: &Config,
    ) -> Option<Self> {
        let columns = tree.columns(row);
        let left = *columns.get(boundary)?;
        let right = *columns.get(boundary + 1)?;
        let row_px = measure.row_px_width(tree, row);
        if row_px <= 0.0 {
            return None;
        }
        let bases = layout::effective_bases(&tree.raw_bases(row), config.gap_percent);
        let left_basis = bases.get(boundary).copied()?;
        let right_basis = bases.get(boundary + 1).copied()?;
        Some(Self {
            row,
            left,
            right,
            left_px: left_basis / 100.0 * row_px,
            left_min_px: tree.column(left).map(|c| c.min_px).unwrap_or(0.0),
            right_min_px: tree.column(right).map(|c| c.min_px).unwrap_or(0.0),
            pair_px: (left_basis + right_basis) / 100.0 * row_px,
            pair_basis: left_basis + right_basis,
        })
    }

    /// Apply a horizontal pointer delta (pixels since press). The split
    /// point clamps so neither column drops below its pixel minimum.
    pub fn update(&self, tree: &mut Tree, dx: f64) {
        if self.pair_px <= 0.0 {
            return;
        }
        let new_left_px = clamp(
            self.left_px + dx,
            self.left_min_px,
            self.pair_px - self.right_min_px,
        );
        let fraction = new_left_px / self.pair_px;
        let left_basis = self.pair_basis * fraction;
        let right_basis = self.pair_basis - left_basis;
        if let Some(col) = tree.column_mut(self.left) {
            col.basis = Some(left_basis);
        }
        if let Some(col) = tree.column_mut(self.right) {
            col.basis = Some(right_basis);
        }
    }

    /// End the drag: renormalize the whole row so the bases sum exactly to
    /// the available budget again.
    pub fn finish(self, tree: &mut Tree, config: &Config) {
        let bases = layout::effective_bases(&tree.raw_bases(self.row), config.gap_percent);
        tree.apply_bases(self.row, &bases);
    }
}
