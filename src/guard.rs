use serde_json::Value;

use crate::config::Config;
use crate::layout::{self, LayoutError};
use crate::sanitize::{LengthUnit, parse_length};
use crate::tree::{NodeId, Tree};

/// Pixel oracle supplied by the host render layer. The core never renders,
/// so everything pixel-shaped comes through here.
pub trait Measure {
    /// Current rendered width of a row, in pixels.
    fn row_px_width(&self, tree: &Tree, row: NodeId) -> f64;

    /// Inherent minimum of a field that declares no minimum width. Zero or
    /// negative means "unknown".
    fn field_inherent_min_px(&self, tree: &Tree, field: NodeId) -> f64 {
        let _ = (tree, field);
        0.0
    }
}

/// Fixed-width oracle for headless hosts and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedMeasure {
    pub row_px: f64,
    pub inherent_min_px: f64,
}

impl Default for FixedMeasure {
    fn default() -> Self {
        Self {
            row_px: 1000.0,
            inherent_min_px: 0.0,
        }
    }
}

impl Measure for FixedMeasure {
    fn row_px_width(&self, _tree: &Tree, _row: NodeId) -> f64 {
        self.row_px
    }

    fn field_inherent_min_px(&self, _tree: &Tree, _field: NodeId) -> f64 {
        self.inherent_min_px
    }
}

/// Resolve one field's minimum width in pixels: declared pixel literal,
/// declared percent-of-column literal, font-relative literal, or the
/// inherent rendered minimum when nothing is declared.
fn field_min_px(
    tree: &Tree,
    field: NodeId,
    col_px: f64,
    measure: &dyn Measure,
    config: &Config,
) -> f64 {
    let declared = tree.field(field).and_then(|f| match f.attrs.get("min_width") {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => n.as_f64().map(|v| v.to_string()),
        _ => None,
    });

    match declared {
        Some(text) => {
            let length = parse_length(&text, 0.0);
            let px = match length.unit {
                LengthUnit::Px => length.value,
                LengthUnit::Percent => length.value / 100.0 * col_px,
                LengthUnit::Rem | LengthUnit::Em => length.value * config.root_font_px,
            };
            px.max(0.0)
        }
        None => {
            let inherent = measure.field_inherent_min_px(tree, field);
            if inherent > 0.0 {
                inherent
            } else {
                config.default_inherent_min_px
            }
        }
    }
}

/// Recompute a column's pixel floor from the fields directly inside it.
/// Empty columns constrain nothing.
pub fn apply_col_min(tree: &mut Tree, column: NodeId, measure: &dyn Measure, config: &Config) {
    let Some(row) = tree.node(column).and_then(|n| n.parent) else {
        return;
    };
    let columns = tree.columns(row);
    let Some(index) = columns.iter().position(|&c| c == column) else {
        return;
    };
    let row_px = measure.row_px_width(tree, row);
    let bases = layout::effective_bases(&tree.raw_bases(row), config.gap_percent);
    let col_px = bases.get(index).copied().unwrap_or(0.0) / 100.0 * row_px;

    let fields: Vec<NodeId> = tree
        .node(column)
        .map(|n| n.children.clone())
        .unwrap_or_default()
        .into_iter()
        .filter(|&child| tree.is_field(child))
        .collect();

    let mut floor: f64 = 0.0;
    for field in fields {
        floor = floor.max(field_min_px(tree, field, col_px, measure, config));
    }
    if let Some(col) = tree.column_mut(column) {
        col.min_px = floor;
    }
}

/// Refresh one row: recompute every column's floor, then refit the current
/// bases against them. Bases are rewritten only when the fit moved beyond
/// the configured tolerance; an infeasible row keeps its last valid layout
/// with no user-visible error.
pub fn refresh_row(tree: &mut Tree, row: NodeId, measure: &dyn Measure, config: &Config) -> bool {
    let columns = tree.columns(row);
    if columns.is_empty() {
        return false;
    }
    for &column in &columns {
        apply_col_min(tree, column, measure, config);
    }

    let current = layout::effective_bases(&tree.raw_bases(row), config.gap_percent);
    let minima: Vec<f64> = columns
        .iter()
        .map(|&c| tree.column(c).map(|col| col.min_px).unwrap_or(0.0))
        .collect();
    let row_px = measure.row_px_width(tree, row);

    match layout::fit_weights_respecting_min(
        &current,
        &minima,
        row_px,
        config.gap_percent,
        config.min_fit_epsilon,
    ) {
        Ok(fitted) => {
            let moved = fitted
                .iter()
                .zip(&current)
                .any(|(f, c)| (f - c).abs() > config.base_rewrite_tolerance);
            if moved {
                tree.apply_bases(row, &fitted);
            }
            moved
        }
        Err(LayoutError::Infeasible { .. }) => false,
    }
}

/// Run [`refresh_row`] over every row in the tree. Returns how many rows
/// were rewritten.
pub fn refresh_all(tree: &mut Tree, measure: &dyn Measure, config: &Config) -> usize {
    let rows = tree.rows();
    rows.into_iter()
        .filter(|&row| refresh_row(tree, row, measure, config))
        .count()
}
