use thiserror::Error;

/// Percentage of the row consumed by each inter-column gap.
pub const DEFAULT_GAP_PERCENT: f64 = 3.0;

/// Feasibility slack for [`fit_weights_respecting_min`].
pub const MIN_FIT_EPSILON: f64 = 0.01;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LayoutError {
    /// The columns' minimum widths add up to more than the row can hold.
    /// Surfaced on the interactive preset path; the reactive guard swallows
    /// it and keeps the last valid layout.
    #[error("layout rejected: minimum widths need {required:.1}% but only {available:.1}% is available")]
    Infeasible { required: f64, available: f64 },
}

/// Width budget left for columns after reserving `(n-1)` gaps.
pub fn available(columns: usize, gap: f64) -> f64 {
    if columns == 0 {
        return 0.0;
    }
    (100.0 - (columns as f64 - 1.0) * gap).max(0.0)
}

/// Normalize each column's raw share (default `100/n` when unset) so the row
/// sums to exactly the available budget.
pub fn effective_bases(raw: &[Option<f64>], gap: f64) -> Vec<f64> {
    let n = raw.len();
    if n == 0 {
        return Vec::new();
    }
    let default_share = 100.0 / n as f64;
    let shares: Vec<f64> = raw
        .iter()
        .map(|share| {
            share
                .filter(|v| v.is_finite())
                .unwrap_or(default_share)
                .max(0.0)
        })
        .collect();
    scale_to_available(&shares, n, gap)
}

pub fn equal_bases(columns: usize, gap: f64) -> Vec<f64> {
    if columns == 0 {
        return Vec::new();
    }
    vec![available(columns, gap) / columns as f64; columns]
}

/// Distribute the budget by relative weight. A weight list that does not
/// match the column count falls back to an equal split.
pub fn preset_bases(weights: &[f64], columns: usize, gap: f64) -> Vec<f64> {
    if weights.len() != columns || columns == 0 {
        return equal_bases(columns, gap);
    }
    let shares: Vec<f64> = weights
        .iter()
        .map(|w| if w.is_finite() { w.max(0.0) } else { 0.0 })
        .collect();
    if shares.iter().sum::<f64>() <= 0.0 {
        return equal_bases(columns, gap);
    }
    scale_to_available(&shares, columns, gap)
}

fn scale_to_available(shares: &[f64], columns: usize, gap: f64) -> Vec<f64> {
    let budget = available(columns, gap);
    let sum: f64 = shares.iter().sum();
    if sum <= 0.0 {
        return vec![budget / columns as f64; columns];
    }
    shares.iter().map(|share| share / sum * budget).collect()
}

/// Canonical layout presets offered for a given column count. Counts above
/// four only get the uniform split.
pub fn presets_for_columns(columns: usize) -> Vec<Vec<f64>> {
    match columns {
        1 => vec![vec![100.0]],
        2 => vec![
            vec![50.0, 50.0],
            vec![33.0, 67.0],
            vec![67.0, 33.0],
            vec![25.0, 75.0],
            vec![75.0, 25.0],
        ],
        3 => vec![
            vec![33.0, 34.0, 33.0],
            vec![25.0, 50.0, 25.0],
            vec![50.0, 25.0, 25.0],
            vec![25.0, 25.0, 50.0],
        ],
        4 => vec![
            vec![25.0, 25.0, 25.0, 25.0],
            vec![40.0, 20.0, 20.0, 20.0],
            vec![20.0, 20.0, 20.0, 40.0],
            vec![10.0, 40.0, 40.0, 10.0],
        ],
        0 => Vec::new(),
        n => vec![vec![100.0 / n as f64; n]],
    }
}

/// Render a weight set as a preset label, e.g. `25%/50%/25%`.
pub fn format_preset_label(weights: &[f64]) -> String {
    weights
        .iter()
        .map(|w| {
            if (w - w.round()).abs() < 0.05 {
                format!("{:.0}%", w.round())
            } else {
                format!("{w:.1}%")
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Free-text weights: any run of digits/dot separated by whatever the user
/// typed. Negative or non-finite entries are dropped.
pub fn parse_weights(text: &str) -> Vec<f64> {
    text.split(|c: char| !(c.is_ascii_digit() || c == '.'))
        .filter(|part| !part.is_empty())
        .filter_map(|part| part.parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
        .collect()
}

/// Fit `weights` into the row while honoring each column's pixel minimum.
///
/// Minima are converted to percentages of the row's rendered width, the naive
/// weighted targets are computed, every column whose target falls below its
/// minimum is locked there, and the remainder is redistributed across the
/// unlocked columns by target share. Single pass: a column whose allocation
/// shrinks during redistribution is not re-locked.
pub fn fit_weights_respecting_min(
    weights: &[f64],
    min_px: &[f64],
    row_px: f64,
    gap: f64,
    epsilon: f64,
) -> Result<Vec<f64>, LayoutError> {
    let n = weights.len();
    if n == 0 {
        return Ok(Vec::new());
    }
    let budget = available(n, gap);

    let min_pct: Vec<f64> = (0..n)
        .map(|i| {
            let px = min_px.get(i).copied().unwrap_or(0.0).max(0.0);
            if row_px > 0.0 { px / row_px * 100.0 } else { 0.0 }
        })
        .collect();

    let required: f64 = min_pct.iter().sum();
    if required > budget - epsilon {
        return Err(LayoutError::Infeasible {
            required,
            available: budget,
        });
    }

    let targets = preset_bases(weights, n, gap);

    let mut locked = vec![false; n];
    let mut bases = vec![0.0; n];
    let mut locked_total = 0.0;
    for i in 0..n {
        if targets[i] < min_pct[i] {
            locked[i] = true;
            bases[i] = min_pct[i];
            locked_total += min_pct[i];
        }
    }

    let remaining = (budget - locked_total).max(0.0);
    let free_target_sum: f64 = (0..n).filter(|&i| !locked[i]).map(|i| targets[i]).sum();
    let free_count = locked.iter().filter(|l| !**l).count();
    for i in 0..n {
        if locked[i] {
            continue;
        }
        bases[i] = if free_target_sum > 0.0 {
            targets[i] / free_target_sum * remaining
        } else {
            remaining / free_count as f64
        };
    }

    Ok(bases)
}
