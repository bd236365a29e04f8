use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::layout::{DEFAULT_GAP_PERCENT, MIN_FIT_EPSILON};

/// Builder-wide tuning. The only knob hosts normally touch is
/// `gap_percent`; the rest exist so the guard's tolerances are not magic
/// numbers scattered through the code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Percentage of the row reserved between adjacent columns.
    pub gap_percent: f64,
    /// Slack used when deciding a row's minima no longer fit.
    pub min_fit_epsilon: f64,
    /// A fitted basis must move at least this much before the guard rewrites
    /// the column, to keep resize storms from thrashing the tree.
    pub base_rewrite_tolerance: f64,
    /// Pixel value of `1rem`/`1em` when resolving declared minimum widths.
    pub root_font_px: f64,
    /// Inherent minimum for fields that declare nothing and whose host
    /// measurer reports nothing.
    pub default_inherent_min_px: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gap_percent: DEFAULT_GAP_PERCENT,
            min_fit_epsilon: MIN_FIT_EPSILON,
            base_rewrite_tolerance: 0.05,
            root_font_px: 16.0,
            default_inherent_min_px: 40.0,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigFile {
    gap_percent: Option<f64>,
    min_fit_epsilon: Option<f64>,
    base_rewrite_tolerance: Option<f64>,
    root_font_px: Option<f64>,
    default_inherent_min_px: Option<f64>,
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let mut config = Config::default();
    let Some(path) = path else {
        return Ok(config);
    };

    let contents = std::fs::read_to_string(path)?;
    let parsed: ConfigFile = match serde_json::from_str(&contents) {
        Ok(file) => file,
        Err(_) => json5::from_str(&contents)?,
    };

    if let Some(v) = parsed.gap_percent {
        if v.is_finite() && v >= 0.0 {
            config.gap_percent = v;
        }
    }
    if let Some(v) = parsed.min_fit_epsilon {
        if v.is_finite() && v >= 0.0 {
            config.min_fit_epsilon = v;
        }
    }
    if let Some(v) = parsed.base_rewrite_tolerance {
        if v.is_finite() && v >= 0.0 {
            config.base_rewrite_tolerance = v;
        }
    }
    if let Some(v) = parsed.root_font_px {
        if v.is_finite() && v > 0.0 {
            config.root_font_px = v;
        }
    }
    if let Some(v) = parsed.default_inherent_min_px {
        if v.is_finite() && v >= 0.0 {
            config.default_inherent_min_px = v;
        }
    }

    Ok(config)
}
