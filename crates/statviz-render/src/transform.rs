//! Row shaping ahead of rasterization: extraction, sorting, smoothing,
//! top-N truncation.

use crate::RenderError;
use statviz_model::{scalar_as_f64, scalar_label, ChartOptions, ChartSpec, TabularResult};
use std::cmp::Ordering;

/// A single plottable series: category labels with their numeric values.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub labels: Vec<String>,
    pub values: Vec<f64>,
}

impl Series {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Pull the x/y columns out of a result.
///
/// Rows whose y cell is null are dropped; a non-null, non-numeric y cell is
/// a spec error. Column names are matched case-insensitively since the SQL
/// and the chart spec may disagree on identifier casing.
pub(crate) fn extract_series(
    result: &TabularResult,
    spec: &ChartSpec,
) -> Result<Series, RenderError> {
    let x_idx = result
        .resolve_column(&spec.x)
        .ok_or_else(|| RenderError::MissingColumn(spec.x.clone()))?;
    let y_idx = result
        .resolve_column(&spec.y)
        .ok_or_else(|| RenderError::MissingColumn(spec.y.clone()))?;

    let mut labels = Vec::with_capacity(result.row_count);
    let mut values = Vec::with_capacity(result.row_count);

    for row in &result.rows {
        let y_cell = &row[y_idx];
        if y_cell.is_null() {
            continue;
        }
        let y = scalar_as_f64(y_cell)
            .ok_or_else(|| RenderError::NonNumericColumn(spec.y.clone()))?;
        labels.push(scalar_label(&row[x_idx]));
        values.push(y);
    }

    Ok(Series { labels, values })
}

/// Apply the option-driven transforms in order: sort, rolling, top-N.
pub(crate) fn shape(series: &mut Series, options: &ChartOptions) {
    if options.sort {
        sort_by_label(series);
    }
    if let Some(k) = options.rolling {
        if k > 1 {
            series.values = rolling_mean(&series.values, k as usize);
        }
    }
    if let Some(n) = options.top_n {
        top_n(series, n as usize);
    }
}

/// Stable ascending sort by label. Labels that all parse as numbers are
/// ordered numerically, otherwise lexically, so both season labels and raw
/// numeric categories come out in natural order.
fn sort_by_label(series: &mut Series) {
    let mut paired: Vec<(String, f64)> = series
        .labels
        .drain(..)
        .zip(series.values.drain(..))
        .collect();
    paired.sort_by(|a, b| compare_labels(&a.0, &b.0));
    for (label, value) in paired {
        series.labels.push(label);
        series.values.push(value);
    }
}

fn compare_labels(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.cmp(b),
    }
}

/// Trailing moving average with window `k`.
///
/// Position i averages the `min(i + 1, k)` most recent values, so the head
/// of the series is smoothed over the shorter window rather than dropped.
pub fn rolling_mean(values: &[f64], k: usize) -> Vec<f64> {
    let k = k.max(1);
    let mut out = Vec::with_capacity(values.len());
    let mut window_sum = 0.0;

    for i in 0..values.len() {
        window_sum += values[i];
        if i >= k {
            window_sum -= values[i - k];
        }
        let width = (i + 1).min(k);
        out.push(window_sum / width as f64);
    }

    out
}

/// Keep the `n` largest values, descending by value (stable for ties).
fn top_n(series: &mut Series, n: usize) {
    let mut paired: Vec<(String, f64)> = series
        .labels
        .drain(..)
        .zip(series.values.drain(..))
        .collect();
    paired.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    paired.truncate(n);
    for (label, value) in paired {
        series.labels.push(label);
        series.values.push(value);
    }
}
