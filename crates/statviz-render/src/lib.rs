//! Chart renderer: tabular result + chart spec -> PNG
//!
//! The renderer owns everything between a query result and the final image:
//! column validation, row shaping (sort / rolling mean / top-N), axis
//! formatting, and rasterization through the plotters bitmap backend. The
//! dry-run path produces a structured preview without touching the image
//! pipeline at all.

use statviz_model::{ChartSpec, Preview, TabularResult};
use thiserror::Error;

mod draw;
mod transform;

pub use transform::{rolling_mean, Series};

/// Number of rows included in a dry-run preview
const PREVIEW_ROWS: usize = 50;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Missing chart column: {0}")]
    MissingColumn(String),

    #[error("Column is not numeric: {0}")]
    NonNumericColumn(String),

    #[error("Chart backend error: {0}")]
    Backend(String),

    #[error("Image encoding error: {0}")]
    Encode(String),
}

impl RenderError {
    /// True for failures caused by the chart spec not matching the data,
    /// as opposed to faults inside the raster backend.
    pub fn is_spec_error(&self) -> bool {
        matches!(
            self,
            RenderError::MissingColumn(_) | RenderError::NonNumericColumn(_)
        )
    }
}

/// Render a result set as a PNG image according to the spec.
///
/// An empty series (empty result, or every y cell null) produces an explicit
/// "no data" placeholder image; the output is always a well-formed PNG.
pub fn render(result: &TabularResult, spec: &ChartSpec) -> Result<Vec<u8>, RenderError> {
    let mut series = transform::extract_series(result, spec)?;
    transform::shape(&mut series, &spec.options);

    if series.is_empty() {
        return draw::no_data(&spec.options.theme);
    }

    draw::chart(&series, spec)
}

/// Summarize a result without rendering: columns, total row count, and a
/// bounded sample of rows as name->value records.
pub fn preview(result: &TabularResult) -> Preview {
    let sample_rows = result
        .rows
        .iter()
        .take(PREVIEW_ROWS)
        .map(|row| {
            result
                .columns
                .iter()
                .cloned()
                .zip(row.iter().cloned())
                .collect()
        })
        .collect();

    Preview {
        columns: result.columns.clone(),
        row_count: result.row_count,
        sample_rows,
    }
}
