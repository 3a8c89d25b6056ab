//! Statviz request/response data model
//!
//! Serde types shared across the pipeline: chart specifications, the two
//! request shapes (explicit SQL and natural language), the interpreter's
//! output, and the tabular result produced by the store. All entities are
//! request-scoped; nothing here caches or persists.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Chart geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Line,
    Bar,
}

/// Numeric formatting for y-axis ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum YFormat {
    #[serde(rename = "int")]
    Int,
    #[serde(rename = "float0")]
    Float0,
    #[serde(rename = "float1")]
    Float1,
    #[serde(rename = "float2")]
    Float2,
    /// Thousands, e.g. 12300 -> "12.3k"
    #[serde(rename = "k")]
    Thousands,
}

impl YFormat {
    /// Render a tick value according to the format
    pub fn format(&self, v: f64) -> String {
        match self {
            YFormat::Int => format!("{:.0}", v),
            YFormat::Float0 => format!("{:.0}", v),
            YFormat::Float1 => format!("{:.1}", v),
            YFormat::Float2 => format!("{:.2}", v),
            YFormat::Thousands => {
                if v.abs() >= 1000.0 {
                    format!("{:.1}k", v / 1000.0)
                } else {
                    format!("{:.0}", v)
                }
            }
        }
    }
}

/// Visual palette
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

/// Aesthetic and shaping options for a chart
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartOptions {
    /// Sort rows by the x column before plotting
    #[serde(default = "default_sort")]
    pub sort: bool,

    /// Trailing moving-average window applied to y (line charts)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rolling: Option<u32>,

    /// Keep only the N rows with the largest y, descending (bar charts)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_n: Option<u32>,

    /// Rotation of x-axis tick labels, in degrees
    #[serde(default)]
    pub x_rotate: i32,

    /// Numeric formatting of y-axis ticks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_fmt: Option<YFormat>,

    #[serde(default)]
    pub theme: Theme,
}

fn default_sort() -> bool {
    true
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            sort: true,
            rolling: None,
            top_n: None,
            x_rotate: 0,
            y_fmt: None,
            theme: Theme::Light,
        }
    }
}

/// Declarative description of how to turn a tabular result into a chart
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartSpec {
    #[serde(rename = "type")]
    pub kind: ChartKind,

    /// Column holding category / time labels
    pub x: String,

    /// Column holding the plotted metric
    pub y: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_label: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_label: Option<String>,

    #[serde(default)]
    pub options: ChartOptions,
}

/// Explicit SQL + chart request (the direct render path)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub sql: String,

    /// Named scalar parameters referenced as `:name` in the statement
    #[serde(default)]
    pub params: serde_json::Map<String, Value>,

    pub chart: ChartSpec,

    /// League namespace the statement runs in (defaults to the store's
    /// main schema when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub league: Option<String>,
}

/// Free-text request (the NL render path)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NlRequest {
    pub prompt: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub league: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub club: Option<String>,
}

/// Complete interpreter output: callers never observe partial state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interpretation {
    pub sql: String,

    #[serde(default)]
    pub params: serde_json::Map<String, Value>,

    pub chart: ChartSpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub league: Option<String>,
}

/// Tabular result of a query execution
///
/// Column-major metadata with row-major data, the shape the store hands
/// back. Produced fresh per execution and owned by the calling request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabularResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub row_count: usize,
}

impl TabularResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let row_count = rows.len();
        Self {
            columns,
            rows,
            row_count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Resolve a column by name, exact match first, then case-insensitive.
    ///
    /// Generated SQL and generated chart specs do not always agree on
    /// identifier casing, so chart axes are matched leniently.
    pub fn resolve_column(&self, name: &str) -> Option<usize> {
        if let Some(idx) = self.columns.iter().position(|c| c == name) {
            return Some(idx);
        }
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    }
}

/// Structured summary of a result, returned by the dry-run path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preview {
    pub columns: Vec<String>,

    #[serde(rename = "count")]
    pub row_count: usize,

    #[serde(rename = "rows")]
    pub sample_rows: Vec<serde_json::Map<String, Value>>,
}

/// Extract a float from a scalar cell, if it is numeric
pub fn scalar_as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Render a scalar cell as an axis label
pub fn scalar_label(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
