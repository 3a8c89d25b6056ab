//! Pipeline error taxonomy
//!
//! Every user-facing operation returns either its payload or one of these,
//! serialized as `{"error": {"kind": ..., "message": ...}}` with a stable
//! kind string. Guard and chart-spec failures are terminal for the request;
//! nothing here triggers a retry.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use statviz_guard::GuardError;
use statviz_render::RenderError;
use statviz_store::StoreError;
use std::time::Duration;
use thiserror::Error;

use crate::llm::InterpretError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Could not resolve the question: {0}")]
    Ambiguous(String),

    #[error("Statement rejected: {0}")]
    Unsafe(#[from] GuardError),

    #[error("Invalid chart spec: {0}")]
    InvalidChart(String),

    #[error("Query execution failed: {0}")]
    Execution(String),

    #[error("Query exceeded time budget of {0:?}")]
    QueryTimeout(Duration),

    #[error("Interpretation exceeded time budget of {0:?}")]
    InterpretationTimeout(Duration),

    #[error("Store at capacity: {0}")]
    Capacity(String),

    #[error("Interpreter failure: {0}")]
    Interpreter(String),

    #[error("Chart rendering failed: {0}")]
    Render(String),
}

impl PipelineError {
    /// Stable kind string, part of the API contract.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Ambiguous(_) => "ambiguous_query",
            PipelineError::Unsafe(_) => "unsafe_query",
            PipelineError::InvalidChart(_) => "invalid_chart_spec",
            PipelineError::Execution(_) => "query_execution_error",
            PipelineError::QueryTimeout(_) => "query_timeout",
            PipelineError::InterpretationTimeout(_) => "interpretation_timeout",
            PipelineError::Capacity(_) => "capacity_exceeded",
            PipelineError::Interpreter(_) => "interpreter_failure",
            PipelineError::Render(_) => "render_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            PipelineError::Ambiguous(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::Unsafe(_) => StatusCode::BAD_REQUEST,
            PipelineError::InvalidChart(_) => StatusCode::BAD_REQUEST,
            PipelineError::Execution(_) => StatusCode::BAD_REQUEST,
            PipelineError::QueryTimeout(_) => StatusCode::REQUEST_TIMEOUT,
            PipelineError::InterpretationTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            PipelineError::Capacity(_) => StatusCode::SERVICE_UNAVAILABLE,
            PipelineError::Interpreter(_) => StatusCode::BAD_GATEWAY,
            PipelineError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Capacity(d) => {
                PipelineError::Capacity(format!("no connection available within {d:?}"))
            }
            StoreError::Timeout(d) => PipelineError::QueryTimeout(d),
            other => PipelineError::Execution(other.to_string()),
        }
    }
}

impl From<RenderError> for PipelineError {
    fn from(err: RenderError) -> Self {
        if err.is_spec_error() {
            PipelineError::InvalidChart(err.to_string())
        } else {
            PipelineError::Render(err.to_string())
        }
    }
}

impl From<InterpretError> for PipelineError {
    fn from(err: InterpretError) -> Self {
        match err {
            InterpretError::Ambiguous(msg) => PipelineError::Ambiguous(msg),
            InterpretError::Timeout(d) => PipelineError::InterpretationTimeout(d),
            InterpretError::Transport(msg) => PipelineError::Interpreter(msg),
        }
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
            }
        });
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_strings_are_stable() {
        assert_eq!(PipelineError::Ambiguous("x".into()).kind(), "ambiguous_query");
        assert_eq!(
            PipelineError::InvalidChart("x".into()).kind(),
            "invalid_chart_spec"
        );
        assert_eq!(
            PipelineError::QueryTimeout(Duration::from_secs(1)).kind(),
            "query_timeout"
        );
        assert_eq!(
            PipelineError::Capacity("x".into()).kind(),
            "capacity_exceeded"
        );
    }

    #[test]
    fn test_store_error_mapping() {
        let err: PipelineError = StoreError::Timeout(Duration::from_secs(5)).into();
        assert_eq!(err.kind(), "query_timeout");

        let err: PipelineError = StoreError::Capacity(Duration::from_secs(1)).into();
        assert_eq!(err.kind(), "capacity_exceeded");

        let err: PipelineError = StoreError::MissingParameter("p".into()).into();
        assert_eq!(err.kind(), "query_execution_error");
    }

    #[test]
    fn test_render_error_mapping() {
        let err: PipelineError = RenderError::MissingColumn("x".into()).into();
        assert_eq!(err.kind(), "invalid_chart_spec");

        let err: PipelineError = RenderError::Backend("boom".into()).into();
        assert_eq!(err.kind(), "render_error");
    }
}
