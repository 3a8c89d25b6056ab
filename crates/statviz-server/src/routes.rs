//! HTTP adapter over the pipeline operations
//!
//! Each handler deserializes a request, calls the matching pipeline
//! operation, and maps the payload or typed error onto the wire. No logic
//! lives here.

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use statviz_model::{NlRequest, QueryRequest};
use std::sync::Arc;

use crate::error::PipelineError;
use crate::pipeline::ChartPipeline;

pub fn router(pipeline: Arc<ChartPipeline>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/render", post(render_chart))
        .route("/render/base64", post(render_chart_base64))
        .route("/dry-run", post(dry_run))
        .route("/nlpq", post(nlpq))
        .with_state(pipeline)
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

fn png_response(png: Vec<u8>, filename: &str) -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "image/png".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{filename}\""),
            ),
        ],
        png,
    )
}

async fn render_chart(
    State(pipeline): State<Arc<ChartPipeline>>,
    Json(request): Json<QueryRequest>,
) -> Result<impl IntoResponse, PipelineError> {
    let png = pipeline.render(&request).await?;
    Ok(png_response(png, "chart.png"))
}

async fn render_chart_base64(
    State(pipeline): State<Arc<ChartPipeline>>,
    Json(request): Json<QueryRequest>,
) -> Result<impl IntoResponse, PipelineError> {
    let encoded = pipeline.render_base64(&request).await?;
    Ok(Json(encoded))
}

async fn dry_run(
    State(pipeline): State<Arc<ChartPipeline>>,
    Json(request): Json<QueryRequest>,
) -> Result<impl IntoResponse, PipelineError> {
    let preview = pipeline.dry_run(&request).await?;
    Ok(Json(preview))
}

async fn nlpq(
    State(pipeline): State<Arc<ChartPipeline>>,
    Json(request): Json<NlRequest>,
) -> Result<impl IntoResponse, PipelineError> {
    let png = pipeline.nl_chart(&request).await?;
    Ok(png_response(png, "nlpq.png"))
}
