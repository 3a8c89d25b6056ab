//! Pipeline orchestrator
//!
//! Composes guard, store, renderer, and interpreter into the four
//! user-facing operations. Per request the flow is
//! received -> interpreted (NL only) -> validated -> executed -> rendered,
//! failing out of any stage with a typed error. The interpreter's external
//! call is the only stage that may retry, and it always completes before a
//! store connection is acquired.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Serialize;
use statviz_catalog::SchemaCatalog;
use statviz_model::{NlRequest, Preview, QueryRequest};
use statviz_store::StorePool;
use std::sync::Arc;
use tracing::info;

use crate::error::PipelineError;
use crate::hints;
use crate::llm::Interpreter;

/// Base64 payload for callers that cannot take raw bytes.
#[derive(Debug, Clone, Serialize)]
pub struct EncodedChart {
    pub content_type: String,
    pub filename: String,
    pub base64: String,
}

pub struct ChartPipeline {
    catalog: Arc<SchemaCatalog>,
    store: StorePool,
    interpreter: Arc<dyn Interpreter>,
}

impl ChartPipeline {
    pub fn new(
        catalog: Arc<SchemaCatalog>,
        store: StorePool,
        interpreter: Arc<dyn Interpreter>,
    ) -> Self {
        Self {
            catalog,
            store,
            interpreter,
        }
    }

    /// Direct render: guard -> execute -> render.
    pub async fn render(&self, request: &QueryRequest) -> Result<Vec<u8>, PipelineError> {
        let namespace = self.namespace_for(request.league.as_deref())?;
        let sql = statviz_guard::validate(&request.sql, &self.catalog)?;
        let result = self
            .store
            .execute(&sql, &request.params, namespace.as_deref())
            .await?;
        info!(rows = result.row_count, "query executed");
        Ok(statviz_render::render(&result, &request.chart)?)
    }

    /// Direct render with a base64-encoded payload, byte-identical to
    /// [`ChartPipeline::render`] for the same request.
    pub async fn render_base64(
        &self,
        request: &QueryRequest,
    ) -> Result<EncodedChart, PipelineError> {
        let png = self.render(request).await?;
        Ok(EncodedChart {
            content_type: "image/png".to_string(),
            filename: "chart.png".to_string(),
            base64: BASE64.encode(png),
        })
    }

    /// Dry run: guard -> execute -> summarize. The image path is never
    /// invoked, whatever the row count.
    pub async fn dry_run(&self, request: &QueryRequest) -> Result<Preview, PipelineError> {
        let namespace = self.namespace_for(request.league.as_deref())?;
        let sql = statviz_guard::validate(&request.sql, &self.catalog)?;
        let result = self
            .store
            .execute(&sql, &request.params, namespace.as_deref())
            .await?;
        Ok(statviz_render::preview(&result))
    }

    /// NL render: heuristics -> interpreter -> guard -> execute -> render.
    pub async fn nl_chart(&self, request: &NlRequest) -> Result<Vec<u8>, PipelineError> {
        let detected = hints::analyze(&request.prompt, &self.catalog);
        let hints = detected.merged(request.league.clone(), request.club.clone());
        info!(?hints, prompt = %request.prompt, "interpreting prompt");

        let interpretation = self
            .interpreter
            .interpret(&request.prompt, &hints, &self.catalog)
            .await?;

        let league_name = interpretation
            .league
            .clone()
            .or_else(|| hints.league.clone())
            .ok_or_else(|| {
                PipelineError::Ambiguous(
                    "the league could not be resolved from the question or hints".to_string(),
                )
            })?;
        let league = self.catalog.resolve_league(&league_name).ok_or_else(|| {
            PipelineError::Ambiguous(format!("unknown league: {league_name}"))
        })?;

        let sql = statviz_guard::validate(&interpretation.sql, &self.catalog)?;
        info!(league = %league.name, schema = %league.schema, sql = %sql, "interpreted statement validated");

        let result = self
            .store
            .execute(&sql, &interpretation.params, Some(&league.schema))
            .await?;

        // An empty result renders as the explicit placeholder, never an error
        Ok(statviz_render::render(&result, &interpretation.chart)?)
    }

    fn namespace_for(&self, league: Option<&str>) -> Result<Option<String>, PipelineError> {
        match league {
            None => Ok(None),
            Some(name) => self
                .catalog
                .resolve_league(name)
                .map(|l| Some(l.schema.clone()))
                .ok_or_else(|| PipelineError::Ambiguous(format!("unknown league: {name}"))),
        }
    }
}
