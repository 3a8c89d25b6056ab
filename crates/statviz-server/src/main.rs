//! Statviz server: natural language and SQL chart rendering over a
//! read-only sports store.
//!
//! Startup wires the process-scoped pieces explicitly: configuration,
//! logging, the schema catalog, the connection pool, and the interpreter,
//! then hands them to the pipeline behind the HTTP adapter.

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use statviz_catalog::SchemaCatalog;
use statviz_server::config::Config;
use statviz_server::llm::OpenAiInterpreter;
use statviz_server::pipeline::ChartPipeline;
use statviz_server::{logging, routes};
use statviz_store::StorePool;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::load_or_default("config.yaml").context("loading configuration")?;
    config.apply_logging_env();
    logging::init();

    // Catalog: prefer live store metadata, fall back to the static shape
    let catalog = match duckdb::Connection::open(&config.store.path)
        .map_err(statviz_catalog::CatalogError::from)
        .and_then(|conn| SchemaCatalog::from_store(&conn))
    {
        Ok(catalog) => {
            info!(
                leagues = catalog.leagues.len(),
                tables = catalog.tables.len(),
                "catalog loaded from store"
            );
            catalog
        }
        Err(e) => {
            warn!("could not read catalog from store ({e}), using built-in description");
            SchemaCatalog::builtin()
        }
    };
    let catalog = Arc::new(catalog);

    let store = StorePool::open_read_only(&config.store.path, config.store.to_store_config())
        .with_context(|| format!("opening store at {}", config.store.path))?;
    info!(path = %config.store.path, pool = config.store.pool_size, "store pool ready");

    let api_key = Config::get_openai_api_key().context("reading OPENAI_API_KEY")?;
    let openai_config = async_openai::config::OpenAIConfig::new().with_api_key(api_key);
    let client = async_openai::Client::with_config(openai_config);
    let interpreter = OpenAiInterpreter::new(
        client,
        config.interpreter.model.clone(),
        Duration::from_millis(config.interpreter.timeout_ms),
        config.interpreter.max_retries,
    );
    info!(model = %config.interpreter.model, "interpreter ready");

    let pipeline = Arc::new(ChartPipeline::new(catalog, store, Arc::new(interpreter)));
    let app = routes::router(pipeline);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("listening on {addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
