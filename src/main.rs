use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use resonate_api::api::{create_router, AppState};
use resonate_api::config::Config;
use resonate_api::db::{create_pool, Ledger, MemoryLedger, PgLedger};
use resonate_api::services::providers::{LanguageModel, OpenAiModel};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let ledger: Arc<dyn Ledger> = match &config.database_url {
        Some(database_url) => {
            let pool = create_pool(database_url).await?;
            tracing::info!("Using PostgreSQL ledger");
            Arc::new(PgLedger::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory ledger");
            Arc::new(MemoryLedger::new())
        }
    };

    let model: Option<Arc<dyn LanguageModel>> = match &config.llm_api_key {
        Some(api_key) => {
            tracing::info!(model = %config.llm_model, "Model-assisted generation enabled");
            Some(Arc::new(OpenAiModel::new(
                api_key.clone(),
                config.llm_api_url.clone(),
                config.llm_model.clone(),
            )))
        }
        None => {
            tracing::info!("No model configured, using fallback generation");
            None
        }
    };

    let state = AppState::new(ledger, model);
    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server running on http://{addr}");
    axum::serve(listener, app).await?;

    Ok(())
}
