//! HTTP server for question answering
//! Listens on AIQL_LISTEN (default 127.0.0.1:8080) and serves POST /query

use aiql::config::AppConfig;
use aiql::orchestrator::Orchestrator;
use aiql::server::serve;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    dotenv::dotenv().ok();
    let config_path = std::env::var("AIQL_CONFIG").ok().map(std::path::PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;
    let orchestrator = Arc::new(Orchestrator::from_config(&config)?);

    let listen = std::env::var("AIQL_LISTEN").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let listener = TcpListener::bind(&listen).await?;
    info!(
        "Server listening on http://{} (model {}, database {}@{})",
        listen,
        orchestrator.model_id(),
        config.database.database,
        config.database.host
    );

    serve(listener, orchestrator).await?;
    Ok(())
}
