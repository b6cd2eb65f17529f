//! weather-batch server
//!
//! Usage: `weather-batch [config.json]`
//!
//! Without a configuration file every setting uses its default
//! (listening on 127.0.0.1:5328). Log verbosity follows `RUST_LOG`.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use weather_batch::{BatchOrchestrator, Config, Result, api, run_with_shutdown};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting weather-batch");

    let config = match std::env::args().nth(1) {
        Some(path) => {
            tracing::info!(path = %path, "Loading configuration");
            Config::from_file(&path)?
        }
        None => Config::default(),
    };
    let config = Arc::new(config);

    let orchestrator = BatchOrchestrator::new((*config).clone())?;
    let _sweeper = orchestrator.start_retention_sweeper();

    let mut server = tokio::spawn(api::start_api_server(
        Arc::new(orchestrator.clone()),
        Arc::clone(&config),
    ));

    tokio::select! {
        // Server exited on its own (e.g. bind failure)
        joined = &mut server => {
            orchestrator.shutdown().await?;
            return server_outcome(joined);
        }
        result = run_with_shutdown(orchestrator.clone()) => result?,
    }
    server_outcome(server.await)?;

    tracing::info!("weather-batch stopped");
    Ok(())
}

fn server_outcome(joined: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    match joined {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(error = %e, "API server task failed");
            Ok(())
        }
    }
}
