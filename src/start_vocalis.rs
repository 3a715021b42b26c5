//! Startup for the Vocalis server binary.

use std::process::ExitCode;

use crate::chat::core::config::AppConfig;
use crate::server::{self, AppState};

/// Load configuration, open storage, start summary workers and serve until Ctrl-C.
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting Vocalis v{}", env!("CARGO_PKG_VERSION"));

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {e}");
            return ExitCode::from(1);
        }
    };
    if config.llm.api_key.is_none() {
        tracing::warn!("GROQ_API_KEY is not set; chat requests will be refused");
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    rt.block_on(serve(config))
}

async fn serve(config: AppConfig) -> ExitCode {
    let port = config.server.port;
    let (state, workers) = match AppState::from_config(config).await {
        Ok(parts) => parts,
        Err(e) => {
            tracing::error!("Failed to create state: {e}");
            return ExitCode::from(1);
        }
    };

    let summaries = workers.spawn();
    let result = server::run_server_with_shutdown(state, port, shutdown_signal()).await;
    summaries.shutdown().await;

    match result {
        Ok(()) => {
            tracing::info!("Server stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Server error: {e}");
            ExitCode::from(1)
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
