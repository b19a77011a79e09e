mod health;
mod worker;

use anyhow::Context;
use codeduel_common::config::Settings;
use codeduel_judge::{CodeExecutor, ExecutionService, Judge, JudgeSettings, LanguageConfigManager};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("CodeDuel judge worker booting...");

    let settings = Settings::from_env();
    info!(settings = ?settings, "Loaded settings");

    let languages = LanguageConfigManager::load_or_builtin(&settings.languages_config);
    info!("Loaded language configurations for: {:?}", languages.list_languages());

    let service = ExecutionService::from_settings(&settings, languages)
        .context("failed to initialise execution backend")?;
    info!(backend = %service.backend(), "Execution backend ready");

    let judge = Arc::new(Judge::new(service, JudgeSettings::from(&settings)));

    if !judge.executor().health_check().await {
        warn!("Execution backend failed its first health check, jobs may fail until it recovers");
    }

    let client = ::redis::Client::open(settings.redis_url.as_str())
        .with_context(|| format!("invalid REDIS_URL {}", settings.redis_url))?;
    let redis_conn = ::redis::aio::ConnectionManager::new(client)
        .await
        .context("failed to connect to Redis")?;
    info!("Connected to Redis: {}", settings.redis_url);

    let listener = tokio::net::TcpListener::bind(&settings.health_addr)
        .await
        .with_context(|| format!("failed to bind health endpoint on {}", settings.health_addr))?;
    info!("Health endpoint listening on {}", settings.health_addr);

    let shutdown = CancellationToken::new();

    let health_server = {
        let judge = judge.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let app = health::router(judge);
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
            {
                error!(error = %e, "Health server failed");
            }
        })
    };

    let worker = tokio::spawn(worker::run(judge, redis_conn, shutdown.clone()));

    match signal::ctrl_c().await {
        Ok(()) => warn!("Received shutdown signal, stopping worker..."),
        Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
    }
    shutdown.cancel();

    if let Err(e) = worker.await {
        error!(error = %e, "Worker task panicked");
    }
    let _ = health_server.await;

    info!("Worker shutdown complete");
    Ok(())
}
