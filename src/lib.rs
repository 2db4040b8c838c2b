pub mod adapters;
pub mod app;
pub mod config;
pub mod error;
pub mod ports;
pub mod push;
pub mod state;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

use anyhow::Context;

use crate::adapters::{JsonFileStore, TokioTimeProvider, WebPushSender};
use crate::config::AppConfig;
use crate::push::{EngineSettings, PushEngine};

pub type Engine = PushEngine<JsonFileStore, WebPushSender, TokioTimeProvider>;

pub fn build_engine(config: &AppConfig) -> anyhow::Result<Engine> {
    let store = JsonFileStore::open(&config.data_path).with_context(|| {
        format!("failed to open data file {}", config.data_path.display())
    })?;
    let sender = WebPushSender::new(config.vapid_ttl, config.push_timeout)
        .context("failed to init web-push client")?;
    Ok(PushEngine::new(
        Arc::new(store),
        sender,
        TokioTimeProvider,
        EngineSettings {
            subject: config.vapid_subject.clone(),
            fanout_concurrency: config.fanout_concurrency,
        },
    ))
}

pub async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let engine = build_engine(&config)?;
    match engine.recover() {
        Ok(report) => tracing::info!(
            rescheduled = report.rescheduled,
            overdue = report.overdue,
            failed = report.failed,
            "resilience check finished"
        ),
        Err(err) => tracing::error!(error = %err, "resilience check failed"),
    }

    let addr = config.bind;
    let state = state::AppState {
        config,
        engine: engine.clone(),
    };
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("listening on http://{addr}");
    axum::serve(listener, app::app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    engine.shutdown();
    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
