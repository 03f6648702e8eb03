//! # Runtime
//!
//! Process-level orchestration of the controller.
//!
//! - `initialization`: one-time setup and wiring
//! - `controller`: lifecycle state machine and worker pool
//! - `error_policy`: requeue decisions after each sync

pub mod controller;
pub mod error_policy;
pub mod initialization;

use crate::config::{ControllerConfig, ServerConfig};
use crate::controller::server;
use anyhow::{Context, Result};
use kube_runtime::watcher;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Cancel `cancel` on SIGINT or SIGTERM
pub fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        match shutdown_signal().await {
            Ok(()) => info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown..."),
            Err(e) => warn!(error = %e, "Failed to listen for shutdown signals, shutting down"),
        }
        cancel.cancel();
    });
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Initialize, then run the informer, probe server and controller until a
/// shutdown signal arrives
pub async fn run(config: ControllerConfig, server_config: ServerConfig) -> Result<()> {
    let init = initialization::initialize(&config, &server_config).await?;

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let server_task = tokio::spawn(server::serve(
        init.listener,
        init.server_state,
        cancel.clone(),
    ));
    let informer_task = tokio::spawn(init.informer.run(
        init.annotations,
        watcher::Config::default(),
        cancel.clone(),
    ));

    let result = init.controller.run(config.workers, cancel.clone()).await;
    cancel.cancel();

    if let Err(e) = informer_task.await {
        error!(error = %e, "Informer task failed");
    }
    match server_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "HTTP server error"),
        Err(e) => error!(error = %e, "HTTP server task failed"),
    }

    result.context("Controller failed")
}
