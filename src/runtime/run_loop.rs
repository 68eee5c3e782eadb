//! # Run Loop
//!
//! Starts the scheduler, the store validator and the HTTP server, feeds the
//! loaded resources to the scheduler and waits for a shutdown signal.

use anyhow::Result;
use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

use super::initialization::InitializationResult;
use crate::server::start_server;

/// Future resolving once shutdown is requested
fn shutdown_signal(mut receiver: watch::Receiver<bool>) -> impl Future<Output = ()> + Send + 'static {
    async move {
        // A dropped sender also means shutdown.
        let _ = receiver.wait_for(|stop| *stop).await;
    }
}

/// Run the controller until SIGINT/SIGTERM
///
/// # Errors
/// Fails when the loaded resources cannot be handed to the scheduler.
pub async fn run(init: InitializationResult) -> Result<()> {
    let InitializationResult {
        config,
        manifest,
        scheduler,
        handle,
        validator,
        server_state,
    } = init;
    let (stop, stopped) = watch::channel(false);

    let scheduler_task = tokio::spawn(scheduler.run(shutdown_signal(stopped.clone())));

    for store in manifest.stores {
        handle.upsert_store(store)?;
    }
    for object in manifest.objects {
        handle.upsert_object(object)?;
    }

    let validator_task = tokio::spawn(validator.run(shutdown_signal(stopped.clone())));

    let server_task = tokio::spawn({
        let state = Arc::clone(&server_state);
        let shutdown = shutdown_signal(stopped);
        async move {
            if let Err(e) = start_server(config.metrics_port, state, shutdown).await {
                error!("HTTP server error: {}", e);
            }
        }
    });

    server_state.is_ready.store(true, Ordering::Relaxed);
    info!("Controller initialized, reconciling");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");
    server_state.is_ready.store(false, Ordering::Relaxed);
    let _ = stop.send(true);

    for (name, task) in [
        ("scheduler", scheduler_task),
        ("validator", validator_task),
        ("server", server_task),
    ] {
        if let Err(e) = task.await {
            error!("{} task failed: {}", name, e);
        }
    }

    info!("Controller stopped");
    Ok(())
}
