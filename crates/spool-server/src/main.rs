use std::sync::Arc;

use anyhow::Context;
use spool_core::EngineBuilder;
use spool_server::{ServerConfig, router, telemetry};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();

    let config = ServerConfig::from_env();
    info!(
        workers = config.workers,
        queue_size = config.queue_size,
        listen_addr = %config.listen_addr,
        shutdown_grace_ms = config.shutdown_grace.as_millis() as u64,
        seed = config.seed,
        "configuration loaded"
    );

    let engine = EngineBuilder::new()
        .workers(config.workers)
        .queue_size(config.queue_size)
        .seed(config.seed)
        .build()
        .context("invalid engine settings")?;
    let engine = Arc::new(engine);

    // Bind before starting workers so a taken port aborts cleanly.
    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!(addr = %listener.local_addr()?, "listening");

    engine.start();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let app = router(Arc::clone(&engine));
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = stop_rx.await;
            })
            .await
    });

    tokio::select! {
        _ = shutdown_signal() => {}
        res = &mut server => {
            warn!(result = ?res, "http server exited unexpectedly");
            engine.shutdown().await;
            return Ok(());
        }
    }

    info!("shutdown signal received");
    engine.close_gate();
    let _ = stop_tx.send(());

    match tokio::time::timeout(config.shutdown_grace, &mut server).await {
        Ok(Ok(Ok(()))) => info!("http server stopped"),
        Ok(Ok(Err(e))) => warn!(error = %e, "http server error during shutdown"),
        Ok(Err(e)) => warn!(error = %e, "http server task failed"),
        Err(_) => {
            warn!(
                grace_ms = config.shutdown_grace.as_millis() as u64,
                "grace period elapsed, dropping open connections"
            );
            server.abort();
        }
    }

    let drained = engine.shutdown().await;
    info!(drained, "stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
