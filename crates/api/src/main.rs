//! API server entry point.

use std::time::Duration;

use api::config::Config;
use common::Clock;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Periodically fails Pending orders no checkout is driving any more.
fn spawn_reconciler(
    state: std::sync::Arc<api::AppState>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = state.clock().now();
                    if let Err(e) = state.coordinator.reconcile_abandoned(now).await {
                        tracing::warn!(error = %e, "reconciliation failed");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    })
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Create application state and background tasks
    let state = api::create_default_state(&config);
    let sweeper = state.sweeper(&config).spawn();
    let (stop_reconciler, reconciler_shutdown) = watch::channel(false);
    let reconciler = spawn_reconciler(
        state.clone(),
        config.reconcile_interval(),
        reconciler_shutdown,
    );

    // 4. Build the application
    let app = api::create_app(state, metrics_handle);

    // 5. Start server
    let addr = config.addr();
    tracing::info!(
        %addr,
        checkout_window_secs = config.checkout_window_secs,
        payment_timeout_secs = config.payment_timeout_secs,
        "starting API server"
    );

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // 6. Stop background tasks
    let _ = stop_reconciler.send(true);
    if let Err(e) = reconciler.await {
        tracing::warn!(error = %e, "reconciler task ended abnormally");
    }
    sweeper.shutdown().await;

    tracing::info!("server shut down gracefully");
}
