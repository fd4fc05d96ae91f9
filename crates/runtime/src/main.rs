//! Process entry point.

use runtime::{Config, Runtime, observability};
use tokio::signal;

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

#[tokio::main]
async fn main() {
    // 1. Load configuration
    let config = Config::from_env().expect("invalid configuration");

    // 2. Initialize tracing
    observability::init_tracing(&config);

    // 3. Install Prometheus metrics recorder and listener
    observability::install_metrics(config.metrics_addr)
        .expect("failed to install Prometheus recorder");
    tracing::info!(addr = %config.metrics_addr, "serving metrics");

    // 4. Connect backends and start consumers
    let runtime = Runtime::start(&config)
        .await
        .expect("failed to start inventory sync");

    // 5. Run until signalled
    shutdown_signal().await;
    runtime.shutdown().await;

    tracing::info!("shut down gracefully");
}
