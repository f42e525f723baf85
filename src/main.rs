use anyhow::Result;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use breach_classifier::config::{Config, LogFormat};
use breach_classifier::{AppState, build_router};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::new(
        std::env::var("RUST_LOG")
            .unwrap_or_else(|_| "breach_classifier=info,tower_http=info".into()),
    );
    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }

    tracing::info!(
        environment = ?config.environment,
        max_tasks = config.max_tasks,
        task_ttl_secs = config.task_ttl_secs,
        "Configuration loaded"
    );
    tracing::info!("CORS configured for origins: {}", config.frontend_url);

    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port).parse()?;
    let sweep_interval = config.sweep_interval();

    let state = AppState::new(config);

    // Evict expired tasks in the background
    let shutdown = CancellationToken::new();
    let sweeper = state.tasks.spawn_sweeper(sweep_interval, shutdown.clone());

    let app = build_router(state);

    tracing::info!("Starting server on {}", addr);

    // Graceful shutdown handling
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown.cancel();
    sweeper.await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
