use std::net::SocketAddr;
use std::sync::Arc;

use makers_api::config::Config;
use makers_api::db::{create_pool, run_migrations};
use makers_api::routes::{app, AppState};

use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Arc::new(Config::from_env()?);

    // Initialize tracing
    let development = config.is_development();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter().into()),
        )
        .with(development.then(|| tracing_subscriber::fmt::layer().pretty()))
        .with((!development).then(|| tracing_subscriber::fmt::layer()))
        .init();

    tracing::info!(env = %config.app_env, "Starting makers-api server...");
    tracing::info!("Connecting to database...");

    // Create database pool
    let pool = create_pool(&config.database_url, config.app_debug).await?;
    run_migrations(&pool).await?;
    tracing::info!("Database connection established");

    if let Some(url) = &config.redis_url {
        tracing::info!("Redis health probe enabled: {}", redact(url));
    } else {
        tracing::info!("Redis not configured, health probe skipped");
    }

    let state = AppState::new(config.clone(), Arc::new(pool.clone()));

    // Parse server address
    let addr: SocketAddr = config.server_addr().parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    tracing::info!(env = %config.app_env, "Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => tracing::error!("Failed to listen for SIGTERM: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

/// Hides credentials in a connection URL before logging it.
fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}
