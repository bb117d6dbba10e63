use std::net::SocketAddr;
use std::time::Duration;
use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{debug, info};
use upload_relay::{config::Config, create_router, storage, utils, AppState};

#[derive(Debug, Parser)]
#[command(name = "upload-relay", about = "File upload relay with quotas and history")]
struct Args {
    /// Load environment variables from this file instead of `.env`
    #[arg(long)]
    env_file: Option<std::path::PathBuf>,

    /// Override HOST
    #[arg(long)]
    host: Option<String>,

    /// Override PORT
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if let Some(path) = &args.env_file {
        dotenvy::from_path(path)
            .with_context(|| format!("failed to load env file {}", path.display()))?;
    }

    // Load configuration
    let mut config = Config::from_env()?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let _log_guard = utils::init_logger(&config.logging);
    info!("Configuration loaded: {:?}", config.server);

    let store = storage::build_store(&config.storage)?;

    // Create shared state
    let state = AppState::new(config.clone(), store);
    spawn_quota_pruning(&state);

    // Create router
    let app = create_router(state);

    // Start server
    let ip: std::net::IpAddr = config
        .server
        .host
        .parse()
        .with_context(|| format!("invalid HOST '{}'", config.server.host))?;
    let addr = SocketAddr::from((ip, config.server.port));
    info!("Server listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    info!("Server stopped");
    Ok(())
}

/// Periodically drops quota entries and throttle buckets that can no longer
/// affect a decision.
fn spawn_quota_pruning(state: &AppState) {
    let upload_rate = state.uploads.upload_rate().clone();
    let daily_quota = state.uploads.daily_quota().clone();
    let throttle = state.throttle.clone();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(10 * 60));
        loop {
            ticker.tick().await;
            let now = chrono::Utc::now().timestamp_millis();
            let pruned =
                upload_rate.prune_expired(now).await + daily_quota.prune_expired(now).await;
            if let Some(throttle) = &throttle {
                throttle.retain_recent();
            }
            debug!(pruned, "Pruned expired quota windows");
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
